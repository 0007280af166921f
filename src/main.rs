//! Thin binary wrapper.
//!
//! The engine executable defaults to `./build/bin/calc_backend`; set
//! `MATHSLATE_ENGINE` to point elsewhere.
//!
//! Run:
//! - `cargo run`
//! - `MATHSLATE_ENGINE=/path/to/engine cargo run`

fn main() -> anyhow::Result<()> {
    // Logging setup stays in the binary so the library remains unopinionated.
    env_logger::init();

    mathslate::run_app(mathslate::app::AppConfig::default())
}
