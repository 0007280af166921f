//! `mathslate` library crate root.
//!
//! A windowed frontend for an external symbolic-math engine: pressing a mode
//! button runs the engine process with that mode's token, and the expression
//! it prints is typeset into vector glyphs and shown in the display region.
//!
//! Pipeline: [`modes`] names the computations, [`engine`] runs the process
//! (cancellably, off the event loop), [`typeset`] turns its output into a
//! triangle mesh, and [`app`] wires input, dispatch, and the single-slot
//! display into a winit/wgpu window.

pub mod app;
pub mod engine;
pub mod modes;
pub mod render;
pub mod scene;
pub mod typeset;

/// Run the application with the given configuration.
///
/// Does not initialize logging; callers decide their own setup.
pub fn run_app(config: app::AppConfig) -> anyhow::Result<()> {
    app::run(config)
}
