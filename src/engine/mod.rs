//! External engine process invocation.
//!
//! The symbolic backend is a separate executable: it takes one mode token as
//! its only argument and prints the resulting math expression to stdout. This
//! module owns locating that executable, running it, and classifying every
//! way the exchange can fail. [`job`] layers a cancellable worker thread on
//! top for the UI.

pub mod job;

use std::{
    env, io,
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, info};

use crate::modes::Mode;

/// Engine executable path used when `MATHSLATE_ENGINE` is unset.
pub const DEFAULT_ENGINE_PATH: &str = "./build/bin/calc_backend";

/// Environment variable overriding the engine executable path.
pub const ENGINE_PATH_ENV: &str = "MATHSLATE_ENGINE";

/// Where to find the engine executable.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub path: PathBuf,
}

impl EngineConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the engine path from the environment, falling back to the
    /// conventional build-tree location.
    pub fn from_env() -> Self {
        let path = match env::var_os(ENGINE_PATH_ENV) {
            Some(p) => {
                info!("engine path from ${ENGINE_PATH_ENV}: {}", Path::new(&p).display());
                PathBuf::from(p)
            }
            None => PathBuf::from(DEFAULT_ENGINE_PATH),
        };
        Self { path }
    }
}

/// Everything that can go wrong talking to the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The process could not be started at all.
    #[error("failed to launch engine at {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The process ran but exited unsuccessfully.
    #[error("engine exited with {status}; stderr: {stderr}")]
    Failed { status: String, stderr: String },

    /// stdout was not valid UTF-8.
    #[error("engine produced non-UTF-8 output")]
    Output(#[from] std::string::FromUtf8Error),

    /// The invocation was cancelled before completing.
    #[error("engine invocation cancelled")]
    Cancelled,
}

/// Result of one engine invocation: the trimmed stdout payload.
pub type ComputationResult = Result<String, EngineError>;

/// Run the engine synchronously for one mode and capture its output.
///
/// Blocks until the process exits. The UI path goes through [`job::EngineJob`]
/// instead; this is the core exchange both share.
pub fn invoke(config: &EngineConfig, mode: Mode) -> ComputationResult {
    debug!("invoking engine: {} {}", config.path.display(), mode.token());

    let output = Command::new(&config.path)
        .arg(mode.token())
        .output()
        .map_err(|source| EngineError::Launch {
            path: config.path.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(EngineError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8(output.stdout)?;
    Ok(stdout.trim().to_string())
}

/// Test support shared by engine and dispatch tests.
#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::env;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Write an executable shell script standing in for the engine.
    pub(crate) fn stub_engine(name: &str, body: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("mathslate-test-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::test_support::stub_engine;
    use super::*;

    #[test]
    fn invoke_captures_trimmed_stdout() {
        let path = stub_engine("ok", r#"echo "  x^2 + C  ""#);
        let config = EngineConfig::new(path);

        let out = invoke(&config, Mode::IndefiniteIntegral).unwrap();
        assert_eq!(out, "x^2 + C");
    }

    #[test]
    fn invoke_passes_mode_token_as_argument() {
        let path = stub_engine("echo-arg", r#"echo "$1""#);
        let config = EngineConfig::new(path);

        assert_eq!(invoke(&config, Mode::PartialDerivative).unwrap(), "pd");
        assert_eq!(invoke(&config, Mode::DoubleIntegral).unwrap(), "dint");
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let path = stub_engine("fail", "echo 'bad mode' >&2\nexit 3");
        let config = EngineConfig::new(path);

        match invoke(&config, Mode::IndefiniteIntegral) {
            Err(EngineError::Failed { stderr, .. }) => assert_eq!(stderr, "bad mode"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let config = EngineConfig::new("/nonexistent/calc_backend");
        assert!(matches!(
            invoke(&config, Mode::IndefiniteIntegral),
            Err(EngineError::Launch { .. })
        ));
    }
}
