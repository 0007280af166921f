//! Cancellable background engine invocations.
//!
//! The event loop must never block on the engine, so each invocation runs on
//! its own worker thread: spawn the child with piped stdout/stderr, drain
//! stderr on a side thread, read stdout to EOF, then deliver a
//! [`ComputationResult`] through a caller-supplied sink (the app hands in an
//! `EventLoopProxy` forwarder; tests hand in a channel sender).
//!
//! Cancellation kills the child; the worker observes EOF on stdout, sees the
//! flag, and reports [`EngineError::Cancelled`] instead of whatever partial
//! output was captured.

use std::{
    io::Read,
    process::{Child, Command, Stdio},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use log::{debug, warn};

use crate::engine::{ComputationResult, EngineConfig, EngineError};
use crate::modes::Mode;

/// Output larger than this means the child is misbehaving; kill it.
const MAX_OUTPUT_BYTES: usize = 1 << 20;

/// Handle to one in-flight engine invocation.
///
/// Dropping the handle does not cancel the job; the worker detaches and the
/// sink still fires. Call [`JobHandle::cancel`] for an explicit abort.
pub struct JobHandle {
    mode: Mode,
    cancelled: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
}

impl JobHandle {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Abort the invocation: kill the child if it is still running.
    ///
    /// The worker delivers `Err(EngineError::Cancelled)` through the sink;
    /// callers must still expect that delivery.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(child) = self.child.lock().expect("job child lock").as_mut() {
            debug!("cancelling engine invocation for {}", self.mode);
            let _ = child.kill();
        }
    }
}

/// Spawn the engine for `mode` on a worker thread.
///
/// The sink is invoked exactly once, from the worker thread, with the final
/// result (including launch failures and cancellation).
pub fn spawn_with(
    config: &EngineConfig,
    mode: Mode,
    sink: impl FnOnce(Mode, ComputationResult) + Send + 'static,
) -> JobHandle {
    let cancelled = Arc::new(AtomicBool::new(false));
    let child_slot: Arc<Mutex<Option<Child>>> = Arc::new(Mutex::new(None));

    let handle = JobHandle {
        mode,
        cancelled: cancelled.clone(),
        child: child_slot.clone(),
    };

    let config = config.clone();
    thread::Builder::new()
        .name(format!("engine-{}", mode.token()))
        .spawn(move || {
            let result = run_child(&config, mode, &cancelled, &child_slot);
            sink(mode, result);
        })
        .expect("spawn engine worker thread");

    handle
}

fn run_child(
    config: &EngineConfig,
    mode: Mode,
    cancelled: &AtomicBool,
    child_slot: &Mutex<Option<Child>>,
) -> ComputationResult {
    if cancelled.load(Ordering::SeqCst) {
        return Err(EngineError::Cancelled);
    }

    let mut child = Command::new(&config.path)
        .arg(mode.token())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| EngineError::Launch {
            path: config.path.clone(),
            source,
        })?;

    let mut stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Publish the child so cancel() can reach it; if a cancel raced the
    // spawn, kill immediately.
    {
        let mut slot = child_slot.lock().expect("job child lock");
        *slot = Some(child);
        if cancelled.load(Ordering::SeqCst) {
            if let Some(c) = slot.as_mut() {
                let _ = c.kill();
            }
        }
    }

    // Drain stderr on a side thread so the child never blocks on a full pipe.
    let stderr_handle = stderr.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if buf.len() < MAX_OUTPUT_BYTES {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                    Err(_) => break,
                }
            }
            String::from_utf8_lossy(&buf).trim().to_string()
        })
    });

    // Read stdout to EOF without holding the child lock, so cancel() can
    // kill mid-read (kill closes the pipe and ends this loop).
    let mut raw = Vec::new();
    let mut overflowed = false;
    if let Some(pipe) = stdout.as_mut() {
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    raw.extend_from_slice(&chunk[..n]);
                    if raw.len() > MAX_OUTPUT_BYTES {
                        overflowed = true;
                        if let Some(c) = child_slot.lock().expect("job child lock").as_mut() {
                            let _ = c.kill();
                        }
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }
    drop(stdout);

    // Reclaim the child to reap it; the slot empties so a late cancel()
    // becomes a no-op.
    let reclaimed = child_slot.lock().expect("job child lock").take();
    let status = match reclaimed {
        Some(mut c) => c.wait().ok(),
        None => None,
    };

    let stderr_text = stderr_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    if cancelled.load(Ordering::SeqCst) {
        debug!("engine invocation for {mode} cancelled");
        return Err(EngineError::Cancelled);
    }

    if overflowed {
        warn!("engine stdout exceeded {MAX_OUTPUT_BYTES} bytes; killed");
        return Err(EngineError::Failed {
            status: "killed (output limit)".to_string(),
            stderr: stderr_text,
        });
    }

    match status {
        Some(status) if status.success() => {
            let text = String::from_utf8(raw)?;
            Ok(text.trim().to_string())
        }
        Some(status) => Err(EngineError::Failed {
            status: status.to_string(),
            stderr: stderr_text,
        }),
        None => Err(EngineError::Failed {
            status: "unknown (child not reaped)".to_string(),
            stderr: stderr_text,
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::test_support::stub_engine;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn job_delivers_result_through_sink() {
        let path = stub_engine("job-ok", r#"echo "sin(x)""#);
        let config = EngineConfig::new(path);

        let (tx, rx) = mpsc::channel();
        let _handle = spawn_with(&config, Mode::IndefiniteIntegral, move |mode, result| {
            tx.send((mode, result)).unwrap();
        });

        let (mode, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(mode, Mode::IndefiniteIntegral);
        assert_eq!(result.unwrap(), "sin(x)");
    }

    #[test]
    fn cancel_kills_child_and_reports_cancelled() {
        // exec so the kill reaches the process holding the stdout pipe.
        let path = stub_engine("job-cancel", "exec sleep 30");
        let config = EngineConfig::new(path);

        let (tx, rx) = mpsc::channel();
        let handle = spawn_with(&config, Mode::PartialDerivative, move |mode, result| {
            tx.send((mode, result)).unwrap();
        });

        // Give the worker a moment to spawn the child.
        thread::sleep(Duration::from_millis(200));
        handle.cancel();

        let (_, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn launch_failure_arrives_through_sink() {
        let config = EngineConfig::new("/nonexistent/calc_backend");

        let (tx, rx) = mpsc::channel();
        let _handle = spawn_with(&config, Mode::DoubleIntegral, move |mode, result| {
            tx.send((mode, result)).unwrap();
        });

        let (_, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(EngineError::Launch { .. })));
    }

    #[test]
    fn failing_child_reports_status_and_stderr() {
        let path = stub_engine("job-fail", "echo 'no such mode' >&2\nexit 2");
        let config = EngineConfig::new(path);

        let (tx, rx) = mpsc::channel();
        let _handle = spawn_with(&config, Mode::IndefiniteIntegral, move |mode, result| {
            tx.send((mode, result)).unwrap();
        });

        let (_, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        match result {
            Err(EngineError::Failed { stderr, .. }) => assert_eq!(stderr, "no such mode"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
