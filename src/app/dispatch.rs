//! Single-flight dispatch of engine invocations.
//!
//! At most one computation runs at a time. A trigger while busy is rejected
//! outright rather than queued; a cancel kills the in-flight child but the
//! dispatcher stays busy until the worker's final (cancelled) delivery is
//! acknowledged, so results can never interleave.

use log::{info, warn};

use crate::engine::{ComputationResult, EngineConfig, job};
use crate::modes::Mode;

pub struct Dispatcher {
    config: EngineConfig,
    active: Option<job::JobHandle>,
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// The mode currently in flight, if any.
    pub fn active_mode(&self) -> Option<Mode> {
        self.active.as_ref().map(|job| job.mode())
    }

    /// Start a computation unless one is already running.
    ///
    /// Returns false on rejection. The sink fires exactly once from the
    /// worker thread; the caller must route that delivery back into
    /// [`Dispatcher::finish`].
    pub fn trigger(
        &mut self,
        mode: Mode,
        sink: impl FnOnce(Mode, ComputationResult) + Send + 'static,
    ) -> bool {
        if let Some(active) = &self.active {
            warn!(
                "rejecting {mode}: {} still in flight",
                active.mode()
            );
            return false;
        }

        info!("dispatching {mode}");
        self.active = Some(job::spawn_with(&self.config, mode, sink));
        true
    }

    /// Cancel the in-flight computation, if any. Returns whether one existed.
    ///
    /// The dispatcher stays busy until the worker's cancelled delivery
    /// reaches [`Dispatcher::finish`].
    pub fn cancel(&mut self) -> bool {
        match &self.active {
            Some(job) => {
                job.cancel();
                true
            }
            None => false,
        }
    }

    /// Acknowledge a delivery for `mode`, clearing the busy state.
    ///
    /// A delivery for a different mode than the active one is ignored; it
    /// can only come from a job already acknowledged.
    pub fn finish(&mut self, mode: Mode) {
        if self.active.as_ref().map(|job| job.mode()) == Some(mode) {
            self.active = None;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::engine::test_support::stub_engine;
    use std::sync::mpsc;
    use std::time::Duration;

    fn channel_sink(
        tx: mpsc::Sender<(Mode, ComputationResult)>,
    ) -> impl FnOnce(Mode, ComputationResult) + Send + 'static {
        move |mode, result| {
            let _ = tx.send((mode, result));
        }
    }

    #[test]
    fn second_trigger_is_rejected_while_busy() {
        let path = stub_engine("dispatch-busy", "exec sleep 30");
        let mut dispatcher = Dispatcher::new(EngineConfig::new(path));

        let (tx, rx) = mpsc::channel();
        assert!(dispatcher.trigger(Mode::IndefiniteIntegral, channel_sink(tx.clone())));
        assert!(dispatcher.is_busy());
        assert_eq!(dispatcher.active_mode(), Some(Mode::IndefiniteIntegral));

        assert!(!dispatcher.trigger(Mode::PartialDerivative, channel_sink(tx)));

        dispatcher.cancel();
        let _ = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn finish_clears_busy_and_allows_retrigger() {
        let path = stub_engine("dispatch-finish", r#"echo "2x""#);
        let mut dispatcher = Dispatcher::new(EngineConfig::new(path));

        let (tx, rx) = mpsc::channel();
        assert!(dispatcher.trigger(Mode::PartialDerivative, channel_sink(tx.clone())));

        let (mode, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.unwrap(), "2x");

        dispatcher.finish(mode);
        assert!(!dispatcher.is_busy());
        assert!(dispatcher.trigger(Mode::IndefiniteIntegral, channel_sink(tx)));
        let _ = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn cancel_stays_busy_until_delivery_is_acknowledged() {
        let path = stub_engine("dispatch-cancel", "exec sleep 30");
        let mut dispatcher = Dispatcher::new(EngineConfig::new(path));

        let (tx, rx) = mpsc::channel();
        assert!(dispatcher.trigger(Mode::DoubleIntegral, channel_sink(tx)));
        assert!(dispatcher.cancel());

        // Busy until the worker confirms.
        assert!(dispatcher.is_busy());

        let (mode, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));

        dispatcher.finish(mode);
        assert!(!dispatcher.is_busy());
    }

    #[test]
    fn cancel_without_active_job_is_a_noop() {
        let path = stub_engine("dispatch-noop", "true");
        let mut dispatcher = Dispatcher::new(EngineConfig::new(path));
        assert!(!dispatcher.cancel());
    }
}
