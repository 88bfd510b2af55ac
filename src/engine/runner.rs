//! Dedicated worker thread driving continuous ticks

use anyhow::{Context, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{PlacementEngine, PlacementStatus};
use crate::constants::engine::STOP_DRAIN_TIMEOUT_MS;

/// Handle to the continuous-monitoring worker.
///
/// The worker ticks immediately, then once per interval. Ticks never overlap:
/// the worker runs them one after another on its own thread, and a tick that
/// finds another pass holding the OS guard is skipped rather than queued.
pub struct ContinuousRunner {
    engine: Arc<PlacementEngine>,
    id: u64,
    stop_tx: Option<mpsc::Sender<()>>,
    done_rx: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl ContinuousRunner {
    pub fn start(engine: Arc<PlacementEngine>, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let id = engine.begin_run();
        let worker_engine = Arc::clone(&engine);
        let handle = thread::Builder::new()
            .name("placement-engine".to_string())
            .spawn(move || {
                info!(runner = id, interval_ms = interval.as_millis() as u64, "Continuous placement started");
                loop {
                    if let Some(outcomes) = worker_engine.tick() {
                        let applied = outcomes
                            .iter()
                            .filter(|o| matches!(o.status, PlacementStatus::Applied { .. }))
                            .count();
                        if applied > 0 {
                            debug!(applied = applied, "Tick placed windows");
                        }
                    }

                    // Timer: a stop request (or a dropped sender) ends the loop
                    // before any further OS call is issued
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // A detached worker must not clear the flag of its replacement
                if !worker_engine.end_run(id) {
                    debug!(runner = id, "Replaced while stopping, leaving running flag alone");
                }
                let _ = done_tx.send(());
                info!(runner = id, "Continuous placement stopped");
            })
            .context("Failed to spawn placement engine thread")?;

        Ok(Self {
            engine,
            id,
            stop_tx: Some(stop_tx),
            done_rx,
            handle: Some(handle),
        })
    }

    /// Stop ticking. Waits a bounded time for an in-flight tick; a worker
    /// stuck on a hung platform call is detached. Returns whether it drained.
    pub fn stop(&mut self) -> bool {
        let Some(stop_tx) = self.stop_tx.take() else {
            return true;
        };
        let _ = stop_tx.send(());

        match self.done_rx.recv_timeout(Duration::from_millis(STOP_DRAIN_TIMEOUT_MS)) {
            Ok(()) => {
                if let Some(handle) = self.handle.take()
                    && handle.join().is_err()
                {
                    warn!("Placement engine thread panicked");
                }
                true
            }
            Err(_) => {
                warn!(runner = self.id, timeout_ms = STOP_DRAIN_TIMEOUT_MS, "Placement engine did not stop in time, detaching worker");
                self.handle.take();
                self.engine.end_run(self.id);
                false
            }
        }
    }
}

impl Drop for ContinuousRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
