//! Background sync worker.
//!
//! A tokio task that forwards connectivity changes into the engine and
//! requests a sync round on a fixed cadence while entries are queued. The
//! offline→online edge itself triggers an immediate drain inside the
//! reducer; the interval here is the safety net for entries that arrived
//! while already online (e.g., captured on a transient commit failure).

use crate::scan::Gate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use turnstile_runtime::retry::RetryPolicy;

/// Handle to the running worker; aborts the task on stop or drop.
#[derive(Debug)]
pub struct SyncWorker {
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Spawn the worker.
    ///
    /// `connectivity` is the signal receiver (see
    /// [`crate::connectivity::ConnectivityMonitor`]); `interval` is the
    /// sync cadence; `backoff` spaces extra rounds after one that reported
    /// transient failures, so a recovering backend is not hammered at full
    /// cadence.
    #[must_use]
    pub fn spawn(
        gate: Arc<Gate>,
        mut connectivity: watch::Receiver<bool>,
        interval: Duration,
        backoff: RetryPolicy,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut failed_rounds: usize = 0;

            loop {
                tokio::select! {
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            tracing::debug!("connectivity signal closed, sync worker exiting");
                            return;
                        }
                        let online = *connectivity.borrow_and_update();
                        if gate.set_connectivity(online).await.is_err() {
                            return; // engine shut down
                        }
                    },
                    _ = ticker.tick() => {
                        let status = gate.sync_status().await;
                        if !status.online || status.syncing || status.pending == 0 {
                            continue;
                        }
                        match gate.sync_now().await {
                            Ok(summary) if summary.failed > 0 => {
                                // Back off before the next round instead of
                                // retrying at full cadence.
                                let delay = backoff.delay_for_attempt(failed_rounds);
                                failed_rounds += 1;
                                tracing::warn!(
                                    failed = summary.failed,
                                    delay_ms = delay.as_millis(),
                                    "sync round had transient failures, backing off"
                                );
                                tokio::time::sleep(delay).await;
                            },
                            Ok(_) => failed_rounds = 0,
                            Err(error) => {
                                tracing::debug!(%error, "sync request failed, engine likely shutting down");
                                return;
                            },
                        }
                    },
                }
            }
        });

        Self { handle }
    }

    /// Stop the worker.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
