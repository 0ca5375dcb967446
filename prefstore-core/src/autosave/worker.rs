//! The background persistence loop.

use super::rotation::RotationState;
use super::WriteStats;
#[cfg(feature = "metrics")]
use crate::observability::{MetricsTimer, PrefStoreMetrics};
use crate::store::Snapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Single consumer of the snapshot queue and the only writer of the rotation files
pub(super) struct Worker {
    pub(super) rotation: RotationState,
    pub(super) queue: mpsc::UnboundedReceiver<Snapshot>,
    pub(super) cancel: watch::Receiver<bool>,
    pub(super) debounce: Duration,
    /// Last snapshot known to be on disk
    pub(super) last_remote: Snapshot,
    pub(super) stats: Arc<WriteStats>,
}

impl Worker {
    /// Run until cancelled and drained, then hand the rotation files back
    pub(super) async fn run(mut self) -> RotationState {
        let mut pending: Option<Snapshot> = None;
        let mut cancelled = false;

        loop {
            cancelled = cancelled || *self.cancel.borrow();
            if !cancelled {
                tokio::select! {
                    _ = tokio::time::sleep(self.debounce) => {}
                    changed = self.cancel.changed() => {
                        // A dropped sender means the engine is gone
                        cancelled = changed.is_err() || *self.cancel.borrow();
                    }
                }
            }

            let mut superseded = 0u64;
            while let Ok(snapshot) = self.queue.try_recv() {
                if pending.replace(snapshot).is_some() {
                    superseded += 1;
                }
            }
            if superseded > 0 {
                self.stats.add_coalesced(superseded);
                #[cfg(feature = "metrics")]
                PrefStoreMetrics::global().record_coalesced(superseded);
                debug!(superseded, "Coalesced queued snapshots");
            }

            if let Some(snapshot) = pending.take() {
                if snapshot.equal_to(&self.last_remote) {
                    debug!("Snapshot matches disk, skipping write");
                } else if self.write(&snapshot) {
                    self.last_remote = snapshot;
                } else if !cancelled {
                    // Retry on the next round; the marker still names the old file
                    pending = Some(snapshot);
                }
            }

            if cancelled && pending.is_none() && self.queue.is_empty() {
                break;
            }
        }

        info!(
            writes = self.stats.writes(),
            failures = self.stats.failures(),
            "Auto-save worker stopped"
        );
        self.rotation
    }

    fn write(&mut self, snapshot: &Snapshot) -> bool {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start();

        match self.rotation.write(snapshot) {
            Ok(bytes) => {
                self.stats.add_write();
                #[cfg(feature = "metrics")]
                timer.finish(bytes);
                debug!(slot = %self.rotation.last_written(), bytes, "Auto-saved settings");
                true
            }
            Err(e) => {
                self.stats.add_failure();
                #[cfg(feature = "metrics")]
                timer.finish_with_error();
                warn!(error = %e, "Auto-save write failed");
                false
            }
        }
    }
}
