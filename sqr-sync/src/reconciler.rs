/// Batch reconciler
///
/// A fixed-interval pass that re-derives the set of records needing sync
/// purely from `updated_at` timestamps and drives them through the same
/// entity handlers as the real-time path. Real-time sync is therefore a
/// latency optimization, never a correctness dependency: anything it missed
/// (dropped notification, failed task, process restart) is picked up here.
/// Overlapping runs are forbidden; a tick that fires mid-run is skipped
/// outright.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sqr_core::{EntityKind, PrimaryStore};

use crate::queue::{ReplicationTask, WorkQueue};
use crate::status::{BatchOutcome, StatusTracker};

pub struct BatchReconciler {
    primary: Arc<dyn PrimaryStore>,
    queue: Arc<WorkQueue>,
    status: Arc<StatusTracker>,
    interval: Duration,
    /// Trailing window re-scanned below the watermark on every pass, so a
    /// write that landed with a slightly stale `updated_at` is still caught.
    lookback_ms: i64,
}

impl BatchReconciler {
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        queue: Arc<WorkQueue>,
        status: Arc<StatusTracker>,
        interval: Duration,
        lookback_ms: i64,
    ) -> Self {
        Self {
            primary,
            queue,
            status,
            interval,
            lookback_ms,
        }
    }

    /// Spawn the interval loop. The first tick fires after one full
    /// interval, not immediately.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    _ = timer.tick() => self.tick().await,
                    _ = shutdown.changed() => {
                        debug!("batch reconciler stopped");
                        break;
                    }
                }
            }
        })
    }

    /// One timer tick: claim the running guard or skip entirely.
    pub async fn tick(&self) {
        let Some(started_at) = self.status.try_begin_batch() else {
            debug!("reconciliation tick skipped; a batch run is still in progress");
            return;
        };

        let outcome = self.scan_all().await;
        if outcome.failed == 0 {
            info!(synced = outcome.synced, "reconciliation pass completed");
        } else {
            warn!(
                synced = outcome.synced,
                failed = outcome.failed,
                "reconciliation pass completed with failures"
            );
        }
        self.status.finish_batch(started_at, &outcome);
    }

    /// Scan every entity kind in dependency order, so a child whose parent
    /// was never replicated finds it earlier in the same run.
    async fn scan_all(&self) -> BatchOutcome {
        let since = self
            .status
            .last_batch_sync()
            .map(|watermark| watermark - self.lookback_ms);
        let mut outcome = BatchOutcome::default();

        for kind in EntityKind::DEPENDENCY_ORDER {
            match self.primary.find_updated_since(kind, since).await {
                Ok(documents) => {
                    for document in documents {
                        let record_id = document.id.clone();
                        let task = ReplicationTask::upsert(kind, document);
                        let description = format!("reconcile {}", task.describe());
                        match self.queue.submit(task, description).await {
                            Ok(()) => outcome.synced += 1,
                            Err(err) => {
                                warn!(
                                    entity = %kind,
                                    id = %record_id,
                                    error = %err,
                                    "reconciliation failed for record"
                                );
                                outcome.failed += 1;
                                outcome.last_error = Some(err.to_string());
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(
                        entity = %kind,
                        error = %err,
                        "could not scan collection for reconciliation"
                    );
                    outcome.failed += 1;
                    outcome.last_error = Some(err.to_string());
                }
            }
        }

        outcome
    }
}
