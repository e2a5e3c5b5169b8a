/// Sync status tracking
///
/// One `StatusTracker` owns the process-wide replication state: the last
/// completed batch timestamp, the running-batch guard, and the accumulated
/// batch statistics. State is in-memory only; a restart starts from an
/// empty status, which forces one extra reconciliation pass over data that
/// was already synced (an accepted at-least-once tradeoff).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Accumulated batch counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_batches: u64,
    pub successful_batches: u64,
    pub failed_batches: u64,
    pub last_error: Option<String>,
}

/// Point-in-time view of the replication state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Start time of the last completed reconciliation pass (epoch millis).
    /// `None` until the initial bulk load has run.
    pub last_batch_sync: Option<i64>,
    /// Guard against overlapping batch runs
    pub is_running: bool,
    pub stats: BatchStats,
}

/// Result of one reconciliation pass or bulk-load unit.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub synced: u64,
    pub failed: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub struct StatusTracker {
    inner: RwLock<SyncStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.inner.read().clone()
    }

    pub fn last_batch_sync(&self) -> Option<i64> {
        self.inner.read().last_batch_sync
    }

    /// Claim the running-batch guard. Returns the batch start timestamp, or
    /// `None` when a batch is already running — the caller must skip the
    /// tick entirely, leaving all counters untouched.
    pub fn try_begin_batch(&self) -> Option<i64> {
        let mut status = self.inner.write();
        if status.is_running {
            return None;
        }
        status.is_running = true;
        Some(sqr_core::now_millis())
    }

    /// Release the guard and fold one finished pass into the stats.
    /// `started_at` becomes the new watermark so records modified during
    /// the pass are re-scanned next time.
    pub fn finish_batch(&self, started_at: i64, outcome: &BatchOutcome) {
        let mut status = self.inner.write();
        status.is_running = false;
        status.last_batch_sync = Some(started_at);
        status.stats.total_batches += 1;
        if outcome.failed == 0 {
            status.stats.successful_batches += 1;
        } else {
            status.stats.failed_batches += 1;
            status.stats.last_error = outcome.last_error.clone();
        }
    }

    /// Record that the initial bulk load has completed; its start time
    /// becomes the first reconciliation watermark.
    pub fn record_initial_load(&self, started_at: i64) {
        self.inner.write().last_batch_sync = Some(started_at);
    }
}
