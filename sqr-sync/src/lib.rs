/// Dual-store replication engine for SecureQR
///
/// Keeps a relational replica eventually consistent with the authoritative
/// document store through three cooperating paths: change-feed listeners
/// for low latency, a timestamp-driven batch reconciler for correctness,
/// and a one-time bulk load for first start. All secondary-store writes
/// flow through a single FIFO work queue.

pub mod bulk;
pub mod handlers;
pub mod health;
pub mod idmap;
pub mod listener;
pub mod queue;
pub mod reconciler;
pub mod service;
pub mod status;

pub use bulk::{EntitySummary, InitialLoader};
pub use handlers::{EntityHandler, HandlerContext, Handlers};
pub use health::{HealthMonitor, HealthReport};
pub use idmap::IdentityMap;
pub use listener::ChangeListener;
pub use queue::{QueueStats, ReplicationTask, TaskOp, WorkQueue};
pub use reconciler::BatchReconciler;
pub use service::{ServiceMode, SyncService};
pub use status::{BatchOutcome, BatchStats, StatusTracker, SyncStatus};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use sqr_core::{PrimaryStore, RetryPolicy, SecondaryStore};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between reconciliation passes
    pub batch_interval: Duration,
    /// Interval between store liveness probes
    pub health_interval: Duration,
    /// Retry policy for replication tasks
    pub retry: RetryPolicy,
    /// Backoff policy for re-attaching dropped change feeds
    pub resubscribe: RetryPolicy,
    /// Trailing window re-scanned below the reconciliation watermark
    pub lookback_ms: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_secs(300),
            health_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            resubscribe: RetryPolicy::resubscribe(),
            lookback_ms: 60_000,
        }
    }
}

/// Builder for assembling a [`SyncService`].
pub struct SyncServiceBuilder {
    primary: Option<Arc<dyn PrimaryStore>>,
    secondary: Option<Arc<dyn SecondaryStore>>,
    config: SyncConfig,
}

impl SyncServiceBuilder {
    pub fn new() -> Self {
        Self {
            primary: None,
            secondary: None,
            config: SyncConfig::default(),
        }
    }

    pub fn with_primary(mut self, primary: Arc<dyn PrimaryStore>) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn SecondaryStore>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.config.batch_interval = interval;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.config.health_interval = interval;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn with_resubscribe_policy(mut self, resubscribe: RetryPolicy) -> Self {
        self.config.resubscribe = resubscribe;
        self
    }

    pub fn with_lookback_ms(mut self, lookback_ms: i64) -> Self {
        self.config.lookback_ms = lookback_ms;
        self
    }

    pub fn build(self) -> Result<SyncService> {
        let primary = self
            .primary
            .ok_or_else(|| anyhow::anyhow!("primary store is required"))?;
        let secondary = self
            .secondary
            .ok_or_else(|| anyhow::anyhow!("secondary store is required"))?;
        Ok(SyncService::new(self.config, primary, secondary))
    }
}

impl Default for SyncServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqr_core::{MemoryPrimary, MemoryRelational};

    #[test]
    fn default_config_matches_contract() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_interval, Duration::from_secs(300));
        assert_eq!(config.health_interval, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.lookback_ms, 60_000);
    }

    #[test]
    fn builder_requires_both_stores() {
        let err = SyncServiceBuilder::new().build().err().unwrap();
        assert!(err.to_string().contains("primary store is required"));

        let err = SyncServiceBuilder::new()
            .with_primary(Arc::new(MemoryPrimary::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("secondary store is required"));

        let service = SyncServiceBuilder::new()
            .with_primary(Arc::new(MemoryPrimary::new()))
            .with_secondary(Arc::new(MemoryRelational::new()))
            .with_batch_interval(Duration::from_secs(1))
            .build()
            .unwrap();
        assert_eq!(service.mode(), ServiceMode::Full);
    }
}
