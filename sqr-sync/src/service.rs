/// Service coordinator
///
/// Owns the startup sequence: verify connectivity to both stores, ensure
/// the secondary schema, run the initial bulk load when no reconciliation
/// watermark exists, attach one change listener per entity kind, then start
/// the batch reconciler and health monitor. The primary store being
/// unreachable at startup is fatal; the secondary being unreachable
/// degrades the service into primary-only mode where sync is simply not
/// started. All background loops stop through a shared shutdown channel.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sqr_core::{now_millis, EntityKind, PrimaryStore, SecondaryStore};

use crate::bulk::{EntitySummary, InitialLoader};
use crate::handlers::Handlers;
use crate::health::{HealthMonitor, HealthReport};
use crate::idmap::IdentityMap;
use crate::listener::ChangeListener;
use crate::queue::{QueueStats, WorkQueue};
use crate::reconciler::BatchReconciler;
use crate::status::{StatusTracker, SyncStatus};
use crate::SyncConfig;

/// Operating mode decided at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// Real-time sync, batch reconciliation and health monitoring
    Full,
    /// Secondary store was unreachable at startup: health monitoring only
    PrimaryOnly,
}

pub struct SyncService {
    config: SyncConfig,
    primary: Arc<dyn PrimaryStore>,
    secondary: Arc<dyn SecondaryStore>,
    queue: Arc<WorkQueue>,
    status: Arc<StatusTracker>,
    health: Arc<HealthMonitor>,
    reconciler: Arc<BatchReconciler>,
    mode: ServiceMode,
    initial_load: Option<Vec<EntitySummary>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        primary: Arc<dyn PrimaryStore>,
        secondary: Arc<dyn SecondaryStore>,
    ) -> Self {
        let idmap = IdentityMap::new();
        let handlers = Arc::new(Handlers::new(secondary.clone(), idmap));
        let queue = Arc::new(WorkQueue::new(handlers, config.retry.clone()));
        let status = Arc::new(StatusTracker::new());
        let health = Arc::new(HealthMonitor::new(
            primary.clone(),
            secondary.clone(),
            config.health_interval,
        ));
        let reconciler = Arc::new(BatchReconciler::new(
            primary.clone(),
            queue.clone(),
            status.clone(),
            config.batch_interval,
            config.lookback_ms,
        ));

        Self {
            config,
            primary,
            secondary,
            queue,
            status,
            health,
            reconciler,
            mode: ServiceMode::Full,
            initial_load: None,
            shutdown_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Bring the service up. Fatal only when the primary store cannot be
    /// reached; a dead secondary store yields `Ok(PrimaryOnly)`.
    pub async fn start(&mut self) -> Result<ServiceMode> {
        if self.shutdown_tx.is_some() {
            return Ok(self.mode);
        }

        self.primary
            .ping()
            .await
            .context("primary store unreachable at startup")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        // Health monitoring runs in every mode.
        self.tasks
            .push(Arc::clone(&self.health).spawn(shutdown_rx.clone()));

        if let Err(err) = self.secondary.ping().await {
            warn!(
                error = %err,
                "secondary store unreachable at startup; running in primary-only mode"
            );
            self.mode = ServiceMode::PrimaryOnly;
            return Ok(ServiceMode::PrimaryOnly);
        }

        for kind in EntityKind::DEPENDENCY_ORDER {
            self.secondary
                .ensure_schema(kind)
                .await
                .with_context(|| format!("could not ensure schema for {}", kind))?;
        }

        self.tasks.push(self.queue.start());

        if self.status.last_batch_sync().is_none() {
            info!("no reconciliation watermark recorded; running initial bulk load");
            let started_at = now_millis();
            let loader = InitialLoader::new(self.primary.clone(), self.queue.clone());
            let summaries = loader.run().await;
            self.status.record_initial_load(started_at);
            self.initial_load = Some(summaries);
        }

        let listener = Arc::new(ChangeListener::new(
            self.primary.clone(),
            self.queue.clone(),
            self.config.resubscribe.clone(),
        ));
        for kind in EntityKind::DEPENDENCY_ORDER {
            self.tasks
                .push(Arc::clone(&listener).spawn(kind, shutdown_rx.clone()));
        }

        self.tasks
            .push(Arc::clone(&self.reconciler).spawn(shutdown_rx));

        self.mode = ServiceMode::Full;
        info!("sync service started");
        Ok(ServiceMode::Full)
    }

    /// Signal every background loop to stop and let the queue drain the
    /// tasks already ahead of the shutdown marker. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
            info!("sync service shutting down");
        }
        self.queue.close();
        self.tasks.clear();
    }

    /// Run one reconciliation pass immediately, outside the timer.
    pub async fn reconcile_now(&self) {
        self.reconciler.tick().await;
    }

    pub fn mode(&self) -> ServiceMode {
        self.mode
    }

    pub fn status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    pub fn health(&self) -> HealthReport {
        self.health.report()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Per-kind summaries of the initial bulk load, when one ran.
    pub fn initial_load_summary(&self) -> Option<&[EntitySummary]> {
        self.initial_load.as_deref()
    }
}
