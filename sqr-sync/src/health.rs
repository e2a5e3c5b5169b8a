/// Health monitor
///
/// Periodically verifies liveness of both stores with a trivial probe.
/// Steady-state failures are logged and reflected in the report, never
/// fatal; recovery is logged once on the first successful probe after a
/// failure. Startup-time connectivity policy (primary fatal, secondary
/// degrades) lives in the service coordinator, not here.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sqr_core::{PrimaryStore, SecondaryStore};

/// Last observed liveness of both stores.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub primary_ok: bool,
    pub secondary_ok: bool,
    /// Epoch millis of the last completed check, `None` before the first
    pub last_check: Option<i64>,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            primary_ok: true,
            secondary_ok: true,
            last_check: None,
        }
    }
}

pub struct HealthMonitor {
    primary: Arc<dyn PrimaryStore>,
    secondary: Arc<dyn SecondaryStore>,
    state: RwLock<HealthReport>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        secondary: Arc<dyn SecondaryStore>,
        interval: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            state: RwLock::new(HealthReport::default()),
            interval,
        }
    }

    pub fn report(&self) -> HealthReport {
        self.state.read().clone()
    }

    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = timer.tick() => self.check_once().await,
                    _ = shutdown.changed() => {
                        debug!("health monitor stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Probe both stores and fold the result into the report.
    pub async fn check_once(&self) {
        let previous = self.report();

        let primary_ok = match self.primary.ping().await {
            Ok(()) => {
                if !previous.primary_ok {
                    info!("primary store health recovered");
                }
                true
            }
            Err(err) => {
                warn!(error = %err, "primary store health check failed");
                false
            }
        };

        let secondary_ok = match self.secondary.ping().await {
            Ok(()) => {
                if !previous.secondary_ok {
                    info!("secondary store health recovered");
                }
                true
            }
            Err(err) => {
                warn!(error = %err, "secondary store health check failed");
                false
            }
        };

        *self.state.write() = HealthReport {
            primary_ok,
            secondary_ok,
            last_check: Some(sqr_core::now_millis()),
        };
    }
}
