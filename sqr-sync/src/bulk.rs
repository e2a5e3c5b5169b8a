/// Initial bulk loader
///
/// One-time full copy of every existing record from the primary store into
/// the secondary store, run before real-time or batch sync starts (when no
/// reconciliation watermark is recorded yet). Entity kinds are processed in
/// dependency order; within a kind, records are fetched ordered by creation
/// time. Successes and failures are counted independently per kind, and a
/// fully failed kind never prevents the remaining kinds from being
/// attempted.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use sqr_core::{EntityKind, PrimaryStore};

use crate::queue::{ReplicationTask, WorkQueue};

/// Per-kind load report.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    pub kind: EntityKind,
    pub total_records: usize,
    pub synced_records: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

pub struct InitialLoader {
    primary: Arc<dyn PrimaryStore>,
    queue: Arc<WorkQueue>,
}

impl InitialLoader {
    pub fn new(primary: Arc<dyn PrimaryStore>, queue: Arc<WorkQueue>) -> Self {
        Self { primary, queue }
    }

    /// Copy everything, one kind at a time, one awaited record at a time.
    /// Uses upsert semantics so a restart that lost the in-memory watermark
    /// can run the load again over an already-populated replica.
    pub async fn run(&self) -> Vec<EntitySummary> {
        let mut summaries = Vec::with_capacity(EntityKind::DEPENDENCY_ORDER.len());

        for kind in EntityKind::DEPENDENCY_ORDER {
            let started = Instant::now();
            let mut total_records = 0;
            let mut synced_records = 0;
            let mut errors = 0;

            match self.primary.find_all_by_creation(kind).await {
                Ok(documents) => {
                    total_records = documents.len();
                    for document in documents {
                        let record_id = document.id.clone();
                        let task = ReplicationTask::upsert(kind, document);
                        let description = format!("initial-load {}", task.describe());
                        match self.queue.submit(task, description).await {
                            Ok(()) => synced_records += 1,
                            Err(err) => {
                                warn!(
                                    entity = %kind,
                                    id = %record_id,
                                    error = %err,
                                    "initial load failed for record"
                                );
                                errors += 1;
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(
                        entity = %kind,
                        error = %err,
                        "could not fetch collection for initial load"
                    );
                    errors += 1;
                }
            }

            let summary = EntitySummary {
                kind,
                total_records,
                synced_records,
                errors,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            info!(
                entity = %kind,
                total = summary.total_records,
                synced = summary.synced_records,
                errors = summary.errors,
                duration_ms = summary.duration_ms,
                "initial load finished for entity type"
            );
            summaries.push(summary);
        }

        summaries
    }
}
