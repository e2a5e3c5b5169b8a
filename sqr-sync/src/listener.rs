/// Change-event listener
///
/// One listener task per watched entity kind holds a persistent change-feed
/// subscription on the primary store and translates every notification into
/// exactly one replication task: the full changed document for inserts and
/// updates, the identity alone for deletes. Tasks are handed to the work
/// queue fire-and-forget so notification throughput never waits on
/// secondary-store latency. A malformed notification is logged and skipped;
/// a dropped feed is re-attached with exponential backoff.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sqr_core::{ChangeEvent, ChangeOp, EntityKind, PrimaryStore, RetryPolicy};

use crate::queue::{ReplicationTask, WorkQueue};

pub struct ChangeListener {
    primary: Arc<dyn PrimaryStore>,
    queue: Arc<WorkQueue>,
    resubscribe: RetryPolicy,
}

impl ChangeListener {
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        queue: Arc<WorkQueue>,
        resubscribe: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            queue,
            resubscribe,
        }
    }

    /// Spawn the subscription loop for one entity kind. The task exits when
    /// the shutdown channel fires or closes.
    pub fn spawn(
        self: Arc<Self>,
        kind: EntityKind,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff_attempt: u32 = 0;

            loop {
                match self.primary.watch(kind).await {
                    Ok(mut feed) => {
                        backoff_attempt = 0;
                        info!(entity = %kind, "change feed attached");

                        loop {
                            tokio::select! {
                                event = feed.recv() => match event {
                                    Some(event) => self.dispatch(kind, event),
                                    None => {
                                        warn!(entity = %kind, "change feed ended; resubscribing");
                                        break;
                                    }
                                },
                                _ = shutdown.changed() => {
                                    debug!(entity = %kind, "change listener stopped");
                                    return;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!(entity = %kind, error = %err, "change feed subscription failed");
                    }
                }

                let delay = self.resubscribe.backoff_duration(backoff_attempt);
                backoff_attempt = backoff_attempt.saturating_add(1);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        debug!(entity = %kind, "change listener stopped");
                        return;
                    }
                }
            }
        })
    }

    /// Translate one notification into a task and enqueue it. Never blocks;
    /// a notification that cannot be translated is logged and skipped so the
    /// feed keeps flowing.
    fn dispatch(&self, kind: EntityKind, event: ChangeEvent) {
        let task = match (event.op, event.document) {
            (ChangeOp::Insert, Some(document)) => ReplicationTask::insert(kind, document),
            (ChangeOp::Update, Some(document)) => ReplicationTask::update(kind, document),
            (ChangeOp::Delete, _) => ReplicationTask::delete(kind, event.id),
            (op, None) => {
                warn!(
                    entity = %kind,
                    id = %event.id,
                    op = ?op,
                    "change event carries no document; skipped"
                );
                return;
            }
        };

        let description = format!("realtime {}", task.describe());
        self.queue.enqueue(task, description);
    }
}
