/// Replication work queue
///
/// Serializes every secondary-store write into a strict FIFO consumed by a
/// single worker, so dependent-entity ordering and write contention need no
/// explicit locking. `enqueue` never fails; a task's failure is caught,
/// logged against its description, and the queue proceeds. Retryable
/// failures are re-enqueued after a scheduled backoff delay — the worker
/// itself never sleeps, so one backing-off task cannot stall the pipeline.
/// Permanently failed tasks are logged and dropped; the batch reconciler
/// re-derives missed work from timestamps.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sqr_core::{Document, EntityKind, Error, Result, RetryPolicy};

use crate::handlers::Handlers;

/// Operation carried by a replication task.
#[derive(Debug, Clone)]
pub enum TaskOp {
    /// Replicate a newly created document
    Insert(Document),
    /// Overwrite the mutable fields of an existing row
    Update(Document),
    /// Insert-or-update; produced by paths that cannot know whether the
    /// row exists yet (reconciler, bulk loader)
    Upsert(Document),
    /// Remove the row for a primary-store identity
    Delete(String),
}

impl TaskOp {
    fn name(&self) -> &'static str {
        match self {
            TaskOp::Insert(_) => "insert",
            TaskOp::Update(_) => "update",
            TaskOp::Upsert(_) => "upsert",
            TaskOp::Delete(_) => "delete",
        }
    }

    fn record_id(&self) -> &str {
        match self {
            TaskOp::Insert(doc) | TaskOp::Update(doc) | TaskOp::Upsert(doc) => &doc.id,
            TaskOp::Delete(id) => id,
        }
    }
}

/// One unit of replication work.
#[derive(Debug, Clone)]
pub struct ReplicationTask {
    /// Correlation id for log lines
    pub id: String,
    pub kind: EntityKind,
    pub op: TaskOp,
    /// 0-indexed execution attempt
    pub attempt: u32,
}

impl ReplicationTask {
    fn new(kind: EntityKind, op: TaskOp) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            op,
            attempt: 0,
        }
    }

    pub fn insert(kind: EntityKind, document: Document) -> Self {
        Self::new(kind, TaskOp::Insert(document))
    }

    pub fn update(kind: EntityKind, document: Document) -> Self {
        Self::new(kind, TaskOp::Update(document))
    }

    pub fn upsert(kind: EntityKind, document: Document) -> Self {
        Self::new(kind, TaskOp::Upsert(document))
    }

    pub fn delete(kind: EntityKind, source_id: impl Into<String>) -> Self {
        Self::new(kind, TaskOp::Delete(source_id.into()))
    }

    pub fn describe(&self) -> String {
        format!("{} {} {}", self.op.name(), self.kind, self.op.record_id())
    }
}

struct QueuedTask {
    task: ReplicationTask,
    description: String,
    done: Option<oneshot::Sender<Result<()>>>,
}

enum Message {
    Task(QueuedTask),
    /// Resolves once every previously enqueued task has been executed
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

/// Queue counters, exposed for inspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
}

pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Message>,
    /// Taken by the worker on start
    rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    handlers: Arc<Handlers>,
    retry: RetryPolicy,
    stats: RwLock<QueueStats>,
}

impl WorkQueue {
    pub fn new(handlers: Arc<Handlers>, retry: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            handlers,
            retry,
            stats: RwLock::new(QueueStats::default()),
        }
    }

    /// Start the single consumer. Tasks enqueued before this point are
    /// buffered and execute once the worker runs.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = match self.rx.lock().take() {
            Some(rx) => rx,
            None => {
                warn!("work queue worker already started");
                return tokio::spawn(async {});
            }
        };

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Task(queued) => queue.execute(queued).await,
                    Message::Barrier(done) => {
                        let _ = done.send(());
                    }
                    Message::Shutdown => {
                        info!("work queue shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Fire-and-forget submission; never fails. The task's eventual failure
    /// is logged against `description`.
    pub fn enqueue(&self, task: ReplicationTask, description: impl Into<String>) {
        let description = description.into();
        self.stats.write().enqueued += 1;
        let queued = QueuedTask {
            task,
            description,
            done: None,
        };
        if let Err(err) = self.tx.send(Message::Task(queued)) {
            if let Message::Task(queued) = err.0 {
                error!(task = %queued.description, "task dropped; work queue closed");
            }
        }
    }

    /// Submission that reports the task's final outcome (after retries).
    /// Used by the reconciler and bulk loader to count per-record results.
    pub async fn submit(
        &self,
        task: ReplicationTask,
        description: impl Into<String>,
    ) -> Result<()> {
        let description = description.into();
        self.stats.write().enqueued += 1;
        let (done_tx, done_rx) = oneshot::channel();
        let queued = QueuedTask {
            task,
            description,
            done: Some(done_tx),
        };
        if self.tx.send(Message::Task(queued)).is_err() {
            return Err(Error::Internal("work queue closed".into()));
        }
        done_rx
            .await
            .unwrap_or_else(|_| Err(Error::Internal("work queue dropped task".into())))
    }

    /// Wait until everything enqueued so far has executed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Message::Barrier(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Stop the worker once the already-queued messages ahead of the signal
    /// have drained.
    pub fn close(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.read().clone()
    }

    async fn execute(self: &Arc<Self>, queued: QueuedTask) {
        let QueuedTask {
            task,
            description,
            done,
        } = queued;

        match self.handlers.apply(&task).await {
            Ok(()) => {
                self.stats.write().completed += 1;
                debug!(task = %description, task_id = %task.id, "replication task completed");
                if let Some(done) = done {
                    let _ = done.send(Ok(()));
                }
            }
            Err(err) => {
                let next_attempt = task.attempt + 1;
                if err.is_retryable() && next_attempt < self.retry.max_attempts {
                    self.schedule_retry(task, description, done, err);
                } else {
                    self.stats.write().failed += 1;
                    error!(
                        task = %description,
                        task_id = %task.id,
                        error = %err,
                        code = err.code(),
                        attempts = next_attempt,
                        "replication task failed permanently"
                    );
                    if let Some(done) = done {
                        let _ = done.send(Err(err));
                    }
                }
            }
        }
    }

    fn schedule_retry(
        &self,
        mut task: ReplicationTask,
        description: String,
        done: Option<oneshot::Sender<Result<()>>>,
        err: Error,
    ) {
        let delay = self.retry.backoff_duration(task.attempt);
        task.attempt += 1;
        self.stats.write().retried += 1;
        warn!(
            task = %description,
            task_id = %task.id,
            error = %err,
            attempt = task.attempt,
            delay_ms = delay.as_millis() as u64,
            "replication task failed; retry scheduled"
        );

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let queued = QueuedTask {
                task,
                description,
                done,
            };
            if let Err(send_err) = tx.send(Message::Task(queued)) {
                if let Message::Task(queued) = send_err.0 {
                    if let Some(done) = queued.done {
                        let _ =
                            done.send(Err(Error::Internal("work queue closed before retry".into())));
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idmap::IdentityMap;
    use sqr_core::{MemoryRelational, SecondaryStore};
    use std::time::Duration;

    fn user_doc(id: &str) -> Document {
        Document::new(id)
            .with("email", format!("{}@example.com", id))
            .with("name", id)
    }

    fn queue_over(store: Arc<MemoryRelational>, retry: RetryPolicy) -> Arc<WorkQueue> {
        let handlers = Arc::new(Handlers::new(store, IdentityMap::new()));
        let queue = Arc::new(WorkQueue::new(handlers, retry));
        queue.start();
        queue
    }

    #[tokio::test]
    async fn tasks_execute_in_enqueue_order() {
        let store = Arc::new(MemoryRelational::new());
        let queue = queue_over(store.clone(), RetryPolicy::no_retry());

        let artifact = |active: bool| {
            Document::new("q1")
                .with("user_id", "u1")
                .with("title", "My QR")
                .with("content", "https://example.com")
                .with("is_active", active)
        };

        queue.enqueue(
            ReplicationTask::insert(EntityKind::User, user_doc("u1")),
            "test insert u1",
        );
        queue.enqueue(
            ReplicationTask::insert(EntityKind::EncodedArtifact, artifact(true)),
            "test insert q1",
        );
        // Two rapid updates: the last-enqueued one must win.
        queue.enqueue(
            ReplicationTask::update(EntityKind::EncodedArtifact, artifact(true)),
            "test update q1 active",
        );
        queue.enqueue(
            ReplicationTask::update(EntityKind::EncodedArtifact, artifact(false)),
            "test update q1 inactive",
        );
        queue.flush().await;

        let row = store
            .row_for_source(EntityKind::EncodedArtifact, "q1")
            .unwrap();
        assert_eq!(row.get("is_active").unwrap().as_bool(), Some(false));
        assert_eq!(queue.stats().completed, 4);
    }

    #[tokio::test]
    async fn failing_task_is_logged_and_queue_proceeds() {
        let store = Arc::new(MemoryRelational::new());
        let queue = queue_over(store.clone(), RetryPolicy::no_retry());

        // Child before parent: fails fast, non-retryable.
        let scan = Document::new("s1")
            .with("artifact_id", "missing")
            .with("scanned_at", 1_000);
        queue.enqueue(
            ReplicationTask::insert(EntityKind::ScanEvent, scan),
            "test insert s1",
        );
        queue.enqueue(
            ReplicationTask::insert(EntityKind::User, user_doc("u1")),
            "test insert u1",
        );
        queue.flush().await;

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(store.row_count(EntityKind::User), 1);
        assert_eq!(store.row_count(EntityKind::ScanEvent), 0);
    }

    #[tokio::test]
    async fn retryable_failure_is_re_enqueued_and_recovers() {
        let store = Arc::new(MemoryRelational::new());
        let queue = queue_over(store.clone(), RetryPolicy::fast());

        store.set_available(false);
        let store_clone = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store_clone.set_available(true);
        });

        // Attempts land at ~0ms and ~10ms (store down), then ~30ms (up).
        queue
            .submit(
                ReplicationTask::insert(EntityKind::User, user_doc("u1")),
                "test insert u1",
            )
            .await
            .unwrap();

        assert_eq!(store.row_count(EntityKind::User), 1);
        let stats = queue.stats();
        assert_eq!(stats.completed, 1);
        assert!(stats.retried >= 1);
    }

    #[tokio::test]
    async fn retries_exhaust_into_permanent_failure() {
        let store = Arc::new(MemoryRelational::new());
        let queue = queue_over(store.clone(), RetryPolicy::new(2, 10, 20, 2.0));

        store.set_available(false);
        let err = queue
            .submit(
                ReplicationTask::insert(EntityKind::User, user_doc("u1")),
                "test insert u1",
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "UNAVAILABLE");
        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 1);
    }

    #[tokio::test]
    async fn delete_through_queue_is_idempotent() {
        let store = Arc::new(MemoryRelational::new());
        store
            .insert(EntityKind::User, "u1", sqr_core::Row::new().text("name", "a"))
            .await
            .unwrap();
        let queue = queue_over(store.clone(), RetryPolicy::no_retry());

        queue
            .submit(
                ReplicationTask::delete(EntityKind::User, "u1"),
                "test delete u1",
            )
            .await
            .unwrap();
        // Second delete of the same row must also succeed.
        queue
            .submit(
                ReplicationTask::delete(EntityKind::User, "u1"),
                "test delete u1 again",
            )
            .await
            .unwrap();

        assert_eq!(store.row_count(EntityKind::User), 0);
        assert_eq!(queue.stats().failed, 0);
    }

    #[tokio::test]
    async fn enqueue_after_close_does_not_panic() {
        let store = Arc::new(MemoryRelational::new());
        let queue = queue_over(store, RetryPolicy::no_retry());

        queue.close();
        // Give the worker a moment to observe the shutdown message.
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.enqueue(
            ReplicationTask::insert(EntityKind::User, user_doc("u1")),
            "test insert after close",
        );
    }
}
