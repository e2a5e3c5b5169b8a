/// Store contracts at the replication boundary
///
/// The engine talks to exactly two collaborators: the authoritative
/// document store (primary) and the relational replica (secondary). Both
/// are behind async traits so embedders can plug real clients while tests
/// use the in-memory implementations from `memory`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{Document, EntityKind, Result, Row};

/// Kind of change carried by a change-feed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One notification from a per-collection change feed.
///
/// Inserts and updates carry the full changed document; deletes carry only
/// the identity of the removed record.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    /// Primary-store identity of the affected record
    pub id: String,
    pub document: Option<Document>,
}

/// Receiving end of a change-feed subscription. The feed ends (yields
/// `None`) when the underlying subscription drops; the listener owns the
/// resubscription policy.
pub type ChangeFeed = mpsc::UnboundedReceiver<ChangeEvent>;

/// The authoritative document store.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Trivial liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Attach a persistent change-feed subscription for one entity kind.
    async fn watch(&self, kind: EntityKind) -> Result<ChangeFeed>;

    /// Records whose `updated_at` strictly exceeds `since` (all records
    /// when `since` is `None`), ordered by `updated_at` ascending.
    async fn find_updated_since(
        &self,
        kind: EntityKind,
        since: Option<i64>,
    ) -> Result<Vec<Document>>;

    /// Every record of the kind, ordered by creation time ascending.
    async fn find_all_by_creation(&self, kind: EntityKind) -> Result<Vec<Document>>;
}

/// The relational replica.
///
/// Rows are addressed by the primary-store identity recorded in a dedicated
/// mapping column; the store assigns its own integer surrogate key on
/// insert. All values arrive as typed parameters ([`Row`]), never as query
/// text.
#[async_trait]
pub trait SecondaryStore: Send + Sync {
    /// Trivial liveness probe ("SELECT 1"-equivalent).
    async fn ping(&self) -> Result<()>;

    /// Create the kind's table if it does not exist.
    async fn ensure_schema(&self, kind: EntityKind) -> Result<()>;

    /// Insert one row recorded under `source_id`; returns the new surrogate
    /// key. Fails with `AlreadyExists` if the identity is already mapped.
    async fn insert(&self, kind: EntityKind, source_id: &str, row: Row) -> Result<i64>;

    /// Overwrite the mutable columns of the row recorded under `source_id`.
    /// Fails with `NotFound` if no such row exists.
    async fn update(&self, kind: EntityKind, source_id: &str, row: Row) -> Result<()>;

    /// Remove the row recorded under `source_id`. Idempotent: deleting an
    /// absent row succeeds.
    async fn delete(&self, kind: EntityKind, source_id: &str) -> Result<()>;

    /// Surrogate key previously recorded for `source_id`, if any.
    async fn surrogate_for(&self, kind: EntityKind, source_id: &str) -> Result<Option<i64>>;
}
