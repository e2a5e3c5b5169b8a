/// Core types for the SecureQR replication service
///
/// Store-agnostic foundation shared by the sync engine: the error taxonomy,
/// watched entity kinds, the document and row models, retry policies, and
/// the primary/secondary store contracts with in-memory implementations.

pub mod document;
pub mod entity;
pub mod error;
pub mod memory;
pub mod retry;
pub mod row;
pub mod store;

pub use document::{pack_json, unpack_json, Document};
pub use entity::EntityKind;
pub use error::{Error, Result};
pub use memory::{MemoryPrimary, MemoryRelational};
pub use retry::RetryPolicy;
pub use row::{Row, RowValue};
pub use store::{ChangeEvent, ChangeFeed, ChangeOp, PrimaryStore, SecondaryStore};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
