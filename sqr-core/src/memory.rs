/// In-memory store implementations
///
/// `MemoryPrimary` and `MemoryRelational` implement the store contracts
/// entirely in process memory: collections as ordered maps, change feeds as
/// unbounded channels, surrogate keys as a per-table counter. They back the
/// engine's test suite and let embedders run the pipeline without external
/// services. Both expose an availability toggle for fault injection.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;

use async_trait::async_trait;

use crate::{
    ChangeEvent, ChangeFeed, ChangeOp, Document, EntityKind, Error, PrimaryStore, Result, Row,
    SecondaryStore,
};

/// In-memory document store with per-collection change feeds.
pub struct MemoryPrimary {
    collections: RwLock<HashMap<EntityKind, BTreeMap<String, Document>>>,
    watchers: RwLock<HashMap<EntityKind, Vec<mpsc::UnboundedSender<ChangeEvent>>>>,
    available: RwLock<bool>,
}

impl MemoryPrimary {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            watchers: RwLock::new(HashMap::new()),
            available: RwLock::new(true),
        }
    }

    /// Fault injection: an unavailable store fails pings, queries and new
    /// subscriptions.
    pub fn set_available(&self, available: bool) {
        *self.available.write() = available;
    }

    /// Insert a document and notify watchers.
    pub fn insert_document(&self, kind: EntityKind, document: Document) {
        let id = document.id.clone();
        self.collections
            .write()
            .entry(kind)
            .or_default()
            .insert(id.clone(), document.clone());
        self.emit(
            kind,
            ChangeEvent {
                op: ChangeOp::Insert,
                id,
                document: Some(document),
            },
        );
    }

    /// Overwrite a document and notify watchers.
    pub fn update_document(&self, kind: EntityKind, document: Document) {
        let id = document.id.clone();
        self.collections
            .write()
            .entry(kind)
            .or_default()
            .insert(id.clone(), document.clone());
        self.emit(
            kind,
            ChangeEvent {
                op: ChangeOp::Update,
                id,
                document: Some(document),
            },
        );
    }

    /// Remove a document and notify watchers with its identity only.
    pub fn delete_document(&self, kind: EntityKind, id: &str) {
        self.collections
            .write()
            .entry(kind)
            .or_default()
            .remove(id);
        self.emit(
            kind,
            ChangeEvent {
                op: ChangeOp::Delete,
                id: id.to_string(),
                document: None,
            },
        );
    }

    pub fn document_count(&self, kind: EntityKind) -> usize {
        self.collections
            .read()
            .get(&kind)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Drop every active subscription, ending all feeds. Subscribers see the
    /// feed close and must resubscribe.
    pub fn close_feeds(&self) {
        self.watchers.write().clear();
    }

    fn emit(&self, kind: EntityKind, event: ChangeEvent) {
        let mut watchers = self.watchers.write();
        if let Some(list) = watchers.get_mut(&kind) {
            list.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn check_available(&self) -> Result<()> {
        if *self.available.read() {
            Ok(())
        } else {
            Err(Error::Unavailable("primary store is offline".into()))
        }
    }
}

#[async_trait]
impl PrimaryStore for MemoryPrimary {
    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn watch(&self, kind: EntityKind) -> Result<ChangeFeed> {
        self.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.write().entry(kind).or_default().push(tx);
        Ok(rx)
    }

    async fn find_updated_since(
        &self,
        kind: EntityKind,
        since: Option<i64>,
    ) -> Result<Vec<Document>> {
        self.check_available()?;
        let collections = self.collections.read();
        let mut docs: Vec<Document> = collections
            .get(&kind)
            .map(|m| {
                m.values()
                    .filter(|d| since.map_or(true, |t| d.updated_at() > t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by_key(Document::updated_at);
        Ok(docs)
    }

    async fn find_all_by_creation(&self, kind: EntityKind) -> Result<Vec<Document>> {
        self.check_available()?;
        let collections = self.collections.read();
        let mut docs: Vec<Document> = collections
            .get(&kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        docs.sort_by_key(Document::created_at);
        Ok(docs)
    }
}

#[derive(Default)]
struct Table {
    rows: BTreeMap<i64, Row>,
    by_source: HashMap<String, i64>,
    next_id: i64,
}

/// In-memory relational replica with integer surrogate keys.
pub struct MemoryRelational {
    tables: RwLock<HashMap<EntityKind, Table>>,
    available: RwLock<bool>,
}

impl MemoryRelational {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            available: RwLock::new(true),
        }
    }

    /// Fault injection: an unavailable store fails every operation.
    pub fn set_available(&self, available: bool) {
        *self.available.write() = available;
    }

    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.tables
            .read()
            .get(&kind)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Test/inspection accessor: the stored row for a primary identity.
    pub fn row_for_source(&self, kind: EntityKind, source_id: &str) -> Option<Row> {
        let tables = self.tables.read();
        let table = tables.get(&kind)?;
        let surrogate = table.by_source.get(source_id)?;
        table.rows.get(surrogate).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if *self.available.read() {
            Ok(())
        } else {
            Err(Error::Unavailable("secondary store is offline".into()))
        }
    }
}

#[async_trait]
impl SecondaryStore for MemoryRelational {
    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn ensure_schema(&self, kind: EntityKind) -> Result<()> {
        self.check_available()?;
        self.tables.write().entry(kind).or_default();
        Ok(())
    }

    async fn insert(&self, kind: EntityKind, source_id: &str, row: Row) -> Result<i64> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let table = tables.entry(kind).or_default();

        if table.by_source.contains_key(source_id) {
            return Err(Error::AlreadyExists(format!(
                "{} row for source id {}",
                kind, source_id
            )));
        }

        table.next_id += 1;
        let surrogate = table.next_id;
        table.rows.insert(surrogate, row);
        table.by_source.insert(source_id.to_string(), surrogate);
        Ok(surrogate)
    }

    async fn update(&self, kind: EntityKind, source_id: &str, row: Row) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let table = tables.entry(kind).or_default();

        let surrogate = *table.by_source.get(source_id).ok_or_else(|| {
            Error::NotFound(format!("{} with source id {} not found", kind, source_id))
        })?;

        match table.rows.get_mut(&surrogate) {
            Some(existing) => {
                existing.merge(&row);
                Ok(())
            }
            None => Err(Error::Internal(format!(
                "dangling surrogate {} for {} source id {}",
                surrogate, kind, source_id
            ))),
        }
    }

    async fn delete(&self, kind: EntityKind, source_id: &str) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let table = tables.entry(kind).or_default();

        if let Some(surrogate) = table.by_source.remove(source_id) {
            table.rows.remove(&surrogate);
        }
        Ok(())
    }

    async fn surrogate_for(&self, kind: EntityKind, source_id: &str) -> Result<Option<i64>> {
        self.check_available()?;
        let tables = self.tables.read();
        Ok(tables
            .get(&kind)
            .and_then(|t| t.by_source.get(source_id))
            .copied())
    }
}
