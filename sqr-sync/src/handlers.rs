/// Per-entity replication handlers
///
/// One handler per watched entity kind translates a primary-store document
/// into typed row operations against the secondary store. Foreign
/// references are resolved to surrogate keys through the identity map (with
/// a store-lookup fallback); a missing parent fails the operation with
/// `ParentNotSynced`, which the next reconciliation pass heals once the
/// parent row exists. Structured payload fields are packed to JSON text and
/// round-trip losslessly.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use sqr_core::{pack_json, Document, EntityKind, Error, Result, Row, RowValue, SecondaryStore};

use crate::idmap::IdentityMap;
use crate::queue::{ReplicationTask, TaskOp};

/// Shared plumbing for every handler: the secondary store and the identity
/// map in front of it.
#[derive(Clone)]
pub struct HandlerContext {
    store: Arc<dyn SecondaryStore>,
    idmap: IdentityMap,
}

impl HandlerContext {
    pub fn new(store: Arc<dyn SecondaryStore>, idmap: IdentityMap) -> Self {
        Self { store, idmap }
    }

    /// Resolve a parent reference to its surrogate key. Cache first, store
    /// second; a miss in both means the parent has not been replicated yet.
    pub async fn resolve_parent(&self, parent: EntityKind, source_id: &str) -> Result<i64> {
        if let Some(surrogate) = self.idmap.get(parent, source_id) {
            return Ok(surrogate);
        }
        match self.store.surrogate_for(parent, source_id).await? {
            Some(surrogate) => {
                self.idmap.insert(parent, source_id, surrogate);
                Ok(surrogate)
            }
            None => Err(Error::ParentNotSynced(format!(
                "{} with source id {} not found",
                parent, source_id
            ))),
        }
    }

    async fn exists(&self, kind: EntityKind, source_id: &str) -> Result<bool> {
        if self.idmap.get(kind, source_id).is_some() {
            return Ok(true);
        }
        Ok(self.store.surrogate_for(kind, source_id).await?.is_some())
    }

    async fn insert_row(&self, kind: EntityKind, source_id: &str, row: Row) -> Result<()> {
        let surrogate = self.store.insert(kind, source_id, row).await?;
        self.idmap.insert(kind, source_id, surrogate);
        Ok(())
    }

    async fn update_row(&self, kind: EntityKind, source_id: &str, row: Row) -> Result<()> {
        self.store.update(kind, source_id, row).await
    }

    async fn delete_row(&self, kind: EntityKind, source_id: &str) -> Result<()> {
        self.store.delete(kind, source_id).await?;
        self.idmap.remove(kind, source_id);
        Ok(())
    }
}

/// Translation contract for one entity kind. Implementations provide the
/// document-to-row mapping; the write paths are shared.
#[async_trait]
pub trait EntityHandler: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn context(&self) -> &HandlerContext;

    /// Build the typed column set for a document, resolving any parent
    /// references along the way.
    async fn build_row(&self, document: &Document) -> Result<Row>;

    async fn insert(&self, document: &Document) -> Result<()> {
        let row = self.build_row(document).await?;
        self.context()
            .insert_row(self.kind(), &document.id, row)
            .await
    }

    async fn update(&self, document: &Document) -> Result<()> {
        let row = self.build_row(document).await?;
        self.context()
            .update_row(self.kind(), &document.id, row)
            .await
    }

    async fn upsert(&self, document: &Document) -> Result<()> {
        if self.context().exists(self.kind(), &document.id).await? {
            self.update(document).await
        } else {
            self.insert(document).await
        }
    }

    /// Idempotent: deleting an already-absent row succeeds.
    async fn delete(&self, source_id: &str) -> Result<()> {
        self.context().delete_row(self.kind(), source_id).await
    }
}

/// Pack an optional structured field into a JSON text column (`Null` when
/// the field is absent or null).
fn json_column(row: &mut Row, document: &Document, field: &str) -> Result<()> {
    match document.get(field) {
        Some(value) if !value.is_null() => row.set(field, RowValue::Json(pack_json(value)?)),
        _ => row.set(field, RowValue::Null),
    }
    Ok(())
}

struct UserHandler {
    ctx: HandlerContext,
}

#[async_trait]
impl EntityHandler for UserHandler {
    fn kind(&self) -> EntityKind {
        EntityKind::User
    }

    fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    async fn build_row(&self, document: &Document) -> Result<Row> {
        Ok(Row::new()
            .text("email", document.str_field("email")?)
            .text("name", document.str_field("name")?)
            .text("plan", document.opt_str("plan").unwrap_or("free"))
            .boolean("is_admin", document.bool_or("is_admin", false)))
    }
}

struct EncodedArtifactHandler {
    ctx: HandlerContext,
}

#[async_trait]
impl EntityHandler for EncodedArtifactHandler {
    fn kind(&self) -> EntityKind {
        EntityKind::EncodedArtifact
    }

    fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    async fn build_row(&self, document: &Document) -> Result<Row> {
        let owner = self
            .ctx
            .resolve_parent(EntityKind::User, document.str_field("user_id")?)
            .await?;

        let mut row = Row::new()
            .integer("user_id", owner)
            .text("title", document.str_field("title")?)
            .text("content", document.str_field("content")?)
            .boolean("is_active", document.bool_or("is_active", true))
            .integer("scan_count", document.i64_or("scan_count", 0));
        json_column(&mut row, document, "data")?;
        Ok(row)
    }
}

struct ScanEventHandler {
    ctx: HandlerContext,
}

#[async_trait]
impl EntityHandler for ScanEventHandler {
    fn kind(&self) -> EntityKind {
        EntityKind::ScanEvent
    }

    fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    async fn build_row(&self, document: &Document) -> Result<Row> {
        let artifact = self
            .ctx
            .resolve_parent(EntityKind::EncodedArtifact, document.str_field("artifact_id")?)
            .await?;

        // Scans by anonymous visitors carry no user reference.
        let scanner = match document.opt_str("user_id") {
            Some(user_id) => RowValue::Integer(
                self.ctx.resolve_parent(EntityKind::User, user_id).await?,
            ),
            None => RowValue::Null,
        };

        let mut row = Row::new()
            .integer("artifact_id", artifact)
            .integer("scanned_at", document.i64_field("scanned_at")?);
        row.set("user_id", scanner);
        json_column(&mut row, document, "location")?;
        json_column(&mut row, document, "device")?;
        Ok(row)
    }
}

struct ResetRequestHandler {
    ctx: HandlerContext,
}

#[async_trait]
impl EntityHandler for ResetRequestHandler {
    fn kind(&self) -> EntityKind {
        EntityKind::ResetRequest
    }

    fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    async fn build_row(&self, document: &Document) -> Result<Row> {
        let owner = self
            .ctx
            .resolve_parent(EntityKind::User, document.str_field("user_id")?)
            .await?;

        Ok(Row::new()
            .integer("user_id", owner)
            .text("token", document.str_field("token")?)
            .integer("expires_at", document.i64_field("expires_at")?)
            .boolean("used", document.bool_or("used", false)))
    }
}

struct AnonymousUsageHandler {
    ctx: HandlerContext,
}

#[async_trait]
impl EntityHandler for AnonymousUsageHandler {
    fn kind(&self) -> EntityKind {
        EntityKind::AnonymousUsage
    }

    fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    async fn build_row(&self, document: &Document) -> Result<Row> {
        Ok(Row::new()
            .text("fingerprint", document.str_field("fingerprint")?)
            .text("action", document.str_field("action")?)
            .integer("count", document.i64_or("count", 1)))
    }
}

/// Registry of all entity handlers, keyed by kind. This is what the work
/// queue dispatches tasks through.
pub struct Handlers {
    handlers: HashMap<EntityKind, Box<dyn EntityHandler>>,
}

impl Handlers {
    pub fn new(store: Arc<dyn SecondaryStore>, idmap: IdentityMap) -> Self {
        let ctx = HandlerContext::new(store, idmap);
        let mut handlers: HashMap<EntityKind, Box<dyn EntityHandler>> = HashMap::new();
        handlers.insert(
            EntityKind::User,
            Box::new(UserHandler { ctx: ctx.clone() }),
        );
        handlers.insert(
            EntityKind::EncodedArtifact,
            Box::new(EncodedArtifactHandler { ctx: ctx.clone() }),
        );
        handlers.insert(
            EntityKind::ScanEvent,
            Box::new(ScanEventHandler { ctx: ctx.clone() }),
        );
        handlers.insert(
            EntityKind::ResetRequest,
            Box::new(ResetRequestHandler { ctx: ctx.clone() }),
        );
        handlers.insert(
            EntityKind::AnonymousUsage,
            Box::new(AnonymousUsageHandler { ctx }),
        );
        Self { handlers }
    }

    pub fn handler(&self, kind: EntityKind) -> Result<&dyn EntityHandler> {
        self.handlers
            .get(&kind)
            .map(Box::as_ref)
            .ok_or_else(|| Error::Internal(format!("no handler registered for {}", kind)))
    }

    /// Execute one replication task against the secondary store.
    pub async fn apply(&self, task: &ReplicationTask) -> Result<()> {
        let handler = self.handler(task.kind)?;
        match &task.op {
            TaskOp::Insert(document) => handler.insert(document).await,
            TaskOp::Update(document) => handler.update(document).await,
            TaskOp::Upsert(document) => handler.upsert(document).await,
            TaskOp::Delete(source_id) => handler.delete(source_id).await,
        }
    }
}
