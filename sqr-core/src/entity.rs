/// Watched entity kinds and their replication order
///
/// Every record replicated from the primary store belongs to exactly one of
/// these kinds. The dependency order matters: a child row cannot be written
/// before its parent's surrogate key exists in the secondary store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed set of record kinds subject to replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Account holder; parent of most other kinds
    User,
    /// A generated (possibly encrypted) QR code
    EncodedArtifact,
    /// One scan of an encoded artifact
    ScanEvent,
    /// A password reset request
    ResetRequest,
    /// Usage accounting for visitors without an account
    AnonymousUsage,
}

impl EntityKind {
    /// All kinds, in replication dependency order (parents first).
    pub const DEPENDENCY_ORDER: [EntityKind; 5] = [
        EntityKind::User,
        EntityKind::EncodedArtifact,
        EntityKind::ScanEvent,
        EntityKind::ResetRequest,
        EntityKind::AnonymousUsage,
    ];

    /// Secondary-store table name for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::EncodedArtifact => "encoded_artifacts",
            EntityKind::ScanEvent => "scan_events",
            EntityKind::ResetRequest => "reset_requests",
            EntityKind::AnonymousUsage => "anonymous_usage",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::User => "User",
            EntityKind::EncodedArtifact => "EncodedArtifact",
            EntityKind::ScanEvent => "ScanEvent",
            EntityKind::ResetRequest => "ResetRequest",
            EntityKind::AnonymousUsage => "AnonymousUsage",
        };
        write!(f, "{}", name)
    }
}
