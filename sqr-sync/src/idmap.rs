/// Identity-map cache
///
/// Caches (entity kind, primary id) → surrogate key so foreign-key
/// resolution does not pay a secondary-store round trip per reference.
/// Entries are added on successful inserts and lookups and invalidated on
/// delete; a miss always falls back to the store, so the cache is purely
/// an optimization.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use sqr_core::EntityKind;

#[derive(Clone, Default)]
pub struct IdentityMap {
    inner: Arc<RwLock<HashMap<(EntityKind, String), i64>>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: EntityKind, source_id: &str) -> Option<i64> {
        self.inner
            .read()
            .get(&(kind, source_id.to_string()))
            .copied()
    }

    pub fn insert(&self, kind: EntityKind, source_id: &str, surrogate: i64) {
        self.inner
            .write()
            .insert((kind, source_id.to_string()), surrogate);
    }

    pub fn remove(&self, kind: EntityKind, source_id: &str) {
        self.inner.write().remove(&(kind, source_id.to_string()));
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let map = IdentityMap::new();
        assert!(map.get(EntityKind::User, "u1").is_none());

        map.insert(EntityKind::User, "u1", 7);
        assert_eq!(map.get(EntityKind::User, "u1"), Some(7));

        // Same id under a different kind is a different entry.
        assert!(map.get(EntityKind::EncodedArtifact, "u1").is_none());

        map.remove(EntityKind::User, "u1");
        assert!(map.get(EntityKind::User, "u1").is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let map = IdentityMap::new();
        let other = map.clone();

        map.insert(EntityKind::User, "u1", 1);
        assert_eq!(other.get(EntityKind::User, "u1"), Some(1));
        assert_eq!(other.len(), 1);
    }
}
