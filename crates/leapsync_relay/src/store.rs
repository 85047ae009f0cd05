//! The relay's authoritative store.

use crate::error::RelayResult;
use leapsync_cache::{NormalizedCache, WriteOutcome};
use leapsync_protocol::{ChangeMessage, Snapshot};
use leapsync_storage::SnapshotStore;

/// Authoritative copy of every entity, persisted after each change.
///
/// The store holds no subscriptions; it only merges, persists and hands out
/// snapshots. Merge semantics are exactly those of [`NormalizedCache`].
pub struct AuthoritativeStore {
    cache: NormalizedCache,
    backend: Box<dyn SnapshotStore>,
}

impl AuthoritativeStore {
    /// Opens a store, loading its contents from `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted snapshot cannot be loaded.
    pub fn open(backend: impl SnapshotStore + 'static) -> RelayResult<Self> {
        let snapshot = backend.load()?;
        tracing::info!(entities = snapshot.len(), "authoritative store loaded");
        Ok(Self {
            cache: NormalizedCache::from_snapshot(snapshot),
            backend: Box::new(backend),
        })
    }

    /// Validates and merges one change, then persists the store.
    ///
    /// A failed save is logged and the merged state is kept in memory; the
    /// next successful save catches the file up.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the store untouched, if the change is
    /// malformed or does not fit its fragment.
    pub fn apply(&mut self, change: &ChangeMessage) -> RelayResult<WriteOutcome> {
        change.validate()?;
        let outcome = self
            .cache
            .write_key(&change.fragment, &change.key, &change.data)?;
        if !outcome.is_noop() {
            self.persist();
        }
        Ok(outcome)
    }

    /// Discards every entity and persists the empty store.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.persist();
    }

    /// Returns the full current contents.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.cache.extract()
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if no entity is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn persist(&self) {
        if let Err(err) = self.backend.save(&self.cache.extract()) {
            tracing::error!(error = %err, "failed to persist snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use leapsync_protocol::{EntityKey, Fragment};
    use leapsync_storage::InMemorySnapshotStore;
    use serde_json::json;
    use std::sync::Arc;

    fn rename(name: &str) -> ChangeMessage {
        ChangeMessage::new(
            Fragment::new("OrgName", "Organization").scalar("name"),
            EntityKey::new("Organization", "ROOT").unwrap(),
            json!({ "name": name }),
        )
    }

    #[test]
    fn apply_persists_every_change() {
        let backend = Arc::new(InMemorySnapshotStore::new());
        let mut store = AuthoritativeStore::open(Arc::clone(&backend)).unwrap();

        store.apply(&rename("Leap Office")).unwrap();
        store.apply(&rename("Leap HQ")).unwrap();

        assert_eq!(backend.save_count(), 2);
        let org = EntityKey::new("Organization", "ROOT").unwrap();
        assert_eq!(backend.snapshot().get(&org).unwrap()["name"], "Leap HQ");
    }

    #[test]
    fn noop_change_is_not_persisted() {
        let backend = Arc::new(InMemorySnapshotStore::new());
        let mut store = AuthoritativeStore::open(Arc::clone(&backend)).unwrap();

        store.apply(&rename("Leap Office")).unwrap();
        let outcome = store.apply(&rename("Leap Office")).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(backend.save_count(), 1);
    }

    #[test]
    fn malformed_change_is_rejected() {
        let mut store = AuthoritativeStore::open(InMemorySnapshotStore::new()).unwrap();

        let mut wrong_type = rename("X");
        wrong_type.key = EntityKey::new("Room", "ROOT").unwrap();
        assert!(matches!(store.apply(&wrong_type), Err(RelayError::Protocol(_))));

        let mut not_object = rename("X");
        not_object.data = json!("X");
        assert!(matches!(store.apply(&not_object), Err(RelayError::Protocol(_))));

        let bad_shape = ChangeMessage::new(
            Fragment::new("Room", "Room").many("participants", Fragment::new("U", "User").scalar("id")),
            EntityKey::new("Room", "1").unwrap(),
            json!({"participants": {"id": "u1"}}),
        );
        assert!(matches!(store.apply(&bad_shape), Err(RelayError::Cache(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn reset_persists_empty_store() {
        let backend = Arc::new(InMemorySnapshotStore::new());
        let mut store = AuthoritativeStore::open(Arc::clone(&backend)).unwrap();
        store.apply(&rename("Leap Office")).unwrap();

        store.reset();
        assert!(store.is_empty());
        assert!(backend.snapshot().is_empty());
    }

    #[test]
    fn failed_save_keeps_memory_state() {
        let backend = Arc::new(InMemorySnapshotStore::new());
        let mut store = AuthoritativeStore::open(Arc::clone(&backend)).unwrap();
        backend.set_failing(true);

        store.apply(&rename("Leap Office")).unwrap();
        assert_eq!(store.len(), 1);
        assert!(backend.snapshot().is_empty());

        backend.set_failing(false);
        store.apply(&rename("Leap HQ")).unwrap();
        assert_eq!(backend.snapshot().len(), 1);
    }
}
