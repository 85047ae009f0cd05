//! The normalized cache.

use crate::changes::{ChangeSet, WriteOutcome};
use crate::error::CacheResult;
use crate::normalize::{stage, StagedField};
use crate::resolve::{resolve, FragmentState};
use crate::subscription::{Subscription, SubscriptionRegistry};
use leapsync_protocol::{EntityKey, Fragment, Record, Snapshot};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory store of partial entity records keyed by [`EntityKey`].
///
/// The cache is the union of every field ever written for each key. It
/// supports:
/// - Fragment-scoped reads, partial ([`read`](Self::read)) or
///   completeness-aware ([`resolve`](Self::resolve))
/// - Fragment-scoped field-level merges ([`write`](Self::write))
/// - Reactive subscriptions ([`subscribe`](Self::subscribe))
/// - Whole-store replacement ([`restore_snapshot`](Self::restore_snapshot))
///
/// # Example
///
/// ```
/// use leapsync_cache::NormalizedCache;
/// use leapsync_protocol::Fragment;
/// use serde_json::json;
///
/// let org = Fragment::new("Org", "Organization").scalars(["id", "name"]);
/// let mut cache = NormalizedCache::new();
///
/// cache.write(&org, "ROOT", &json!({"id": "ROOT", "name": "Leap Office"})).unwrap();
/// let value = cache.read(&org, "ROOT").unwrap();
/// assert_eq!(value["name"], "Leap Office");
/// ```
#[derive(Default)]
pub struct NormalizedCache {
    records: HashMap<EntityKey, Record>,
    subscriptions: SubscriptionRegistry,
}

impl NormalizedCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache holding the contents of `snapshot`.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            records: snapshot.into_iter().collect(),
            subscriptions: SubscriptionRegistry::default(),
        }
    }

    /// Builds the key of entity `id` under `fragment`'s type.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is empty.
    pub fn key_for(fragment: &Fragment, id: &str) -> CacheResult<EntityKey> {
        Ok(EntityKey::new(fragment.type_name(), id)?)
    }

    /// Reads whatever subset of `fragment` is currently known for `id`.
    ///
    /// Returns `None` if the entity was never written (or `id` cannot form a
    /// key). Missing fields are simply absent from the returned object.
    #[must_use]
    pub fn read(&self, fragment: &Fragment, id: &str) -> Option<Value> {
        let key = Self::key_for(fragment, id).ok()?;
        self.read_key(fragment, &key)
    }

    /// Like [`read`](Self::read), addressed by key.
    #[must_use]
    pub fn read_key(&self, fragment: &Fragment, key: &EntityKey) -> Option<Value> {
        let resolution = resolve(&self.records, fragment, key);
        resolution.exists.then_some(resolution.value)
    }

    /// One-shot, completeness-aware read.
    #[must_use]
    pub fn resolve(&self, fragment: &Fragment, id: &str) -> FragmentState {
        match Self::key_for(fragment, id) {
            Ok(key) => self.resolve_key(fragment, &key),
            Err(_) => FragmentState::Incomplete {
                missing: Vec::new(),
            },
        }
    }

    /// Like [`resolve`](Self::resolve), addressed by key.
    #[must_use]
    pub fn resolve_key(&self, fragment: &Fragment, key: &EntityKey) -> FragmentState {
        resolve(&self.records, fragment, key).state()
    }

    /// Merges `data` into entity `id`, scoped by `fragment`.
    ///
    /// Each declared field present in `data` overwrites the stored value;
    /// every other stored field is left untouched. Nested entity objects are
    /// normalized into their own records. Subscriptions depending on a
    /// changed field are re-resolved before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error, and stores nothing, if `data` does not fit the
    /// fragment.
    pub fn write(&mut self, fragment: &Fragment, id: &str, data: &Value) -> CacheResult<WriteOutcome> {
        let key = Self::key_for(fragment, id)?;
        self.write_key(fragment, &key, data)
    }

    /// Like [`write`](Self::write), addressed by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key's type differs from the fragment's or the
    /// data does not fit the fragment.
    pub fn write_key(
        &mut self,
        fragment: &Fragment,
        key: &EntityKey,
        data: &Value,
    ) -> CacheResult<WriteOutcome> {
        self.write_key_except(fragment, key, data, |_, _| false)
    }

    /// Like [`write_key`](Self::write_key), but leaves every (key, field)
    /// for which `skip` returns true unchanged.
    ///
    /// Skipped fields still appear in [`WriteOutcome::touched`].
    ///
    /// # Errors
    ///
    /// Same as [`write_key`](Self::write_key).
    pub fn write_key_except<S>(
        &mut self,
        fragment: &Fragment,
        key: &EntityKey,
        data: &Value,
        skip: S,
    ) -> CacheResult<WriteOutcome>
    where
        S: Fn(&EntityKey, &str) -> bool,
    {
        let staged = stage(fragment, key, data)?;
        let outcome = self.commit(staged, skip);

        let records = &self.records;
        let notified = self
            .subscriptions
            .notify(&outcome.changed, |f, k| resolve(records, f, k));

        tracing::trace!(
            key = %key,
            fragment = fragment.name(),
            changed = outcome.changed.len(),
            notified,
            "cache write"
        );
        Ok(outcome)
    }

    fn commit<S>(&mut self, staged: Vec<StagedField>, skip: S) -> WriteOutcome
    where
        S: Fn(&EntityKey, &str) -> bool,
    {
        let mut touched = ChangeSet::new();
        let mut changed = ChangeSet::new();

        for StagedField { key, field, value } in staged {
            touched.insert(&key, &field);
            if skip(&key, &field) {
                continue;
            }
            let record = self.records.entry(key.clone()).or_default();
            if record.get(&field) != Some(&value) {
                record.insert(field.clone(), value);
                changed.insert(&key, &field);
            }
        }

        WriteOutcome { touched, changed }
    }

    /// Subscribes to `fragment` rooted at entity `id`.
    ///
    /// Identical (fragment, key) subscriptions share one registry entry.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` cannot form a key.
    pub fn subscribe(
        &mut self,
        fragment: impl Into<Arc<Fragment>>,
        id: &str,
    ) -> CacheResult<Subscription> {
        let fragment = fragment.into();
        let key = Self::key_for(&fragment, id)?;
        Ok(self.subscribe_key(fragment, key))
    }

    /// Like [`subscribe`](Self::subscribe), addressed by key.
    pub fn subscribe_key(&mut self, fragment: impl Into<Arc<Fragment>>, key: EntityKey) -> Subscription {
        let records = &self.records;
        self.subscriptions
            .subscribe(fragment.into(), key, |f, k| resolve(records, f, k))
    }

    /// Discards every record and replaces the contents with `snapshot`.
    ///
    /// Unlike [`write`](Self::write), fields absent from the snapshot do not
    /// survive. Every subscription is re-resolved.
    pub fn restore_snapshot(&mut self, snapshot: Snapshot) {
        self.records = snapshot.into_iter().collect();
        let records = &self.records;
        let notified = self
            .subscriptions
            .notify_all(|f, k| resolve(records, f, k));
        tracing::debug!(entities = self.records.len(), notified, "cache restored");
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.restore_snapshot(Snapshot::new());
    }

    /// Copies the contents into a serializable snapshot.
    #[must_use]
    pub fn extract(&self) -> Snapshot {
        self.records
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    /// Returns the raw record stored under `key`.
    #[must_use]
    pub fn record(&self, key: &EntityKey) -> Option<&Record> {
        self.records.get(key)
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no entity is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&mut self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn room_fragment() -> Fragment {
        Fragment::new("RoomState", "Room").scalars(["id", "name", "locked"])
    }

    fn room_key() -> EntityKey {
        EntityKey::new("Room", "1").unwrap()
    }

    fn record_json(cache: &NormalizedCache, key: &EntityKey) -> Value {
        Value::Object(cache.record(key).cloned().unwrap())
    }

    #[test]
    fn merge_is_field_level() {
        let mut cache = NormalizedCache::new();
        let frag = room_fragment();
        cache
            .write(&frag, "1", &json!({"name": "A", "locked": true}))
            .unwrap();
        cache.write(&frag, "1", &json!({"name": "X"})).unwrap();

        assert_eq!(
            cache.read(&frag, "1").unwrap(),
            json!({"name": "X", "locked": true})
        );
    }

    #[test]
    fn hydrate_replaces_write_merges() {
        let frag = Fragment::new("Entity", "Room").scalars(["id", "a", "b"]);
        let start = || {
            let mut cache = NormalizedCache::new();
            cache.write(&frag, "1", &json!({"id": 1, "a": 1, "b": 2})).unwrap();
            cache
        };

        let mut restored = start();
        let snapshot: Snapshot =
            serde_json::from_value(json!({"Room:1": {"__typename": "Room", "id": 1, "a": 9}})).unwrap();
        restored.restore_snapshot(snapshot);
        assert_eq!(
            record_json(&restored, &room_key()),
            json!({"__typename": "Room", "id": 1, "a": 9})
        );

        let mut merged = start();
        merged.write(&frag, "1", &json!({"a": 9})).unwrap();
        assert_eq!(
            record_json(&merged, &room_key()),
            json!({"__typename": "Room", "id": 1, "a": 9, "b": 2})
        );
    }

    #[test]
    fn rewrite_is_noop() {
        let mut cache = NormalizedCache::new();
        let frag = room_fragment();
        let data = json!({"id": "1", "name": "Lobby"});

        let first = cache.write(&frag, "1", &data).unwrap();
        assert!(!first.is_noop());
        let before = cache.extract();

        let second = cache.write(&frag, "1", &data).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.touched, first.touched);
        assert_eq!(cache.extract(), before);
    }

    #[test]
    fn read_unknown_entity_is_none() {
        let cache = NormalizedCache::new();
        assert!(cache.read(&room_fragment(), "missing").is_none());
        assert!(cache.read(&room_fragment(), "").is_none());
    }

    #[test]
    fn read_returns_partial_data() {
        let mut cache = NormalizedCache::new();
        let frag = room_fragment();
        cache.write(&frag, "1", &json!({"name": "Lobby"})).unwrap();

        assert_eq!(cache.read(&frag, "1").unwrap(), json!({"name": "Lobby"}));
        assert!(!cache.resolve(&frag, "1").is_complete());
    }

    #[test]
    fn failed_write_stores_nothing() {
        let user = Fragment::new("UserRef", "User").scalar("id");
        let frag = Fragment::new("Room", "Room").scalar("name").many("participants", user);
        let mut cache = NormalizedCache::new();

        let result = cache.write(
            &frag,
            "1",
            &json!({"name": "Lobby", "participants": [{"id": "u1"}, {"nick": "no-id"}]}),
        );
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn skipped_fields_are_left_alone() {
        let mut cache = NormalizedCache::new();
        let frag = room_fragment();
        cache.write(&frag, "1", &json!({"name": "Mine"})).unwrap();

        let outcome = cache
            .write_key_except(&frag, &room_key(), &json!({"name": "Theirs", "locked": true}), |_, field| {
                field == "name"
            })
            .unwrap();

        assert!(outcome.touched.contains(&room_key(), "name"));
        assert!(!outcome.changed.contains(&room_key(), "name"));
        assert_eq!(
            cache.read(&frag, "1").unwrap(),
            json!({"name": "Mine", "locked": true})
        );
    }

    #[test]
    fn extract_roundtrips_through_restore() {
        let mut cache = NormalizedCache::new();
        let user = Fragment::new("UserRef", "User").scalars(["id", "name"]);
        let frag = Fragment::new("Room", "Room").scalar("id").many("participants", user);
        cache
            .write(&frag, "1", &json!({"id": "1", "participants": [{"id": "u1", "name": "Ada"}]}))
            .unwrap();

        let copy = NormalizedCache::from_snapshot(cache.extract());
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.resolve(&frag, "1"), cache.resolve(&frag, "1"));
    }
}
