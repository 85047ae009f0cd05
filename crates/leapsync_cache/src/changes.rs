//! Sets of (entity key, field) pairs touched by writes.

use leapsync_protocol::EntityKey;
use std::collections::{BTreeMap, BTreeSet};

/// Fields grouped by the entity they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    fields: BTreeMap<EntityKey, BTreeSet<String>>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one field of one entity.
    pub fn insert(&mut self, key: &EntityKey, field: &str) {
        self.fields
            .entry(key.clone())
            .or_default()
            .insert(field.to_string());
    }

    /// Returns true if the field of `key` is in the set.
    #[must_use]
    pub fn contains(&self, key: &EntityKey, field: &str) -> bool {
        self.fields.get(key).is_some_and(|f| f.contains(field))
    }

    /// Returns true if no field is in the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of (key, field) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.values().map(BTreeSet::len).sum()
    }

    /// Iterates the affected entity keys.
    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.fields.keys()
    }

    /// Returns the fields recorded for `key`.
    #[must_use]
    pub fn fields_of(&self, key: &EntityKey) -> Option<&BTreeSet<String>> {
        self.fields.get(key)
    }

    /// Iterates every (key, field) pair.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &str)> {
        self.fields
            .iter()
            .flat_map(|(key, fields)| fields.iter().map(move |f| (key, f.as_str())))
    }
}

/// What a single write did to the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Every field the write carried a value for, normalized entities
    /// included.
    pub touched: ChangeSet,
    /// The subset whose stored value actually changed.
    pub changed: ChangeSet,
}

impl WriteOutcome {
    /// Returns true if the write changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}
