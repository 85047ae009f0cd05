//! Normalized records and whole-store snapshots.

use crate::key::EntityKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field holding the entity type on every stored record.
pub const TYPENAME_FIELD: &str = "__typename";

/// Field marking a stored reference: `{"__ref": "Type:id"}`.
pub const REF_FIELD: &str = "__ref";

/// One normalized entity: field name to JSON value.
///
/// Reference fields hold `{"__ref": key}` objects (or arrays of them) instead
/// of inlined entities.
pub type Record = Map<String, Value>;

/// The full serializable contents of a store.
///
/// Serialized as a single JSON object mapping entity keys to records, which
/// is also the persisted snapshot file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: BTreeMap<EntityKey, Record>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record stored under `key`.
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&Record> {
        self.records.get(key)
    }

    /// Inserts or replaces a record.
    pub fn insert(&mut self, key: EntityKey, record: Record) -> Option<Record> {
        self.records.insert(key, record)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the snapshot holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates entities in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &Record)> {
        self.records.iter()
    }

    /// Counts entities per type name.
    #[must_use]
    pub fn type_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for key in self.records.keys() {
            *counts.entry(key.type_name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Builds a reference value pointing at `key`.
    #[must_use]
    pub fn reference_to(key: &EntityKey) -> Value {
        let mut map = Map::new();
        map.insert(REF_FIELD.to_string(), Value::String(key.to_string()));
        Value::Object(map)
    }

    /// Returns the key text of a reference value, if it is one.
    #[must_use]
    pub fn reference_target(value: &Value) -> Option<&str> {
        match value {
            Value::Object(map) if map.len() == 1 => map.get(REF_FIELD).and_then(Value::as_str),
            _ => None,
        }
    }
}

impl FromIterator<(EntityKey, Record)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (EntityKey, Record)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Snapshot {
    type Item = (EntityKey, Record);
    type IntoIter = std::collections::btree_map::IntoIter<EntityKey, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_as_flat_object() {
        let mut snapshot = Snapshot::new();
        let key = EntityKey::new("Organization", "ROOT").unwrap();
        let record = json!({"__typename": "Organization", "id": "ROOT", "name": "Leap Office"});
        snapshot.insert(key.clone(), record.as_object().unwrap().clone());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["Organization:ROOT"]["name"], "Leap Office");

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.get(&key).unwrap()["id"], "ROOT");
    }

    #[test]
    fn empty_document_is_empty_snapshot() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn references() {
        let key = EntityKey::new("User", "u1").unwrap();
        let value = Snapshot::reference_to(&key);
        assert_eq!(value, json!({"__ref": "User:u1"}));
        assert_eq!(Snapshot::reference_target(&value), Some("User:u1"));
        assert_eq!(Snapshot::reference_target(&json!({"id": "u1"})), None);
    }

    #[test]
    fn type_counts_group_by_type() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "Room:a": {"__typename": "Room"},
            "Room:b": {"__typename": "Room"},
            "User:u1": {"__typename": "User"},
        }))
        .unwrap();

        let counts = snapshot.type_counts();
        assert_eq!(counts["Room"], 2);
        assert_eq!(counts["User"], 1);
    }
}
