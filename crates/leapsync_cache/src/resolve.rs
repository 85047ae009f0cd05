//! Projecting records through a fragment and checking completeness.

use crate::changes::ChangeSet;
use leapsync_protocol::{Cardinality, EntityKey, Fragment, Record, Reference, Snapshot};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Reactive state of a fragment read.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentState {
    /// At least one declared field, transitively, is not in the cache yet.
    /// Collaborators render this as "loading", never as a partial value.
    Incomplete {
        /// Fields that were looked up and not found.
        missing: Vec<MissingField>,
    },
    /// Every declared field is present; the fully resolved projection.
    Complete(Value),
}

impl FragmentState {
    /// Returns true for [`FragmentState::Complete`].
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, FragmentState::Complete(_))
    }

    /// Returns the value if complete.
    #[must_use]
    pub fn complete(&self) -> Option<&Value> {
        match self {
            FragmentState::Complete(value) => Some(value),
            FragmentState::Incomplete { .. } => None,
        }
    }

    /// Consumes the state, returning the value if complete.
    #[must_use]
    pub fn into_complete(self) -> Option<Value> {
        match self {
            FragmentState::Complete(value) => Some(value),
            FragmentState::Incomplete { .. } => None,
        }
    }
}

/// A declared field that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    /// Entity that should hold the field.
    pub key: EntityKey,
    /// Field name.
    pub field: String,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.key, self.field)
    }
}

/// Fields a resolution looked at, grouped by entity.
#[derive(Debug, Clone, Default)]
pub(crate) struct DepSet {
    fields: HashMap<EntityKey, HashSet<String>>,
}

impl DepSet {
    fn insert(&mut self, key: &EntityKey, field: &str) {
        self.fields
            .entry(key.clone())
            .or_default()
            .insert(field.to_string());
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.fields.keys()
    }

    pub fn intersects(&self, changes: &ChangeSet) -> bool {
        changes.keys().any(|key| match (self.fields.get(key), changes.fields_of(key)) {
            (Some(deps), Some(changed)) => changed.iter().any(|f| deps.contains(f)),
            _ => false,
        })
    }
}

/// Result of walking a fragment from one root key.
pub(crate) struct Resolution {
    /// Whether the root record exists at all.
    pub exists: bool,
    /// Projection of everything that was found.
    pub value: Value,
    pub missing: Vec<MissingField>,
    pub deps: DepSet,
}

impl Resolution {
    pub fn state(&self) -> FragmentState {
        if self.missing.is_empty() {
            FragmentState::Complete(self.value.clone())
        } else {
            FragmentState::Incomplete {
                missing: self.missing.clone(),
            }
        }
    }
}

/// Walks `fragment` from `key` through `records`.
pub(crate) fn resolve(
    records: &HashMap<EntityKey, Record>,
    fragment: &Fragment,
    key: &EntityKey,
) -> Resolution {
    let mut walker = Walker {
        records,
        missing: Vec::new(),
        deps: DepSet::default(),
    };
    let value = Value::Object(walker.entity(fragment, key));
    Resolution {
        exists: records.contains_key(key),
        value,
        missing: walker.missing,
        deps: walker.deps,
    }
}

struct Walker<'a> {
    records: &'a HashMap<EntityKey, Record>,
    missing: Vec<MissingField>,
    deps: DepSet,
}

impl Walker<'_> {
    fn entity(&mut self, fragment: &Fragment, key: &EntityKey) -> Map<String, Value> {
        let record = self.records.get(key);
        let mut out = Map::new();

        for field in fragment.scalar_fields() {
            self.deps.insert(key, field);
            match record.and_then(|r| r.get(field)) {
                Some(value) => {
                    out.insert(field.clone(), value.clone());
                }
                None => self.missing(key, field),
            }
        }

        for reference in fragment.references() {
            let field = &reference.field;
            self.deps.insert(key, field);
            match record.and_then(|r| r.get(field)) {
                None => self.missing(key, field),
                Some(Value::Null) => {
                    if !reference.nullable {
                        self.missing(key, field);
                    }
                    out.insert(field.clone(), Value::Null);
                }
                Some(Value::Array(items)) if reference.cardinality == Cardinality::Many => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.follow(reference, key, item));
                    }
                    out.insert(field.clone(), Value::Array(resolved));
                }
                Some(item) if reference.cardinality == Cardinality::One && !item.is_array() => {
                    let resolved = self.follow(reference, key, item);
                    out.insert(field.clone(), resolved);
                }
                Some(_) => self.missing(key, field),
            }
        }

        out
    }

    fn follow(&mut self, reference: &Reference, parent: &EntityKey, item: &Value) -> Value {
        match Snapshot::reference_target(item).and_then(|t| EntityKey::parse(t).ok()) {
            Some(target) => Value::Object(self.entity(&reference.fragment, &target)),
            None => {
                self.missing(parent, &reference.field);
                Value::Null
            }
        }
    }

    fn missing(&mut self, key: &EntityKey, field: &str) {
        self.missing.push(MissingField {
            key: key.clone(),
            field: field.to_string(),
        });
    }
}
