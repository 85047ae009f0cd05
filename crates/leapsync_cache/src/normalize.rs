//! Splitting fragment-shaped write data into per-entity field writes.
//!
//! A write is staged completely before anything is stored, so a value that
//! does not fit the fragment rejects the whole write.

use crate::error::{CacheError, CacheResult};
use leapsync_protocol::{Cardinality, EntityKey, Fragment, Record, Reference, Snapshot, TYPENAME_FIELD};
use serde_json::Value;

/// Field holding an entity's id inside write data.
pub const ID_FIELD: &str = "id";

/// One field value bound for one normalized record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StagedField {
    pub key: EntityKey,
    pub field: String,
    pub value: Value,
}

/// Stages `data`, shaped by `fragment`, as a write to `key`.
///
/// Nested entity objects become their own staged records, and the parent
/// field stores `{"__ref": key}` in their place. Nested field writes are
/// staged before the parent field that points at them.
pub(crate) fn stage(
    fragment: &Fragment,
    key: &EntityKey,
    data: &Value,
) -> CacheResult<Vec<StagedField>> {
    if key.type_name() != fragment.type_name() {
        return Err(CacheError::TypeMismatch {
            key: key.clone(),
            fragment: fragment.name().to_string(),
            expected: fragment.type_name().to_string(),
        });
    }
    let object = data
        .as_object()
        .ok_or_else(|| CacheError::NotAnObject { key: key.clone() })?;

    let mut staged = Vec::new();
    stage_entity(fragment, key, object, &mut staged)?;
    Ok(staged)
}

fn stage_entity(
    fragment: &Fragment,
    key: &EntityKey,
    object: &Record,
    staged: &mut Vec<StagedField>,
) -> CacheResult<()> {
    push(staged, key, TYPENAME_FIELD, Value::String(key.type_name().to_string()));

    for field in fragment.scalar_fields() {
        if let Some(value) = object.get(field) {
            push(staged, key, field, value.clone());
        }
    }

    for reference in fragment.references() {
        let Some(value) = object.get(&reference.field) else {
            continue;
        };
        let stored = match (reference.cardinality, value) {
            (_, Value::Null) => Value::Null,
            (Cardinality::Many, Value::Array(items)) => {
                let mut refs = Vec::with_capacity(items.len());
                for item in items {
                    refs.push(stage_reference(reference, key, item, staged)?);
                }
                Value::Array(refs)
            }
            (Cardinality::One, item) if !item.is_array() => {
                stage_reference(reference, key, item, staged)?
            }
            (Cardinality::Many, _) => return Err(shape(key, reference, "a list of entities")),
            (Cardinality::One, _) => return Err(shape(key, reference, "a single entity")),
        };
        push(staged, key, &reference.field, stored);
    }

    Ok(())
}

/// Stages one referenced entity and returns the reference value to store.
fn stage_reference(
    reference: &Reference,
    parent: &EntityKey,
    item: &Value,
    staged: &mut Vec<StagedField>,
) -> CacheResult<Value> {
    if let Some(target) = Snapshot::reference_target(item) {
        let key = EntityKey::parse(target)?;
        return Ok(Snapshot::reference_to(&key));
    }

    let Value::Object(object) = item else {
        return Err(shape(parent, reference, "an entity object"));
    };

    let type_name = object
        .get(TYPENAME_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_else(|| reference.fragment.type_name());
    let id = match object.get(ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            return Err(CacheError::MissingIdentity {
                key: parent.clone(),
                field: reference.field.clone(),
            })
        }
    };

    let key = EntityKey::new(type_name, &id)?;
    stage_entity(&reference.fragment, &key, object, staged)?;
    Ok(Snapshot::reference_to(&key))
}

fn push(staged: &mut Vec<StagedField>, key: &EntityKey, field: &str, value: Value) {
    staged.push(StagedField {
        key: key.clone(),
        field: field.to_string(),
        value,
    });
}

fn shape(key: &EntityKey, reference: &Reference, expected: &'static str) -> CacheError {
    CacheError::ShapeMismatch {
        key: key.clone(),
        field: reference.field.clone(),
        expected,
    }
}
