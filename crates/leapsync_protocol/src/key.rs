//! Entity key scheme.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical address of an entity: `"<TypeName>:<id>"`.
///
/// Entity keys are:
/// - The only addressing mechanism in the cache and on the wire
/// - Split at the first `:`, so ids may themselves contain colons
/// - Stable: the same type and id always produce the same key
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey {
    raw: String,
    split: usize,
}

impl EntityKey {
    /// Builds the key for an entity of `type_name` with `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the type name is empty or contains `:`, or if the
    /// id is empty.
    pub fn new(type_name: &str, id: &str) -> ProtocolResult<Self> {
        let raw = format!("{type_name}:{id}");
        if type_name.is_empty() {
            return Err(invalid(raw, "empty type name"));
        }
        if type_name.contains(':') {
            return Err(invalid(raw, "type name contains ':'"));
        }
        if id.is_empty() {
            return Err(invalid(raw, "empty id"));
        }
        Ok(Self {
            raw,
            split: type_name.len(),
        })
    }

    /// Parses a key from its `Type:id` text form.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid key.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        match text.split_once(':') {
            Some((type_name, id)) => Self::new(type_name, id),
            None => Err(invalid(text.to_string(), "missing ':' separator")),
        }
    }

    /// Returns the type name part.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.raw[..self.split]
    }

    /// Returns the id part.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    /// Returns the full key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn invalid(key: String, reason: &'static str) -> ProtocolError {
    ProtocolError::InvalidKey { key, reason }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({})", self.raw)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for EntityKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.raw
    }
}

impl AsRef<str> for EntityKey {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
