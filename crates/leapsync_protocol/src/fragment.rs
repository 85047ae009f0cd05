//! Fragment descriptors.
//!
//! A fragment is a named projection over one entity type: an ordered list of
//! scalar fields plus an ordered list of references to nested entities, each
//! carrying its own fragment. Fragments are built once with the builder
//! methods and then shared (`Arc<Fragment>`) between reads, writes,
//! subscriptions and the wire.
//!
//! ```
//! use leapsync_protocol::Fragment;
//!
//! let user = Fragment::new("UserRef", "User").scalar("id");
//! let room = Fragment::new("Room", "Room")
//!     .scalar("id")
//!     .scalar("name")
//!     .many("participants", user);
//!
//! assert_eq!(room.type_name(), "Room");
//! assert_eq!(room.references().len(), 1);
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// How many entities a reference field points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// A single entity.
    One,
    /// An ordered list of entities.
    Many,
}

/// A reference field inside a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Field name on the parent entity.
    pub field: String,
    /// Shape read from or written to each referenced entity.
    pub fragment: Arc<Fragment>,
    /// Single entity or list.
    pub cardinality: Cardinality,
    /// Whether `null` is a complete value for this field.
    #[serde(default)]
    pub nullable: bool,
}

/// A precompiled projection over one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fragment {
    name: String,
    type_name: String,
    #[serde(default)]
    scalars: Vec<String>,
    #[serde(default)]
    references: Vec<Reference>,
}

impl Fragment {
    /// Creates an empty fragment named `name` over entities of `type_name`.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            scalars: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Adds a scalar field.
    #[must_use]
    pub fn scalar(mut self, field: impl Into<String>) -> Self {
        self.scalars.push(field.into());
        self
    }

    /// Adds several scalar fields in order.
    #[must_use]
    pub fn scalars<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scalars.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Adds a non-nullable reference to a single entity.
    #[must_use]
    pub fn one(self, field: impl Into<String>, fragment: impl Into<Arc<Fragment>>) -> Self {
        self.reference(field, fragment, Cardinality::One, false)
    }

    /// Adds a nullable reference to a single entity.
    #[must_use]
    pub fn optional(self, field: impl Into<String>, fragment: impl Into<Arc<Fragment>>) -> Self {
        self.reference(field, fragment, Cardinality::One, true)
    }

    /// Adds a reference to a list of entities.
    #[must_use]
    pub fn many(self, field: impl Into<String>, fragment: impl Into<Arc<Fragment>>) -> Self {
        self.reference(field, fragment, Cardinality::Many, false)
    }

    fn reference(
        mut self,
        field: impl Into<String>,
        fragment: impl Into<Arc<Fragment>>,
        cardinality: Cardinality,
        nullable: bool,
    ) -> Self {
        self.references.push(Reference {
            field: field.into(),
            fragment: fragment.into(),
            cardinality,
            nullable,
        });
        self
    }

    /// Returns the fragment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entity type this fragment applies to.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the scalar fields in declaration order.
    #[must_use]
    pub fn scalar_fields(&self) -> &[String] {
        &self.scalars
    }

    /// Returns the reference fields in declaration order.
    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Returns true if `field` is declared, as a scalar or a reference.
    #[must_use]
    pub fn declares(&self, field: &str) -> bool {
        self.scalars.iter().any(|s| s == field) || self.references.iter().any(|r| r.field == field)
    }

    /// Iterates every declared field name: scalars first, then references.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.scalars
            .iter()
            .map(String::as_str)
            .chain(self.references.iter().map(|r| r.field.as_str()))
    }

    /// Checks the descriptor is well formed, recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is empty, the type name contains `:`, a
    /// field is declared twice, or a field uses the reserved `__` prefix.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.name.is_empty() {
            return Err(self.invalid("empty fragment name"));
        }
        if self.type_name.is_empty() || self.type_name.contains(':') {
            return Err(self.invalid(format!("bad type condition {:?}", self.type_name)));
        }

        let mut seen = HashSet::new();
        for field in self.field_names() {
            if field.is_empty() || field.starts_with("__") {
                return Err(self.invalid(format!("bad field name {field:?}")));
            }
            if !seen.insert(field) {
                return Err(self.invalid(format!("field {field:?} declared twice")));
            }
        }

        self.references
            .iter()
            .try_for_each(|reference| reference.fragment.validate())
    }

    fn invalid(&self, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::InvalidFragment {
            fragment: self.name.clone(),
            reason: reason.into(),
        }
    }
}
