//! Error types for cache operations.

use leapsync_protocol::{EntityKey, ProtocolError};
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur while writing to the cache.
///
/// Reads never fail: missing data is reported as incompleteness, and an
/// unknown entity as an absent value.
#[derive(Error, Debug)]
pub enum CacheError {
    /// An id or reference could not form a valid entity key.
    #[error("invalid entity key: {0}")]
    InvalidKey(#[from] ProtocolError),

    /// The target key's type differs from the fragment's type condition.
    #[error("fragment {fragment} applies to {expected}, not {key}")]
    TypeMismatch {
        /// Target key.
        key: EntityKey,
        /// Fragment name.
        fragment: String,
        /// Type the fragment applies to.
        expected: String,
    },

    /// Write data for an entity was not a JSON object.
    #[error("data written to {key} is not an object")]
    NotAnObject {
        /// Target key.
        key: EntityKey,
    },

    /// A reference field held a value of the wrong shape.
    #[error("field {field} of {key}: expected {expected}")]
    ShapeMismatch {
        /// Entity holding the field.
        key: EntityKey,
        /// Field name.
        field: String,
        /// Description of the accepted shape.
        expected: &'static str,
    },

    /// A nested entity object carried no usable `id`.
    #[error("nested entity in field {field} of {key} has no id")]
    MissingIdentity {
        /// Entity holding the field.
        key: EntityKey,
        /// Field name.
        field: String,
    },
}
