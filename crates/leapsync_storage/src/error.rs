//! Error types for snapshot persistence.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while loading or saving a snapshot.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot file exists but does not hold a valid snapshot.
    #[error("snapshot corrupted: {0}")]
    Corrupted(String),

    /// The snapshot could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
