//! Error types for office operations.

use leapsync_client::SyncError;
use thiserror::Error;

/// Result type for office operations.
pub type OfficeResult<T> = Result<T, OfficeError>;

/// Errors that can occur in office operations.
#[derive(Error, Debug)]
pub enum OfficeError {
    /// A replica operation failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Cached data did not have the expected shape.
    #[error("unexpected data: {0}")]
    Decode(#[from] serde_json::Error),

    /// The session ended before the reseed cycle finished.
    #[error("session ended during reseed")]
    SessionEnded,
}
