//! Error types for the sync client.

use leapsync_cache::CacheError;
use leapsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in a replica or its sync session.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether reconnecting may succeed.
        retryable: bool,
    },

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Written data did not fit its fragment.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The replica has no live connection to the relay.
    #[error("not connected to relay")]
    NotConnected,

    /// The session gave up reconnecting.
    #[error("gave up after {attempts} connection attempts")]
    RetriesExhausted {
        /// Consecutive failed attempts.
        attempts: u32,
    },

    /// The session task ended abnormally.
    #[error("sync session ended abnormally: {0}")]
    SessionFailed(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            _ => false,
        }
    }
}
