//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building or decoding protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An entity key did not have the `Type:id` form.
    #[error("invalid entity key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected key text.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A fragment descriptor is not well formed.
    #[error("invalid fragment {fragment}: {reason}")]
    InvalidFragment {
        /// Fragment name.
        fragment: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A message decoded but violates the message contract.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates a malformed-message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}
