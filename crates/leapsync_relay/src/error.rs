//! Error types for the relay.

use leapsync_cache::CacheError;
use leapsync_protocol::ProtocolError;
use leapsync_storage::StorageError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur in the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A message could not be decoded or validated.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A change did not fit its fragment.
    #[error("rejected change: {0}")]
    Cache(#[from] CacheError),

    /// The snapshot could not be loaded or saved.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The connection limit was reached.
    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),

    /// WebSocket handshake or framing failed.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking handler task panicked or was cancelled.
    #[error("handler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<tungstenite::Error> for RelayError {
    fn from(err: tungstenite::Error) -> Self {
        RelayError::WebSocket(Box::new(err))
    }
}

impl RelayError {
    /// Returns true if the error was caused by what a client sent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::Protocol(_) | RelayError::Cache(_) | RelayError::ConnectionLimit(_)
        )
    }

    /// Returns true if the error originates in the relay itself.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            RelayError::Config(_)
                | RelayError::Storage(_)
                | RelayError::Io(_)
                | RelayError::Task(_)
        )
    }
}
