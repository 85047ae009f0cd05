//! # LeapSync Client
//!
//! Client side of LeapSync: a replica of the shared entity graph kept in
//! sync with the relay.
//!
//! This crate provides:
//! - [`Replica`]: fragment-scoped reads, writes and subscriptions over a
//!   normalized cache, with write-through to the relay while live
//! - [`SyncSession`]: the connection state machine (connect, hydrate, live,
//!   reconnect with backoff, reload)
//! - [`Transport`]: the network seam, with a WebSocket implementation
//!
//! ## Key Invariants
//!
//! - Local writes are applied locally before they are sent
//! - Writes are forwarded only while live and are never queued for later
//! - Every (re)connection starts with a full hydrate that replaces local
//!   state; remote changes are merged field by field
//! - A remote change never overwrites a field with an unacknowledged local
//!   write, so replicas converge on the relay's last-applied value
//!
//! ## Example
//!
//! ```rust,no_run
//! use leapsync_client::{ClientConfig, Replica};
//! use leapsync_protocol::Fragment;
//! use serde_json::json;
//!
//! # async fn run() -> leapsync_client::SyncResult<()> {
//! let replica = Replica::new();
//! let session = replica.connect(&ClientConfig::new("ws://127.0.0.1:4001"));
//!
//! let org = Fragment::new("Org", "Organization").scalars(["id", "name"]);
//! let mut sub = replica.subscribe(org.clone(), "ROOT")?;
//! replica.write(&org, "ROOT", &json!({"name": "Leap Office"}))?;
//! sub.changed().await;
//!
//! session.shutdown().await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod replica;
mod session;
mod state;
mod transport;

pub use config::{ClientConfig, RetryConfig};
pub use error::{SyncError, SyncResult};
pub use leapsync_cache::{FragmentState, MissingField, Subscription, WriteOutcome};
pub use replica::Replica;
pub use session::{SessionHandle, SyncSession};
pub use state::{ConnectionState, ControlEvent};
pub use transport::{Channel, Transport, WebSocketTransport};
