//! # LeapSync Relay
//!
//! Central relay for LeapSync replicas.
//!
//! This crate provides:
//! - The authoritative store: a normalized cache persisted after every
//!   applied change
//! - Message handling: hydrate replies, change rebroadcast, the
//!   reset/reseed cycle
//! - A WebSocket server that exposes the relay over JSON text frames
//!
//! ## Key Invariants
//!
//! - Every inbound message is processed under one lock, so the merge is
//!   all-or-nothing and broadcast order equals apply order
//! - A change is never delivered back to the connection that sent it; the
//!   sender gets an `ack` instead
//! - A rejected change is never applied or rebroadcast
//!
//! ## Example
//!
//! ```rust,no_run
//! use leapsync_relay::{RelayConfig, RelayServer};
//!
//! # async fn run() -> leapsync_relay::RelayResult<()> {
//! let config = RelayConfig::from_env()?;
//! RelayServer::open(config)?.run().await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::{RelayConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SNAPSHOT};
pub use error::{RelayError, RelayResult};
pub use handler::{Connection, ConnectionId, Handled, Relay, RelayStats};
pub use server::RelayServer;
pub use store::AuthoritativeStore;
