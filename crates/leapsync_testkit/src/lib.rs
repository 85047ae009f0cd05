//! # LeapSync Testkit
//!
//! Test utilities for LeapSync.
//!
//! This crate provides:
//! - [`TestRelay`]: a relay on an in-memory or temp-dir snapshot, with
//!   helpers to attach replicas or serve it over WebSocket
//! - [`MemoryTransport`]: an in-process transport wired straight to a
//!   relay, with switches to simulate outages
//! - Async wait helpers with timeouts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use leapsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn two_replicas() {
//!     let relay = TestRelay::memory();
//!     let (a, _session_a) = relay.replica();
//!     let (b, _session_b) = relay.replica();
//!     wait_live(&a).await;
//!     wait_live(&b).await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod transport;
pub mod wait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::transport::*;
    pub use crate::wait::*;
}

pub use fixtures::*;
pub use transport::*;
pub use wait::*;
