//! # LeapSync Storage
//!
//! Snapshot persistence for the LeapSync relay.
//!
//! The relay keeps its authoritative store in memory and writes the whole
//! store out as one JSON document after every applied change. This crate
//! provides the abstraction it writes through.
//!
//! ## Available Stores
//!
//! - [`InMemorySnapshotStore`] - For testing and ephemeral relays
//! - [`FileSnapshotStore`] - One JSON file, replaced atomically on save
//!
//! ## Example
//!
//! ```rust
//! use leapsync_storage::{InMemorySnapshotStore, SnapshotStore};
//! use leapsync_protocol::Snapshot;
//!
//! let store = InMemorySnapshotStore::new();
//! store.save(&Snapshot::new()).unwrap();
//! assert!(store.load().unwrap().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::SnapshotStore;
pub use error::{StorageError, StorageResult};
pub use file::FileSnapshotStore;
pub use memory::InMemorySnapshotStore;
