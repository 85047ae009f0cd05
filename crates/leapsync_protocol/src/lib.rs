//! # LeapSync Protocol
//!
//! Shared vocabulary for the LeapSync replicated entity cache.
//!
//! This crate provides:
//! - [`EntityKey`], the canonical `"Type:id"` address of an entity
//! - [`Fragment`], a precompiled projection over one entity type
//! - [`Snapshot`], the serializable contents of a whole store
//! - Wire messages exchanged between replicas and the relay
//!   ([`ClientMessage`], [`RelayMessage`], [`ChangeMessage`])
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod fragment;
mod key;
mod messages;
mod snapshot;

pub use error::{ProtocolError, ProtocolResult};
pub use fragment::{Cardinality, Fragment, Reference};
pub use key::EntityKey;
pub use messages::{ChangeMessage, ClientMessage, RelayMessage};
pub use snapshot::{Record, Snapshot, REF_FIELD, TYPENAME_FIELD};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
