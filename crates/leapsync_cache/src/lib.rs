//! # LeapSync Cache
//!
//! Normalized, fragment-addressed entity cache.
//!
//! This crate provides:
//! - [`NormalizedCache`]: partial entity records keyed by `Type:id`
//! - Fragment-scoped field-level merges with nested entity normalization
//! - Completeness-aware reads ([`FragmentState`])
//! - Reactive [`Subscription`]s driven by per-subscription dependency sets
//!
//! The same cache backs client replicas and the relay's authoritative
//! store, so both sides merge with identical semantics.
//!
//! ## Key Invariants
//!
//! - Writes merge; they never remove fields they do not mention
//! - A write that does not fit its fragment stores nothing
//! - Snapshot restore replaces; nothing from before survives
//! - A subscription is only complete when every declared field is present,
//!   transitively through references

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cache;
mod changes;
mod error;
mod normalize;
mod resolve;
mod subscription;

pub use cache::NormalizedCache;
pub use changes::{ChangeSet, WriteOutcome};
pub use error::{CacheError, CacheResult};
pub use normalize::ID_FIELD;
pub use resolve::{FragmentState, MissingField};
pub use subscription::Subscription;
