//! Snapshot store trait definition.

use crate::error::StorageResult;
use leapsync_protocol::Snapshot;

/// Durable home of the relay's authoritative snapshot.
///
/// # Invariants
///
/// - `load` returns the snapshot most recently passed to a successful `save`
/// - A failed `save` leaves the previously saved snapshot intact
/// - Stores must be `Send + Sync`; the relay calls them under its store lock
///
/// # Implementors
///
/// - [`super::InMemorySnapshotStore`] - For testing
/// - [`super::FileSnapshotStore`] - For persistent storage
pub trait SnapshotStore: Send + Sync {
    /// Loads the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or is corrupted.
    fn load(&self) -> StorageResult<Snapshot>;

    /// Replaces the stored snapshot.
    ///
    /// After this returns successfully the snapshot survives process
    /// termination (for durable stores).
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    fn save(&self, snapshot: &Snapshot) -> StorageResult<()>;
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for Box<S> {
    fn load(&self) -> StorageResult<Snapshot> {
        (**self).load()
    }

    fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        (**self).save(snapshot)
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<S> {
    fn load(&self) -> StorageResult<Snapshot> {
        (**self).load()
    }

    fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        (**self).save(snapshot)
    }
}
