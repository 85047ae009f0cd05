//! In-memory snapshot store for testing.

use crate::backend::SnapshotStore;
use crate::error::{StorageError, StorageResult};
use leapsync_protocol::Snapshot;
use parking_lot::RwLock;
use std::io;

/// An in-memory snapshot store.
///
/// Nothing survives the process. Useful for tests and for relays that
/// should start empty every time. Saves can be made to fail on demand.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    snapshot: Snapshot,
    saves: usize,
    failing: bool,
}

impl InMemorySnapshotStore {
    /// Creates a store holding an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(State {
                snapshot,
                ..State::default()
            }),
        }
    }

    /// Returns a copy of the stored snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().snapshot.clone()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.state.read().saves
    }

    /// Makes every subsequent save fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state.write().failing = failing;
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self) -> StorageResult<Snapshot> {
        Ok(self.snapshot())
    }

    fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.failing {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                "in-memory store set to fail",
            )));
        }
        state.snapshot = snapshot.clone();
        state.saves += 1;
        Ok(())
    }
}
