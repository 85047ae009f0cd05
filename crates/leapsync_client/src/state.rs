//! Connection states and control events.

/// Where a replica's session is in its connection lifecycle.
///
/// `Disconnected → Connecting → AwaitingHydrate → Live`, back to
/// `Disconnected` when the connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection; local writes are applied locally only.
    #[default]
    Disconnected,
    /// Opening a connection to the relay.
    Connecting,
    /// Connected and waiting for the snapshot reply.
    AwaitingHydrate,
    /// Hydrated; local writes are forwarded and remote changes applied.
    Live,
}

impl ConnectionState {
    /// Returns true once hydrated.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Live)
    }

    /// Returns true while a connection attempt or hydrate is in progress.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::AwaitingHydrate
        )
    }
}

/// Relay instructions surfaced to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// The relay store was reset by this replica; populate baseline data
    /// and signal seed-done.
    Seed,
    /// Seeding finished somewhere; local state was discarded and the
    /// session is re-hydrating.
    Reload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_predicates() {
        assert!(ConnectionState::Live.is_live());
        assert!(!ConnectionState::AwaitingHydrate.is_live());
        assert!(ConnectionState::Connecting.is_pending());
        assert!(!ConnectionState::Disconnected.is_pending());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
