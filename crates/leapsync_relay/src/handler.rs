//! Message handling for connected replicas.

use crate::store::AuthoritativeStore;
use leapsync_protocol::{ChangeMessage, ClientMessage, RelayMessage};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifier the relay assigns to each connection.
pub type ConnectionId = u64;

/// A registered connection: its id and the queue of frames bound for it.
///
/// Dropping the receiver makes the relay forget the connection on its next
/// send attempt; call [`Relay::disconnect`] to forget it immediately.
#[derive(Debug)]
pub struct Connection {
    /// Connection id.
    pub id: ConnectionId,
    /// Messages to deliver to the replica, in order.
    pub receiver: mpsc::Receiver<RelayMessage>,
}

/// What the relay did with one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Replied with the full snapshot.
    Hydrated,
    /// Merged, persisted and rebroadcast a change.
    Applied {
        /// Number of (key, field) pairs whose stored value changed.
        changed: usize,
    },
    /// Discarded a change from a non-seeder while reseeding.
    Fenced,
    /// Discarded a malformed change.
    Rejected,
    /// Cleared the store and asked the sender to seed.
    ResetStarted,
    /// Broadcast `reload` to every connection.
    ReloadBroadcast,
    /// Nothing to do: unknown connection or out-of-place message.
    Ignored,
}

/// Counters describing relay activity since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Changes merged into the store.
    pub changes_applied: u64,
    /// Malformed changes discarded.
    pub changes_rejected: u64,
    /// Changes discarded while reseeding.
    pub changes_fenced: u64,
    /// Messages queued for delivery.
    pub messages_sent: u64,
    /// Connections dropped because their queue was full.
    pub slow_disconnects: u64,
}

#[derive(Default)]
struct Counters {
    changes_applied: AtomicU64,
    changes_rejected: AtomicU64,
    changes_fenced: AtomicU64,
    messages_sent: AtomicU64,
    slow_disconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Live,
    /// The store was reset; only the seeder's changes are applied until it
    /// signals `seed-done`.
    Reseeding { seeder: ConnectionId },
}

struct State {
    store: AuthoritativeStore,
    phase: Phase,
}

/// The relay: one authoritative store shared by every connection.
///
/// Messages are handled synchronously. Each call to [`handle`](Self::handle)
/// holds the store lock from merge to broadcast, so every replica observes
/// changes in the order the store applied them. Outbound messages go to
/// per-connection bounded queues; a connection whose queue is full is
/// dropped and will re-hydrate when it reconnects.
pub struct Relay {
    state: Mutex<State>,
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<RelayMessage>>>,
    next_id: AtomicU64,
    outbound_buffer: usize,
    counters: Counters,
}

impl Relay {
    /// Creates a relay around `store`.
    pub fn new(store: AuthoritativeStore) -> Self {
        Self {
            state: Mutex::new(State {
                store,
                phase: Phase::Live,
            }),
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            outbound_buffer: 1024,
            counters: Counters::default(),
        }
    }

    /// Sets the per-connection outbound queue length.
    #[must_use]
    pub fn with_outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames.max(1);
        self
    }

    /// Registers a new connection.
    pub fn connect(&self) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.outbound_buffer);
        self.connections.write().insert(id, sender);
        tracing::debug!(connection = id, "connection registered");
        Connection { id, receiver }
    }

    /// Forgets a connection.
    ///
    /// If it was reseeding, the relay returns to normal operation with
    /// whatever was seeded so far and tells every remaining connection to
    /// reload, since they still hold pre-reset state.
    pub fn disconnect(&self, id: ConnectionId) {
        self.connections.write().remove(&id);

        let mut state = self.state.lock();
        if state.phase == (Phase::Reseeding { seeder: id }) {
            state.phase = Phase::Live;
            tracing::warn!(
                connection = id,
                entities = state.store.len(),
                "seeder disconnected before seed-done; reloading all replicas"
            );
            self.broadcast(None, &RelayMessage::Reload);
        }
        tracing::debug!(connection = id, "connection closed");
    }

    /// Decodes and handles one text frame.
    ///
    /// An undecodable frame is discarded. If it was meant as a `change`, the
    /// sender still gets its `ack`.
    pub fn handle_frame(&self, from: ConnectionId, frame: &str) -> Handled {
        match ClientMessage::decode(frame) {
            Ok(message) => self.handle(from, message),
            Err(err) => {
                tracing::warn!(connection = from, error = %err, "discarding undecodable frame");
                if is_change_frame(frame) {
                    let _state = self.state.lock();
                    self.counters.changes_rejected.fetch_add(1, Ordering::Relaxed);
                    self.send(from, RelayMessage::Ack);
                    return Handled::Rejected;
                }
                Handled::Ignored
            }
        }
    }

    /// Handles one message from connection `from`.
    pub fn handle(&self, from: ConnectionId, message: ClientMessage) -> Handled {
        if !self.connections.read().contains_key(&from) {
            tracing::debug!(connection = from, event = message.event(), "message from unknown connection");
            return Handled::Ignored;
        }

        let mut state = self.state.lock();
        match message {
            ClientMessage::Init => {
                let snapshot = state.store.snapshot();
                tracing::debug!(connection = from, entities = snapshot.len(), "hydrating");
                self.send(from, RelayMessage::Init { snapshot });
                Handled::Hydrated
            }
            ClientMessage::Change(change) => self.handle_change(&mut state, from, change),
            ClientMessage::Reset => {
                state.store.reset();
                state.phase = Phase::Reseeding { seeder: from };
                tracing::info!(connection = from, "store reset; waiting for seed");
                self.send(from, RelayMessage::Seed);
                Handled::ResetStarted
            }
            ClientMessage::SeedDone => match state.phase {
                Phase::Reseeding { seeder } if seeder != from => {
                    tracing::warn!(connection = from, seeder, "seed-done from a connection that is not seeding");
                    Handled::Ignored
                }
                _ => {
                    state.phase = Phase::Live;
                    tracing::info!(
                        connection = from,
                        entities = state.store.len(),
                        "seeding finished; reloading all replicas"
                    );
                    self.broadcast(None, &RelayMessage::Reload);
                    Handled::ReloadBroadcast
                }
            },
        }
    }

    fn handle_change(&self, state: &mut State, from: ConnectionId, change: ChangeMessage) -> Handled {
        let handled = match state.phase {
            Phase::Reseeding { seeder } if seeder != from => {
                self.counters.changes_fenced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(connection = from, key = %change.key, "change discarded while reseeding");
                Handled::Fenced
            }
            _ => match state.store.apply(&change) {
                Ok(outcome) => {
                    self.counters.changes_applied.fetch_add(1, Ordering::Relaxed);
                    let changed = outcome.changed.len();
                    tracing::debug!(
                        connection = from,
                        key = %change.key,
                        fragment = change.fragment.name(),
                        changed,
                        "change applied"
                    );
                    self.broadcast(Some(from), &RelayMessage::Change(change));
                    Handled::Applied { changed }
                }
                Err(err) => {
                    self.counters.changes_rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(connection = from, key = %change.key, error = %err, "discarding malformed change");
                    Handled::Rejected
                }
            },
        };
        self.send(from, RelayMessage::Ack);
        handled
    }

    /// Returns the current contents of the authoritative store.
    pub fn snapshot(&self) -> leapsync_protocol::Snapshot {
        self.state.lock().store.snapshot()
    }

    /// Returns true while waiting for a seeder to finish.
    pub fn is_reseeding(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Reseeding { .. })
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns activity counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            changes_applied: self.counters.changes_applied.load(Ordering::Relaxed),
            changes_rejected: self.counters.changes_rejected.load(Ordering::Relaxed),
            changes_fenced: self.counters.changes_fenced.load(Ordering::Relaxed),
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            slow_disconnects: self.counters.slow_disconnects.load(Ordering::Relaxed),
        }
    }

    fn send(&self, to: ConnectionId, message: RelayMessage) {
        let result = match self.connections.read().get(&to) {
            Some(sender) => sender.try_send(message),
            None => return,
        };
        self.settle(to, result);
    }

    /// Sends `message` to every connection except `except`.
    fn broadcast(&self, except: Option<ConnectionId>, message: &RelayMessage) {
        let results: Vec<_> = self
            .connections
            .read()
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(id, sender)| (*id, sender.try_send(message.clone())))
            .collect();

        for (id, result) in results {
            self.settle(id, result);
        }
    }

    fn settle(&self, to: ConnectionId, result: Result<(), TrySendError<RelayMessage>>) {
        match result {
            Ok(()) => {
                self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.counters.slow_disconnects.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(connection = to, "outbound queue full; dropping connection");
                self.connections.write().remove(&to);
            }
            Err(TrySendError::Closed(_)) => {
                self.connections.write().remove(&to);
            }
        }
    }
}

fn is_change_frame(frame: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(frame)
        .ok()
        .and_then(|value| value.get("event").and_then(|e| e.as_str()).map(|e| e == "change"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leapsync_protocol::{EntityKey, Fragment};
    use leapsync_storage::InMemorySnapshotStore;
    use serde_json::json;

    fn relay() -> Relay {
        Relay::new(AuthoritativeStore::open(InMemorySnapshotStore::new()).unwrap())
    }

    fn rename(name: &str) -> ClientMessage {
        ClientMessage::Change(ChangeMessage::new(
            Fragment::new("OrgName", "Organization").scalar("name"),
            EntityKey::new("Organization", "ROOT").unwrap(),
            json!({ "name": name }),
        ))
    }

    fn drain(connection: &mut Connection) -> Vec<RelayMessage> {
        let mut out = Vec::new();
        while let Ok(message) = connection.receiver.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn init_replies_with_snapshot() {
        let relay = relay();
        let mut a = relay.connect();
        relay.handle(a.id, rename("Leap Office"));
        drain(&mut a);

        assert_eq!(relay.handle(a.id, ClientMessage::Init), Handled::Hydrated);
        match drain(&mut a).as_slice() {
            [RelayMessage::Init { snapshot }] => assert_eq!(snapshot.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn change_is_broadcast_to_others_and_acked_to_sender() {
        let relay = relay();
        let mut a = relay.connect();
        let mut b = relay.connect();
        let mut c = relay.connect();

        let handled = relay.handle(a.id, rename("Leap Office"));
        assert_eq!(handled, Handled::Applied { changed: 2 });

        assert_eq!(drain(&mut a), [RelayMessage::Ack]);
        for other in [&mut b, &mut c] {
            let received = drain(other);
            assert_eq!(received.len(), 1);
            assert!(matches!(received[0], RelayMessage::Change(_)));
        }
    }

    #[test]
    fn malformed_change_is_acked_not_broadcast() {
        let relay = relay();
        let mut a = relay.connect();
        let mut b = relay.connect();

        let bad = ClientMessage::Change(ChangeMessage::new(
            Fragment::new("OrgName", "Organization").scalar("name"),
            EntityKey::new("Room", "1").unwrap(),
            json!({"name": "X"}),
        ));
        assert_eq!(relay.handle(a.id, bad), Handled::Rejected);
        assert_eq!(drain(&mut a), [RelayMessage::Ack]);
        assert!(drain(&mut b).is_empty());
        assert!(relay.snapshot().is_empty());
        assert_eq!(relay.stats().changes_rejected, 1);
    }

    #[test]
    fn undecodable_frames() {
        let relay = relay();
        let mut a = relay.connect();

        assert_eq!(relay.handle_frame(a.id, "not json"), Handled::Ignored);
        assert_eq!(
            relay.handle_frame(a.id, r#"{"event":"change","key":"nocolon"}"#),
            Handled::Rejected
        );
        assert_eq!(drain(&mut a), [RelayMessage::Ack]);

        let frame = rename("Leap Office").encode().unwrap();
        assert!(matches!(relay.handle_frame(a.id, &frame), Handled::Applied { .. }));
    }

    #[test]
    fn reset_fences_other_writers_until_seed_done() {
        let relay = relay();
        let mut seeder = relay.connect();
        let mut other = relay.connect();
        relay.handle(other.id, rename("Old"));
        drain(&mut seeder);
        drain(&mut other);

        assert_eq!(relay.handle(seeder.id, ClientMessage::Reset), Handled::ResetStarted);
        assert!(relay.snapshot().is_empty());
        assert!(relay.is_reseeding());
        assert_eq!(drain(&mut seeder), [RelayMessage::Seed]);
        assert!(drain(&mut other).is_empty());

        assert_eq!(relay.handle(other.id, rename("Stale")), Handled::Fenced);
        assert_eq!(drain(&mut other), [RelayMessage::Ack]);
        assert!(drain(&mut seeder).is_empty());

        assert!(matches!(relay.handle(seeder.id, rename("Leap Office")), Handled::Applied { .. }));
        assert_eq!(relay.handle(other.id, ClientMessage::SeedDone), Handled::Ignored);
        assert_eq!(relay.handle(seeder.id, ClientMessage::SeedDone), Handled::ReloadBroadcast);
        assert!(!relay.is_reseeding());

        assert_eq!(drain(&mut seeder), [RelayMessage::Ack, RelayMessage::Reload]);
        let to_other = drain(&mut other);
        assert!(matches!(to_other.as_slice(), [RelayMessage::Change(_), RelayMessage::Reload]));

        let org = EntityKey::new("Organization", "ROOT").unwrap();
        assert_eq!(relay.snapshot().get(&org).unwrap()["name"], "Leap Office");
    }

    #[test]
    fn seeder_disconnect_ends_reseeding() {
        let relay = relay();
        let seeder = relay.connect();
        relay.handle(seeder.id, ClientMessage::Reset);
        assert!(relay.is_reseeding());

        relay.disconnect(seeder.id);
        assert!(!relay.is_reseeding());
    }

    #[test]
    fn abandoned_reseed_reloads_remaining_connections() {
        let relay = relay();
        let mut other = relay.connect();
        let seeder = relay.connect();
        relay.handle(other.id, rename("Old"));
        drain(&mut other);

        relay.handle(seeder.id, ClientMessage::Reset);
        relay.disconnect(seeder.id);

        assert_eq!(drain(&mut other), vec![RelayMessage::Reload]);
        assert!(relay.snapshot().is_empty());
    }

    #[test]
    fn ordinary_disconnect_sends_nothing() {
        let relay = relay();
        let mut other = relay.connect();
        let gone = relay.connect();
        relay.disconnect(gone.id);
        assert!(drain(&mut other).is_empty());
    }

    #[test]
    fn unknown_connection_is_ignored() {
        let relay = relay();
        assert_eq!(relay.handle(42, rename("X")), Handled::Ignored);
        assert!(relay.snapshot().is_empty());
    }

    #[test]
    fn full_queue_drops_connection() {
        let relay = relay().with_outbound_buffer(1);
        let mut writer = relay.connect();
        let _slow = relay.connect();

        relay.handle(writer.id, rename("A"));
        drain(&mut writer);
        relay.handle(writer.id, rename("B"));

        assert_eq!(relay.connection_count(), 1);
        assert_eq!(relay.stats().slow_disconnects, 1);
    }

    #[test]
    fn closed_receiver_is_forgotten() {
        let relay = relay();
        let writer = relay.connect();
        let gone = relay.connect();
        drop(gone);

        relay.handle(writer.id, rename("A"));
        assert_eq!(relay.connection_count(), 1);
    }
}
