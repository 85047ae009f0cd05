//! The client replica: a normalized cache kept in sync with the relay.

use crate::error::{SyncError, SyncResult};
use crate::state::{ConnectionState, ControlEvent};
use leapsync_cache::{ChangeSet, FragmentState, NormalizedCache, Subscription, WriteOutcome};
use leapsync_protocol::{ChangeMessage, ClientMessage, EntityKey, Fragment, Snapshot};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Local writes sent to the relay and not yet acknowledged.
///
/// While a field has an outstanding write, remote changes to it are
/// skipped: the relay applies our write after whatever it already
/// broadcast, so our value is the one it ends up with.
#[derive(Debug, Default)]
struct PendingWrites {
    queue: VecDeque<ChangeSet>,
    counts: HashMap<(EntityKey, String), usize>,
}

impl PendingWrites {
    fn push(&mut self, touched: ChangeSet) {
        for (key, field) in touched.iter() {
            *self.counts.entry((key.clone(), field.to_string())).or_default() += 1;
        }
        self.queue.push_back(touched);
    }

    fn acknowledge(&mut self) {
        let Some(acked) = self.queue.pop_front() else {
            tracing::warn!("ack without an outstanding change");
            return;
        };
        for (key, field) in acked.iter() {
            let slot = (key.clone(), field.to_string());
            if let Some(count) = self.counts.get_mut(&slot) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&slot);
                }
            }
        }
    }

    fn contains(&self, key: &EntityKey, field: &str) -> bool {
        !self.counts.is_empty() && self.counts.contains_key(&(key.clone(), field.to_string()))
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.counts.clear();
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

struct Core {
    cache: NormalizedCache,
    /// Present only while live.
    outbound: Option<mpsc::UnboundedSender<ClientMessage>>,
    pending: PendingWrites,
}

impl Core {
    fn send(&mut self, message: ClientMessage) -> SyncResult<()> {
        let outbound = self.outbound.as_ref().ok_or(SyncError::NotConnected)?;
        if outbound.send(message).is_err() {
            self.outbound = None;
            self.pending.clear();
            return Err(SyncError::NotConnected);
        }
        Ok(())
    }
}

struct Inner {
    core: Mutex<Core>,
    state: watch::Sender<ConnectionState>,
    control: broadcast::Sender<ControlEvent>,
}

/// A client's replica of the shared entity graph.
///
/// Cheap to clone; clones share one cache. Reads, writes and subscriptions
/// behave as on a [`NormalizedCache`]. In addition, while a
/// [`SyncSession`](crate::SyncSession) keeps the replica live:
/// - local writes are applied locally first, then sent to the relay
/// - changes made by other replicas are merged in as they arrive
///
/// Writes made while not live stay local and are never replayed; the next
/// hydrate replaces them with the relay's state.
///
/// # Example
///
/// ```
/// use leapsync_client::Replica;
/// use leapsync_protocol::Fragment;
/// use serde_json::json;
///
/// let org = Fragment::new("Org", "Organization").scalars(["id", "name"]);
/// let replica = Replica::new();
///
/// replica.write(&org, "ROOT", &json!({"id": "ROOT", "name": "Leap Office"})).unwrap();
/// assert!(replica.resolve(&org, "ROOT").is_complete());
/// ```
#[derive(Clone)]
pub struct Replica {
    inner: Arc<Inner>,
}

impl Replica {
    /// Creates an empty, disconnected replica.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (control, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(Core {
                    cache: NormalizedCache::new(),
                    outbound: None,
                    pending: PendingWrites::default(),
                }),
                state,
                control,
            }),
        }
    }

    /// Reads whatever subset of `fragment` is currently known for `id`.
    pub fn read(&self, fragment: &Fragment, id: &str) -> Option<Value> {
        self.inner.core.lock().cache.read(fragment, id)
    }

    /// One-shot, completeness-aware read.
    pub fn resolve(&self, fragment: &Fragment, id: &str) -> FragmentState {
        self.inner.core.lock().cache.resolve(fragment, id)
    }

    /// Merges `data` into entity `id` and, if live, sends it to the relay.
    ///
    /// # Errors
    ///
    /// Returns an error, changing nothing and sending nothing, if the
    /// fragment is malformed or `data` does not fit it. These are exactly
    /// the changes the relay would reject. A lost connection is not an
    /// error.
    pub fn write(&self, fragment: &Fragment, id: &str, data: &Value) -> SyncResult<WriteOutcome> {
        let key = NormalizedCache::key_for(fragment, id)?;
        let change = ChangeMessage::new(fragment.clone(), key, data.clone());
        change.validate()?;

        let mut core = self.inner.core.lock();
        let outcome = core.cache.write_key(fragment, &change.key, data)?;

        if core.outbound.is_some() {
            match core.send(ClientMessage::Change(change)) {
                Ok(()) => core.pending.push(outcome.touched.clone()),
                Err(_) => tracing::debug!(fragment = fragment.name(), "connection lost; write kept local"),
            }
        }
        Ok(outcome)
    }

    /// Subscribes to `fragment` rooted at entity `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` cannot form an entity key.
    pub fn subscribe(&self, fragment: impl Into<Arc<Fragment>>, id: &str) -> SyncResult<Subscription> {
        Ok(self.inner.core.lock().cache.subscribe(fragment, id)?)
    }

    /// Replaces the local contents with `snapshot`.
    ///
    /// Nothing is sent to the relay.
    pub fn restore_snapshot(&self, snapshot: Snapshot) {
        let mut core = self.inner.core.lock();
        core.pending.clear();
        core.cache.restore_snapshot(snapshot);
    }

    /// Copies the local contents.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.core.lock().cache.extract()
    }

    /// Asks the relay to wipe its store.
    ///
    /// The relay answers with [`ControlEvent::Seed`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] unless live.
    pub fn request_reset(&self) -> SyncResult<()> {
        self.inner.core.lock().send(ClientMessage::Reset)
    }

    /// Tells the relay seeding is finished, which reloads every replica.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] unless live.
    pub fn signal_seed_done(&self) -> SyncResult<()> {
        self.inner.core.lock().send(ClientMessage::SeedDone)
    }

    /// Returns the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Returns true while live.
    pub fn is_live(&self) -> bool {
        self.connection_state().is_live()
    }

    /// Observes connection state changes.
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Observes `seed` and `reload` instructions from the relay.
    pub fn control_events(&self) -> broadcast::Receiver<ControlEvent> {
        self.inner.control.subscribe()
    }

    /// Number of local changes sent and not yet acknowledged.
    pub fn pending_writes(&self) -> usize {
        self.inner.core.lock().pending.len()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.core.lock().cache.subscription_count()
    }

    /// Hydrates from `snapshot` and starts forwarding writes to `outbound`.
    pub(crate) fn attach(&self, outbound: mpsc::UnboundedSender<ClientMessage>, snapshot: Snapshot) {
        {
            let mut core = self.inner.core.lock();
            core.pending.clear();
            core.cache.restore_snapshot(snapshot);
            core.outbound = Some(outbound);
        }
        self.set_state(ConnectionState::Live);
    }

    /// Stops forwarding writes.
    pub(crate) fn detach(&self, state: ConnectionState) {
        {
            let mut core = self.inner.core.lock();
            core.outbound = None;
            core.pending.clear();
        }
        self.set_state(state);
    }

    /// Detaches and discards every local record.
    pub(crate) fn discard(&self) {
        {
            let mut core = self.inner.core.lock();
            core.outbound = None;
            core.pending.clear();
            core.cache.clear();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Merges a change made by another replica.
    ///
    /// Fields with an unacknowledged local write are left alone.
    pub(crate) fn apply_remote(&self, change: &ChangeMessage) {
        let mut core = self.inner.core.lock();
        if core.outbound.is_none() {
            tracing::debug!(key = %change.key, "ignoring change received before hydrate");
            return;
        }
        if let Err(err) = change.validate() {
            tracing::warn!(key = %change.key, error = %err, "ignoring malformed remote change");
            return;
        }

        let Core { cache, pending, .. } = &mut *core;
        let result = cache.write_key_except(&change.fragment, &change.key, &change.data, |key, field| {
            pending.contains(key, field)
        });
        match result {
            Ok(outcome) => tracing::trace!(
                key = %change.key,
                changed = outcome.changed.len(),
                masked = outcome.touched.len() - outcome.changed.len(),
                "remote change applied"
            ),
            Err(err) => tracing::warn!(key = %change.key, error = %err, "ignoring remote change"),
        }
    }

    /// Records the relay's acknowledgement of our oldest pending change.
    pub(crate) fn acknowledge(&self) {
        self.inner.core.lock().pending.acknowledge();
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "connection state");
        }
    }

    pub(crate) fn emit(&self, event: ControlEvent) {
        // No receivers is fine.
        let _ = self.inner.control.send(event);
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("Replica")
            .field("state", &*self.inner.state.borrow())
            .field("entities", &core.cache.len())
            .field("pending", &core.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn org() -> Fragment {
        Fragment::new("Org", "Organization").scalars(["id", "name"])
    }

    fn org_key() -> EntityKey {
        EntityKey::new("Organization", "ROOT").unwrap()
    }

    fn live() -> (Replica, mpsc::UnboundedReceiver<ClientMessage>) {
        let replica = Replica::new();
        let (tx, rx) = mpsc::unbounded_channel();
        replica.attach(tx, Snapshot::new());
        (replica, rx)
    }

    fn remote(name: &str) -> ChangeMessage {
        ChangeMessage::new(org(), org_key(), json!({"id": "ROOT", "name": name}))
    }

    #[test]
    fn offline_writes_stay_local() {
        let replica = Replica::new();
        replica.write(&org(), "ROOT", &json!({"name": "Local"})).unwrap();

        assert_eq!(replica.read(&org(), "ROOT").unwrap()["name"], "Local");
        assert_eq!(replica.pending_writes(), 0);
        assert!(matches!(replica.request_reset(), Err(SyncError::NotConnected)));
    }

    #[test]
    fn live_writes_are_sent_after_local_apply() {
        let (replica, mut rx) = live();
        replica.write(&org(), "ROOT", &json!({"name": "Leap Office"})).unwrap();

        match rx.try_recv().unwrap() {
            ClientMessage::Change(change) => {
                assert_eq!(change.key, org_key());
                assert_eq!(change.data, json!({"name": "Leap Office"}));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(replica.pending_writes(), 1);
    }

    #[test]
    fn invalid_write_sends_nothing() {
        let (replica, mut rx) = live();
        assert!(replica.write(&org(), "ROOT", &json!(["not", "an", "object"])).is_err());
        assert!(rx.try_recv().is_err());
        assert!(replica.snapshot().is_empty());
    }

    #[test]
    fn malformed_fragment_is_rejected_before_local_apply() {
        let (replica, mut rx) = live();
        let fragments = [
            Fragment::new("", "Organization").scalar("name"),
            Fragment::new("Org", "Organization").scalars(["name", "name"]),
            Fragment::new("Org", "Organization").scalars(["name", "__secret"]),
        ];
        for fragment in &fragments {
            let result = replica.write(fragment, "ROOT", &json!({"name": "Ghost", "__secret": 1}));
            assert!(matches!(result, Err(SyncError::Protocol(_))), "{fragment:?}");
        }

        assert!(replica.snapshot().is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(replica.pending_writes(), 0);
    }

    #[test]
    fn attach_replaces_local_state() {
        let replica = Replica::new();
        replica.write(&org(), "ROOT", &json!({"name": "Never sent"})).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        replica.attach(tx, Snapshot::new());
        assert!(replica.read(&org(), "ROOT").is_none());
        assert!(replica.is_live());
    }

    #[test]
    fn remote_change_is_masked_until_acknowledged() {
        let (replica, _rx) = live();
        replica.write(&org(), "ROOT", &json!({"name": "Mine"})).unwrap();

        // Relay applied someone else's write before ours.
        replica.apply_remote(&remote("Theirs"));
        assert_eq!(replica.read(&org(), "ROOT").unwrap()["name"], "Mine");

        // Relay applied ours, then another write after it.
        replica.acknowledge();
        replica.apply_remote(&remote("Later"));
        assert_eq!(replica.read(&org(), "ROOT").unwrap()["name"], "Later");
    }

    #[test]
    fn masking_is_per_field() {
        let (replica, _rx) = live();
        let name_only = Fragment::new("OrgName", "Organization").scalar("name");
        replica.write(&name_only, "ROOT", &json!({"name": "Mine"})).unwrap();

        replica.apply_remote(&remote("Theirs"));
        let stored = replica.read(&org(), "ROOT").unwrap();
        assert_eq!(stored, json!({"id": "ROOT", "name": "Mine"}));
    }

    #[test]
    fn changes_before_hydrate_are_ignored() {
        let replica = Replica::new();
        replica.apply_remote(&remote("Early"));
        assert!(replica.snapshot().is_empty());
    }

    #[test]
    fn closed_channel_detaches_writes() {
        let (replica, rx) = live();
        drop(rx);

        replica.write(&org(), "ROOT", &json!({"name": "Local"})).unwrap();
        assert_eq!(replica.pending_writes(), 0);
        assert!(matches!(replica.signal_seed_done(), Err(SyncError::NotConnected)));
    }

    #[test]
    fn discard_clears_everything() {
        let (replica, _rx) = live();
        replica.write(&org(), "ROOT", &json!({"name": "X"})).unwrap();
        let sub = replica.subscribe(Arc::new(org()), "ROOT").unwrap();

        replica.discard();
        assert!(replica.snapshot().is_empty());
        assert_eq!(replica.pending_writes(), 0);
        assert_eq!(replica.connection_state(), ConnectionState::Disconnected);
        assert!(!sub.is_ready());
    }

    #[test]
    fn control_events_reach_subscribers() {
        let replica = Replica::new();
        let mut events = replica.control_events();
        replica.emit(ControlEvent::Seed);
        assert_eq!(events.try_recv().unwrap(), ControlEvent::Seed);
    }
}
