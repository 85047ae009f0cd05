//! Subscription registry.
//!
//! Each subscription records the (key, field) pairs its last resolution
//! looked at. A write re-resolves only the subscriptions whose dependency
//! set intersects the fields it changed, found through a reverse index from
//! entity key to subscription. Updates are published on a
//! `tokio::sync::watch` channel, so observers always see the latest settled
//! state and no observer code runs while the cache is being mutated.

use crate::changes::ChangeSet;
use crate::resolve::{DepSet, FragmentState, Resolution};
use leapsync_protocol::{EntityKey, Fragment};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// A live view of one fragment rooted at one entity.
///
/// Dropping every clone of a subscription unregisters it.
#[derive(Debug, Clone)]
pub struct Subscription {
    fragment: Arc<Fragment>,
    key: EntityKey,
    receiver: watch::Receiver<FragmentState>,
}

impl Subscription {
    /// Returns the subscribed fragment.
    #[must_use]
    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    /// Returns the root entity key.
    #[must_use]
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> FragmentState {
        self.receiver.borrow().clone()
    }

    /// Returns the resolved value, or `None` while incomplete.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.receiver.borrow().complete().cloned()
    }

    /// Returns true once every declared field is available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.receiver.borrow().is_complete()
    }

    /// Returns true if the state changed since it was last marked seen.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Returns the current state and marks it seen.
    pub fn mark_seen(&mut self) -> FragmentState {
        self.receiver.borrow_and_update().clone()
    }

    /// Waits for the next state change.
    ///
    /// Returns `false` once the owning cache has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

type SubscriptionId = u64;

struct Entry {
    fragment: Arc<Fragment>,
    key: EntityKey,
    deps: DepSet,
    sender: watch::Sender<FragmentState>,
}

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: HashMap<SubscriptionId, Entry>,
    targets: HashMap<(Arc<Fragment>, EntityKey), SubscriptionId>,
    index: HashMap<EntityKey, HashSet<SubscriptionId>>,
    next_id: SubscriptionId,
}

impl SubscriptionRegistry {
    /// Registers a subscription, sharing the entry of an identical one.
    pub fn subscribe<F>(&mut self, fragment: Arc<Fragment>, key: EntityKey, resolve: F) -> Subscription
    where
        F: FnOnce(&Fragment, &EntityKey) -> Resolution,
    {
        self.prune();

        let target = (fragment, key);
        if let Some(entry) = self.targets.get(&target).and_then(|id| self.entries.get(id)) {
            return Subscription {
                fragment: Arc::clone(&entry.fragment),
                key: entry.key.clone(),
                receiver: entry.sender.subscribe(),
            };
        }

        let (fragment, key) = target;
        let resolution = resolve(&fragment, &key);
        let (sender, receiver) = watch::channel(resolution.state());

        let id = self.next_id;
        self.next_id += 1;
        index_deps(&mut self.index, id, &resolution.deps);
        self.targets.insert((Arc::clone(&fragment), key.clone()), id);
        self.entries.insert(
            id,
            Entry {
                fragment: Arc::clone(&fragment),
                key: key.clone(),
                deps: resolution.deps,
                sender,
            },
        );

        Subscription {
            fragment,
            key,
            receiver,
        }
    }

    /// Re-resolves subscriptions whose dependencies intersect `changes`.
    ///
    /// Returns the number of subscriptions whose state changed.
    pub fn notify<F>(&mut self, changes: &ChangeSet, resolve: F) -> usize
    where
        F: Fn(&Fragment, &EntityKey) -> Resolution,
    {
        if changes.is_empty() {
            return 0;
        }

        let affected: BTreeSet<SubscriptionId> = changes
            .keys()
            .filter_map(|key| self.index.get(key))
            .flatten()
            .copied()
            .filter(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|entry| entry.deps.intersects(changes))
            })
            .collect();

        // Closed entries are dropped as they are met; the rest wait for the
        // next subscribe or len.
        let mut refreshed = 0;
        for id in affected {
            if self.entries.get(&id).is_some_and(|entry| entry.sender.is_closed()) {
                self.remove(id);
            } else if self.refresh(id, &resolve) {
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Re-resolves every subscription.
    pub fn notify_all<F>(&mut self, resolve: F) -> usize
    where
        F: Fn(&Fragment, &EntityKey) -> Resolution,
    {
        self.prune();
        let ids: Vec<_> = self.entries.keys().copied().collect();
        ids.into_iter().filter(|id| self.refresh(*id, &resolve)).count()
    }

    /// Number of live subscriptions.
    pub fn len(&mut self) -> usize {
        self.prune();
        self.entries.len()
    }

    fn refresh<F>(&mut self, id: SubscriptionId, resolve: &F) -> bool
    where
        F: Fn(&Fragment, &EntityKey) -> Resolution,
    {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };

        let resolution = resolve(&entry.fragment, &entry.key);
        unindex_deps(&mut self.index, id, &entry.deps);
        index_deps(&mut self.index, id, &resolution.deps);
        entry.deps = resolution.deps;

        let next = if resolution.missing.is_empty() {
            FragmentState::Complete(resolution.value)
        } else {
            FragmentState::Incomplete {
                missing: resolution.missing,
            }
        };
        entry.sender.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    /// Drops entries whose every receiver is gone.
    fn prune(&mut self) {
        let closed: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.sender.is_closed())
            .map(|(id, _)| *id)
            .collect();

        for id in closed {
            self.remove(id);
        }
    }

    fn remove(&mut self, id: SubscriptionId) {
        if let Some(entry) = self.entries.remove(&id) {
            unindex_deps(&mut self.index, id, &entry.deps);
            self.targets.remove(&(entry.fragment, entry.key));
        }
    }
}

fn index_deps(index: &mut HashMap<EntityKey, HashSet<SubscriptionId>>, id: SubscriptionId, deps: &DepSet) {
    for key in deps.keys() {
        index.entry(key.clone()).or_default().insert(id);
    }
}

fn unindex_deps(index: &mut HashMap<EntityKey, HashSet<SubscriptionId>>, id: SubscriptionId, deps: &DepSet) {
    for key in deps.keys() {
        if let Some(ids) = index.get_mut(key) {
            ids.remove(&id);
            if ids.is_empty() {
                index.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;
    use leapsync_protocol::Record;

    fn name() -> Arc<Fragment> {
        Arc::new(Fragment::new("OrgName", "Organization").scalar("name"))
    }

    fn key(id: &str) -> EntityKey {
        EntityKey::new("Organization", id).unwrap()
    }

    #[test]
    fn notify_only_touches_affected_entries() {
        let records: HashMap<EntityKey, Record> = HashMap::new();
        let mut registry = SubscriptionRegistry::default();
        let a = registry.subscribe(name(), key("a"), |f, k| resolve(&records, f, k));
        let b = registry.subscribe(name(), key("b"), |f, k| resolve(&records, f, k));
        drop(a);
        drop(b);

        let mut changes = ChangeSet::new();
        changes.insert(&key("a"), "name");
        assert_eq!(registry.notify(&changes, |f, k| resolve(&records, f, k)), 0);

        // "b" was not written, so it is still waiting to be pruned.
        assert_eq!(registry.entries.len(), 1);
        assert!(registry.index.get(&key("a")).map_or(true, HashSet::is_empty));
        assert_eq!(registry.len(), 0);
        assert!(registry.targets.is_empty());
    }

    #[test]
    fn notify_refreshes_live_entries() {
        let mut records: HashMap<EntityKey, Record> = HashMap::new();
        let mut registry = SubscriptionRegistry::default();
        let sub = registry.subscribe(name(), key("a"), |f, k| resolve(&records, f, k));
        assert!(!sub.is_ready());

        let mut record = Record::new();
        record.insert("__typename".into(), Value::from("Organization"));
        record.insert("name".into(), Value::from("Leap Office"));
        records.insert(key("a"), record);

        let mut changes = ChangeSet::new();
        changes.insert(&key("a"), "name");
        assert_eq!(registry.notify(&changes, |f, k| resolve(&records, f, k)), 1);
        assert!(sub.is_ready());
    }
}
