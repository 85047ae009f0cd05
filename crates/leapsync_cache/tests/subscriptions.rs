//! Subscription behavior of the normalized cache.

use leapsync_cache::{FragmentState, NormalizedCache};
use leapsync_protocol::{EntityKey, Fragment, Snapshot};
use serde_json::json;
use std::sync::Arc;

fn user_ref() -> Fragment {
    Fragment::new("UserRef", "User").scalar("id")
}

fn room_participants() -> Arc<Fragment> {
    Arc::new(
        Fragment::new("RoomParticipants", "Room")
            .scalar("id")
            .many("participants", user_ref()),
    )
}

fn org_info() -> Arc<Fragment> {
    Arc::new(Fragment::new("Org", "Organization").scalars(["id", "name"]))
}

#[test]
fn subscription_becomes_ready_when_fields_arrive() {
    let mut cache = NormalizedCache::new();
    let mut sub = cache.subscribe(org_info(), "ROOT").unwrap();

    match sub.mark_seen() {
        FragmentState::Incomplete { missing } => assert_eq!(missing.len(), 2),
        other => panic!("expected incomplete, got {other:?}"),
    }

    cache.write(&org_info(), "ROOT", &json!({"id": "ROOT"})).unwrap();
    assert!(!sub.is_ready());

    cache
        .write(&org_info(), "ROOT", &json!({"name": "Leap Office"}))
        .unwrap();
    assert!(sub.has_changed());
    assert_eq!(sub.value(), Some(json!({"id": "ROOT", "name": "Leap Office"})));
}

#[test]
fn nested_entity_updates_reach_parent_subscription() {
    let mut cache = NormalizedCache::new();
    let user = Fragment::new("UserName", "User").scalars(["id", "name"]);
    let room = Arc::new(Fragment::new("Room", "Room").scalar("id").many("participants", user.clone()));

    cache
        .write(&room, "a", &json!({"id": "a", "participants": [{"id": "u1", "name": "Ada"}]}))
        .unwrap();
    let mut sub = cache.subscribe(Arc::clone(&room), "a").unwrap();
    sub.mark_seen();

    cache.write(&user, "u1", &json!({"name": "Grace"})).unwrap();

    assert!(sub.has_changed());
    let value = sub.value().unwrap();
    assert_eq!(value["participants"][0]["name"], "Grace");
}

#[test]
fn unrelated_writes_do_not_notify() {
    let mut cache = NormalizedCache::new();
    cache
        .write(&org_info(), "ROOT", &json!({"id": "ROOT", "name": "Leap Office"}))
        .unwrap();
    let mut sub = cache.subscribe(org_info(), "ROOT").unwrap();
    sub.mark_seen();

    let org_rooms = Fragment::new("OrgRooms", "Organization").scalar("rooms");
    cache.write(&org_rooms, "ROOT", &json!({"rooms": []})).unwrap();
    cache
        .write(&org_info(), "OTHER", &json!({"id": "OTHER", "name": "Elsewhere"}))
        .unwrap();

    assert!(!sub.has_changed());
    assert!(sub.is_ready());
}

#[test]
fn completeness_is_monotonic_under_unrelated_writes() {
    let mut cache = NormalizedCache::new();
    let room = room_participants();
    cache
        .write(&room, "a", &json!({"id": "a", "participants": [{"id": "u1"}]}))
        .unwrap();
    let sub = cache.subscribe(Arc::clone(&room), "a").unwrap();
    assert!(sub.is_ready());

    for i in 0..20 {
        cache
            .write(&room, &format!("other-{i}"), &json!({"id": i, "participants": []}))
            .unwrap();
        assert!(sub.is_ready());
    }
}

#[test]
fn overwriting_a_required_reference_with_null_makes_it_incomplete() {
    let mut cache = NormalizedCache::new();
    let room = room_participants();
    cache
        .write(&room, "a", &json!({"id": "a", "participants": [{"id": "u1"}]}))
        .unwrap();
    let sub = cache.subscribe(Arc::clone(&room), "a").unwrap();
    assert!(sub.is_ready());

    cache.write(&room, "a", &json!({"participants": null})).unwrap();
    assert!(!sub.is_ready());
}

#[test]
fn identical_subscriptions_share_one_entry() {
    let mut cache = NormalizedCache::new();
    let first = cache.subscribe(org_info(), "ROOT").unwrap();
    let second = cache.subscribe(org_info(), "ROOT").unwrap();
    let other = cache.subscribe(room_participants(), "a").unwrap();

    assert_eq!(cache.subscription_count(), 2);

    drop(first);
    assert_eq!(cache.subscription_count(), 2);
    drop(second);
    drop(other);
    assert_eq!(cache.subscription_count(), 0);
}

#[test]
fn restore_snapshot_reevaluates_every_subscription() {
    let mut cache = NormalizedCache::new();
    cache
        .write(&org_info(), "ROOT", &json!({"id": "ROOT", "name": "Leap Office"}))
        .unwrap();
    let mut sub = cache.subscribe(org_info(), "ROOT").unwrap();
    sub.mark_seen();

    cache.restore_snapshot(Snapshot::new());
    assert!(sub.has_changed());
    assert!(!sub.is_ready());

    let seeded: Snapshot = serde_json::from_value(json!({
        "Organization:ROOT": {"__typename": "Organization", "id": "ROOT", "name": "Seeded"}
    }))
    .unwrap();
    cache.restore_snapshot(seeded);
    assert_eq!(sub.value().unwrap()["name"], "Seeded");
}

#[test]
fn rewriting_same_value_does_not_wake_observers() {
    let mut cache = NormalizedCache::new();
    let data = json!({"id": "ROOT", "name": "Leap Office"});
    cache.write(&org_info(), "ROOT", &data).unwrap();
    let mut sub = cache.subscribe(org_info(), "ROOT").unwrap();
    sub.mark_seen();

    cache.write(&org_info(), "ROOT", &data).unwrap();
    assert!(!sub.has_changed());
}

#[test]
fn pruning_a_participant_updates_the_list() {
    let mut cache = NormalizedCache::new();
    let room = room_participants();
    cache
        .write(&room, "a", &json!({"id": "a", "participants": [{"id": "u1"}, {"id": "u2"}]}))
        .unwrap();
    let sub = cache.subscribe(Arc::clone(&room), "a").unwrap();

    let current = sub.value().unwrap();
    let remaining: Vec<_> = current["participants"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["id"] != "u1")
        .cloned()
        .collect();
    cache
        .write(&room, "a", &json!({"id": "a", "participants": remaining}))
        .unwrap();

    assert_eq!(sub.value().unwrap()["participants"], json!([{"id": "u2"}]));
    // The pruned entity itself is never deleted.
    assert!(cache.record(&EntityKey::new("User", "u1").unwrap()).is_some());
}

#[tokio::test]
async fn observers_wake_on_change() {
    let mut cache = NormalizedCache::new();
    let mut sub = cache.subscribe(org_info(), "ROOT").unwrap();
    sub.mark_seen();

    cache
        .write(&org_info(), "ROOT", &json!({"id": "ROOT", "name": "Leap Office"}))
        .unwrap();

    assert!(sub.changed().await);
    assert!(sub.is_ready());
}
