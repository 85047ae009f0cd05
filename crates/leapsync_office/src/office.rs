//! Office operations for one user.

use crate::error::OfficeResult;
use crate::fragments::{self, ROOT_ORGANIZATION};
use crate::layout::{pick_random_position, Position};
use leapsync_client::{Replica, Subscription};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// A browser shared in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedBrowser {
    /// Unique id.
    pub id: String,
    /// Remote browser target shown in the window.
    pub target_id: String,
    /// Left edge on the board.
    pub x: i64,
    /// Top edge on the board.
    pub y: i64,
}

impl SharedBrowser {
    /// Window position on the board.
    pub fn position(&self) -> Position {
        Position { x: self.x, y: self.y }
    }
}

/// A room or workspace with its participants.
#[derive(Debug, Clone)]
struct Space {
    id: String,
    participants: Vec<String>,
}

impl Space {
    fn contains(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    fn to_value(&self) -> Value {
        let participants: Vec<Value> = self.participants.iter().map(|id| json!({ "id": id })).collect();
        json!({ "id": self.id, "participants": participants })
    }
}

/// Ids reachable in `value[field][*].id`. Dangling entries have no id and
/// are skipped.
fn ids(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn spaces(value: &Value, field: &str) -> Vec<Space> {
    let Some(items) = value.get(field).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?.to_string();
            Some(Space {
                id,
                participants: ids(item, "participants"),
            })
        })
        .collect()
}

/// The office as seen by one user, backed by a [`Replica`].
///
/// The organization lists rooms; the user lists private workspaces. A user
/// is in at most one room or workspace at a time, recorded in that space's
/// `participants`.
#[derive(Debug, Clone)]
pub struct Office {
    replica: Replica,
    user_id: String,
}

impl Office {
    /// Creates the office view of `user_id`.
    pub fn new(replica: Replica, user_id: impl Into<String>) -> Self {
        Self {
            replica,
            user_id: user_id.into(),
        }
    }

    /// Returns the backing replica.
    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Returns the user this view acts for.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn rooms(&self) -> Option<Vec<Space>> {
        self.replica
            .read(&fragments::organization_rooms(), ROOT_ORGANIZATION)
            .map(|org| spaces(&org, "rooms"))
    }

    fn workspaces(&self) -> Vec<Space> {
        self.replica
            .read(&fragments::user_workspaces(), &self.user_id)
            .map(|user| spaces(&user, "workspaces"))
            .unwrap_or_default()
    }

    fn write_participants(&self, space: &Space) -> OfficeResult<()> {
        self.replica
            .write(&fragments::room_participants(), &space.id, &space.to_value())?;
        Ok(())
    }

    /// Moves the user into room or workspace `target_id`.
    ///
    /// The user is first removed from the room or workspace they are in.
    /// Returns the id of the space the user ends up in: `target_id`, also
    /// when they were already there, or `None` if the organization is not
    /// known yet or `target_id` is neither one of its rooms nor one of the
    /// user's workspaces.
    ///
    /// # Errors
    ///
    /// Returns an error if a write is rejected by the replica.
    pub fn join(&self, target_id: &str) -> OfficeResult<Option<String>> {
        let Some(rooms) = self.rooms() else {
            tracing::debug!(user = %self.user_id, "organization not loaded; cannot join");
            return Ok(None);
        };
        let workspaces = self.workspaces();

        for current in [
            rooms.iter().find(|r| r.contains(&self.user_id)),
            workspaces.iter().find(|w| w.contains(&self.user_id)),
        ]
        .into_iter()
        .flatten()
        {
            if current.id == target_id {
                return Ok(Some(target_id.to_string()));
            }
            let mut left = current.clone();
            left.participants.retain(|p| p != &self.user_id);
            self.write_participants(&left)?;
        }

        let target = rooms
            .iter()
            .chain(workspaces.iter())
            .find(|space| space.id == target_id);
        let Some(target) = target else {
            tracing::warn!(user = %self.user_id, target = target_id, "no such room or workspace");
            return Ok(None);
        };

        let mut joined = target.clone();
        joined.participants.retain(|p| p != &self.user_id);
        joined.participants.push(self.user_id.clone());
        self.write_participants(&joined)?;
        tracing::info!(user = %self.user_id, room = target_id, "joined");
        Ok(Some(joined.id))
    }

    /// Returns the room containing the user, else their workspace
    /// containing them.
    pub fn current_room_id(&self) -> Option<String> {
        if let Some(room) = self
            .rooms()
            .unwrap_or_default()
            .into_iter()
            .find(|r| r.contains(&self.user_id))
        {
            return Some(room.id);
        }
        self.workspaces()
            .into_iter()
            .find(|w| w.contains(&self.user_id))
            .map(|w| w.id)
    }

    /// Returns the browsers shared in `room_id`.
    pub fn shared_browsers(&self, room_id: &str) -> Vec<SharedBrowser> {
        self.replica
            .read(&fragments::room_browsers(), room_id)
            .and_then(|room| room.get("sharedBrowsers").and_then(Value::as_array).cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()
    }

    /// Shares a new browser showing `target_id` in `room_id`, placed where
    /// it does not cover the room's other browsers.
    ///
    /// Returns `None` if the room is not known.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected by the replica.
    pub fn new_browser(&self, room_id: &str, target_id: &str) -> OfficeResult<Option<SharedBrowser>> {
        self.new_browser_with(&mut rand::thread_rng(), room_id, target_id)
    }

    /// Like [`new_browser`](Self::new_browser), drawing positions from `rng`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected by the replica.
    pub fn new_browser_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        room_id: &str,
        target_id: &str,
    ) -> OfficeResult<Option<SharedBrowser>> {
        if self.replica.read(&fragments::room_browsers(), room_id).is_none() {
            return Ok(None);
        }
        let mut browsers = self.shared_browsers(room_id);
        let occupied: Vec<Position> = browsers.iter().map(SharedBrowser::position).collect();
        let position = pick_random_position(rng, &occupied);

        let browser = SharedBrowser {
            id: Uuid::new_v4().to_string(),
            target_id: target_id.to_string(),
            x: position.x,
            y: position.y,
        };
        browsers.push(browser.clone());

        let data = json!({
            "id": room_id,
            "sharedBrowsers": serde_json::to_value(&browsers)?,
        });
        self.replica.write(&fragments::room_browsers(), room_id, &data)?;
        tracing::info!(room = room_id, browser = %browser.id, x = browser.x, y = browser.y, "shared browser");
        Ok(Some(browser))
    }

    /// Renames the organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected by the replica.
    pub fn rename_organization(&self, name: &str) -> OfficeResult<()> {
        self.replica.write(
            &fragments::organization_name(),
            ROOT_ORGANIZATION,
            &json!({ "id": ROOT_ORGANIZATION, "name": name }),
        )?;
        Ok(())
    }

    /// Adds a room named `name` to the organization.
    ///
    /// # Errors
    ///
    /// Returns an error if a write is rejected by the replica.
    pub fn add_room(&self, room_id: &str, name: &str) -> OfficeResult<()> {
        self.replica.write(
            &fragments::room_info(),
            room_id,
            &json!({ "id": room_id, "name": name, "sharedBrowsers": [] }),
        )?;
        // Only ids, so participants of the other rooms are left untouched.
        let mut rooms: Vec<Value> = self
            .rooms()
            .unwrap_or_default()
            .iter()
            .filter(|r| r.id != room_id)
            .map(|r| json!({ "id": r.id }))
            .collect();
        rooms.push(json!({ "id": room_id, "participants": [] }));
        self.replica.write(
            &fragments::organization_rooms(),
            ROOT_ORGANIZATION,
            &json!({ "id": ROOT_ORGANIZATION, "rooms": rooms }),
        )?;
        Ok(())
    }

    /// Adds a private workspace to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if a write is rejected by the replica.
    pub fn add_workspace(&self, workspace_id: &str) -> OfficeResult<()> {
        let mut workspaces: Vec<Value> = self
            .workspaces()
            .iter()
            .filter(|w| w.id != workspace_id)
            .map(|w| json!({ "id": w.id }))
            .collect();
        workspaces.push(json!({ "id": workspace_id, "participants": [] }));
        self.replica.write(
            &fragments::user_workspaces(),
            &self.user_id,
            &json!({ "id": self.user_id, "workspaces": workspaces }),
        )?;
        Ok(())
    }

    /// Watches the organization's name.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be created.
    pub fn watch_organization(&self) -> OfficeResult<Subscription> {
        Ok(self
            .replica
            .subscribe(fragments::organization_name(), ROOT_ORGANIZATION)?)
    }

    /// Watches a room's name and shared browsers.
    ///
    /// # Errors
    ///
    /// Returns an error if `room_id` is not a valid id.
    pub fn watch_room(&self, room_id: &str) -> OfficeResult<Subscription> {
        Ok(self.replica.subscribe(fragments::room_info(), room_id)?)
    }

    /// Watches a note.
    ///
    /// # Errors
    ///
    /// Returns an error if `note_id` is not a valid id.
    pub fn watch_note(&self, note_id: &str) -> OfficeResult<Subscription> {
        Ok(self.replica.subscribe(fragments::note_info(), note_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn office(user: &str) -> Office {
        let office = Office::new(Replica::new(), user);
        office.rename_organization("Leap Office").unwrap();
        office.add_room("lobby", "Lobby").unwrap();
        office.add_room("kitchen", "Kitchen").unwrap();
        office
    }

    fn participants(office: &Office, room: &str) -> Vec<String> {
        let value = office
            .replica()
            .read(&fragments::room_participants(), room)
            .unwrap();
        ids(&value, "participants")
    }

    #[test]
    fn join_moves_between_rooms() {
        let office = office("user-1");
        assert_eq!(office.current_room_id(), None);

        assert_eq!(office.join("lobby").unwrap().as_deref(), Some("lobby"));
        assert_eq!(office.current_room_id().as_deref(), Some("lobby"));
        assert_eq!(participants(&office, "lobby"), ["user-1"]);

        assert_eq!(office.join("kitchen").unwrap().as_deref(), Some("kitchen"));
        assert!(participants(&office, "lobby").is_empty());
        assert_eq!(participants(&office, "kitchen"), ["user-1"]);
    }

    #[test]
    fn join_current_room_is_noop() {
        let office = office("user-1");
        office.join("lobby").unwrap();
        let before = office.replica().snapshot();

        assert_eq!(office.join("lobby").unwrap().as_deref(), Some("lobby"));
        assert_eq!(office.replica().snapshot(), before);
    }

    #[test]
    fn join_keeps_other_participants() {
        let replica = Replica::new();
        let alice = Office::new(replica.clone(), "alice");
        let bob = Office::new(replica, "bob");
        alice.add_room("lobby", "Lobby").unwrap();
        alice.add_room("kitchen", "Kitchen").unwrap();

        alice.join("lobby").unwrap();
        bob.join("lobby").unwrap();
        assert_eq!(participants(&alice, "lobby"), ["alice", "bob"]);

        alice.join("kitchen").unwrap();
        assert_eq!(participants(&alice, "lobby"), ["bob"]);
    }

    #[test]
    fn workspace_is_used_when_no_room_holds_the_user() {
        let office = office("user-1");
        office.add_workspace("desk-1").unwrap();

        assert_eq!(office.join("desk-1").unwrap().as_deref(), Some("desk-1"));
        assert_eq!(office.current_room_id().as_deref(), Some("desk-1"));

        office.join("lobby").unwrap();
        assert_eq!(office.current_room_id().as_deref(), Some("lobby"));
        assert!(participants(&office, "desk-1").is_empty());
    }

    #[test]
    fn join_unknown_target() {
        let office = Office::new(Replica::new(), "user-1");
        assert_eq!(office.join("lobby").unwrap(), None);

        let office = self::office("user-1");
        assert_eq!(office.join("attic").unwrap(), None);
    }

    #[test]
    fn browsers_do_not_overlap() {
        let office = office("user-1");
        let mut rng = StdRng::seed_from_u64(3);

        let first = office.new_browser_with(&mut rng, "lobby", "t-1").unwrap().unwrap();
        let second = office.new_browser_with(&mut rng, "lobby", "t-2").unwrap().unwrap();
        assert_ne!(first.id, second.id);

        let browsers = office.shared_browsers("lobby");
        assert_eq!(browsers, [first.clone(), second.clone()]);
        assert!(!crate::layout::rect_intersects(
            crate::layout::Rect::window(first.position()),
            crate::layout::Rect::window(second.position()),
        ));
    }

    #[test]
    fn new_browser_in_unknown_room() {
        let office = office("user-1");
        assert_eq!(office.new_browser("attic", "t-1").unwrap(), None);
    }

    #[test]
    fn room_watch_sees_browsers() {
        let office = office("user-1");
        let sub = office.watch_room("lobby").unwrap();
        assert!(sub.is_ready());

        let browser = office.new_browser("lobby", "t-1").unwrap().unwrap();
        assert!(sub.has_changed());
        assert_eq!(sub.value().unwrap()["sharedBrowsers"][0]["targetId"], "t-1");
        assert_eq!(sub.value().unwrap()["sharedBrowsers"][0]["id"], browser.id.as_str());
    }

    #[test]
    fn rename() {
        let office = office("user-1");
        let sub = office.watch_organization().unwrap();
        office.rename_organization("ACME Corp").unwrap();
        assert_eq!(sub.value().unwrap()["name"], "ACME Corp");
    }

    #[test]
    fn note_watch_waits_for_all_fields() {
        let office = office("user-1");
        let sub = office.watch_note("n1").unwrap();
        assert!(!sub.is_ready());

        office
            .replica()
            .write(
                &fragments::note_info(),
                "n1",
                &json!({"id": "n1", "x": 1, "y": 2, "width": 200, "height": 100, "content": "hi"}),
            )
            .unwrap();
        assert!(sub.is_ready());
    }
}
