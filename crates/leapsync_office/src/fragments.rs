//! Fragment catalog of the office data model.
//!
//! The graph has a single `Organization:ROOT` holding rooms. Users hold
//! private workspaces, which are rooms too. Rooms list their participants
//! and the browsers shared in them.

use leapsync_protocol::Fragment;

/// Entity type of the organization.
pub const ORGANIZATION: &str = "Organization";
/// Entity type of users.
pub const USER: &str = "User";
/// Entity type of rooms and workspaces.
pub const ROOM: &str = "Room";
/// Entity type of shared browsers.
pub const SHARED_BROWSER: &str = "SharedBrowser";
/// Entity type of notes.
pub const NOTE: &str = "Note";

/// Id of the one organization.
pub const ROOT_ORGANIZATION: &str = "ROOT";

fn member() -> Fragment {
    Fragment::new("Member", USER).scalar("id")
}

fn room_members() -> Fragment {
    Fragment::new("RoomMembers", ROOM)
        .scalar("id")
        .many("participants", member())
}

fn shared_browser() -> Fragment {
    Fragment::new("SharedBrowserInfo", SHARED_BROWSER).scalars(["id", "targetId", "x", "y"])
}

/// `Organization { id name }`
pub fn organization_name() -> Fragment {
    Fragment::new("Org", ORGANIZATION).scalars(["id", "name"])
}

/// `Organization { id rooms { id participants { id } } }`
pub fn organization_rooms() -> Fragment {
    Fragment::new("OrgRooms", ORGANIZATION)
        .scalar("id")
        .many("rooms", room_members())
}

/// `User { id workspaces { id participants { id } } }`
pub fn user_workspaces() -> Fragment {
    Fragment::new("User", USER)
        .scalar("id")
        .many("workspaces", room_members())
}

/// `Room { id participants { id } }`
pub fn room_participants() -> Fragment {
    room_members()
}

/// `Room { id name sharedBrowsers { id targetId x y } }`
pub fn room_info() -> Fragment {
    Fragment::new("RoomInfo", ROOM)
        .scalars(["id", "name"])
        .many("sharedBrowsers", shared_browser())
}

/// `Room { id sharedBrowsers { id targetId x y } }`
pub fn room_browsers() -> Fragment {
    Fragment::new("RoomBrowsers", ROOM)
        .scalar("id")
        .many("sharedBrowsers", shared_browser())
}

/// `Note { id x y width height content }`
pub fn note_info() -> Fragment {
    Fragment::new("NoteInfo", NOTE).scalars(["id", "x", "y", "width", "height", "content"])
}

/// Every fragment in the catalog.
pub fn catalog() -> Vec<Fragment> {
    vec![
        organization_name(),
        organization_rooms(),
        user_workspaces(),
        room_participants(),
        room_info(),
        room_browsers(),
        note_info(),
    ]
}
