//! # LeapSync Office
//!
//! Virtual office logic built on a LeapSync [`Replica`](leapsync_client::Replica).
//!
//! This crate provides:
//! - The fragment catalog of the office data model
//! - [`Office`]: joining rooms and workspaces, sharing browsers, renaming
//!   the organization
//! - Board layout for shared browser windows
//! - Baseline seeding and the reset/reseed cycle
//!
//! Everything here goes through replica reads and writes, so every change
//! reaches the other replicas the usual way.
//!
//! ## Example
//!
//! ```rust,no_run
//! use leapsync_client::{ClientConfig, Replica};
//! use leapsync_office::{Office, Seeder};
//!
//! # async fn run() -> leapsync_office::OfficeResult<()> {
//! let replica = Replica::new();
//! let _session = replica.connect(&ClientConfig::default());
//! let _seeder = Seeder::spawn(replica.clone());
//!
//! let office = Office::new(replica, "user-1");
//! if let Some(room) = office.join("lobby")? {
//!     office.new_browser(&room, "target-1")?;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
pub mod fragments;
pub mod layout;
mod office;
mod seed;

pub use error::{OfficeError, OfficeResult};
pub use layout::{pick_random_position, rect_intersects, Position, Rect};
pub use office::{Office, SharedBrowser};
pub use seed::{reset_and_reseed, seed_baseline, Seeder, DEFAULT_ORGANIZATION_NAME};
