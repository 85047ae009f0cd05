//! Wire messages exchanged over the persistent channel.
//!
//! Every frame is a JSON object tagged by its `"event"` field. The two
//! directions use distinct enums because `init` means "request a snapshot"
//! from a replica and "here is the snapshot" from the relay.

use crate::error::{ProtocolError, ProtocolResult};
use crate::fragment::Fragment;
use crate::key::EntityKey;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One fragment-scoped write to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// Shape scoping the write.
    pub fragment: Fragment,
    /// Target entity.
    pub key: EntityKey,
    /// Partial entity data.
    pub data: Value,
}

impl ChangeMessage {
    /// Creates a change message.
    pub fn new(fragment: Fragment, key: EntityKey, data: Value) -> Self {
        Self {
            fragment,
            key,
            data,
        }
    }

    /// Checks the message is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns an error if the fragment is invalid, the key's type differs
    /// from the fragment's type condition, or the data is not an object.
    pub fn validate(&self) -> ProtocolResult<()> {
        self.fragment.validate()?;
        if self.key.type_name() != self.fragment.type_name() {
            return Err(ProtocolError::malformed(format!(
                "key {} does not match fragment type {}",
                self.key,
                self.fragment.type_name()
            )));
        }
        if !self.data.is_object() {
            return Err(ProtocolError::malformed("change data must be an object"));
        }
        Ok(())
    }
}

/// Messages sent by a replica to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Request for the full snapshot.
    Init,
    /// A local write to propagate.
    Change(ChangeMessage),
    /// Request that the relay wipe its store.
    Reset,
    /// Seeding after a reset has finished.
    SeedDone,
}

/// Messages sent by the relay to replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RelayMessage {
    /// Hydrate reply carrying the full snapshot.
    Init {
        /// Authoritative store contents.
        snapshot: Snapshot,
    },
    /// A write made by another replica.
    Change(ChangeMessage),
    /// Acknowledges one `change` from this replica, in send order.
    Ack,
    /// Populate canonical baseline data.
    Seed,
    /// Discard local state and restart the session.
    Reload,
}

impl ClientMessage {
    /// Returns the wire event name.
    pub fn event(&self) -> &'static str {
        match self {
            ClientMessage::Init => "init",
            ClientMessage::Change(_) => "change",
            ClientMessage::Reset => "reset",
            ClientMessage::SeedDone => "seed-done",
        }
    }

    /// Encodes to a JSON text frame.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from a JSON text frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl RelayMessage {
    /// Returns the wire event name.
    pub fn event(&self) -> &'static str {
        match self {
            RelayMessage::Init { .. } => "init",
            RelayMessage::Change(_) => "change",
            RelayMessage::Ack => "ack",
            RelayMessage::Seed => "seed",
            RelayMessage::Reload => "reload",
        }
    }

    /// Encodes to a JSON text frame.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from a JSON text frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
