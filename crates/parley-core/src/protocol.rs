//! Wire envelope: `{"type": <kind>, "data": <payload>}` JSON text frames.
//!
//! Outbound frames are built from [`Envelope`]. Inbound frames go through
//! [`Inbound::parse`], which separates three cases the router treats
//! differently: a well-formed kind we understand, a kind we don't (ignored
//! for forward compatibility), and a frame that fails validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::ConnectionId;

/// Kind tag: identity assigned to the receiving peer.
pub const IDENTITY_ASSIGNED: &str = "IDENTITY_ASSIGNED";
/// Kind tag: full roster of live connections.
pub const ROSTER_UPDATE: &str = "ROSTER_UPDATE";
/// Kind tag: directed chat message.
pub const CHAT_MESSAGE: &str = "CHAT_MESSAGE";
/// Older clients tag chat messages with this name; accepted on ingress only.
pub const LEGACY_CHAT_MESSAGE: &str = "MESSAGE";

/// One row of the roster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Connection identity.
    pub id: ConnectionId,
    /// Label supplied by the peer at connect time.
    #[serde(alias = "username")]
    pub display_name: String,
}

/// Chat payload as sent by a client: addressed to one recipient.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DirectMessage {
    /// Recipient; absent means an untargeted (broadcast) message.
    #[serde(default)]
    pub to: Option<ConnectionId>,
    /// Client-supplied ISO-8601 timestamp, relayed verbatim.
    pub timestamp: String,
    /// Opaque message body, relayed verbatim.
    pub content: Value,
}

impl DirectMessage {
    /// Re-stamp for delivery: record the sender, drop the recipient.
    pub fn relay_from(self, from: ConnectionId) -> RelayedMessage {
        RelayedMessage {
            from,
            timestamp: self.timestamp,
            content: self.content,
        }
    }
}

/// Chat payload as delivered to its recipient.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayedMessage {
    /// Sender identity, stamped by the relay.
    pub from: ConnectionId,
    /// Timestamp copied from the sender's payload.
    pub timestamp: String,
    /// Content copied from the sender's payload.
    pub content: Value,
}

/// Server-to-client envelope.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Envelope {
    /// Sent once, before anything else, to a newly registered peer.
    #[serde(rename = "IDENTITY_ASSIGNED")]
    IdentityAssigned(ConnectionId),
    /// Sent to every peer after each membership change.
    #[serde(rename = "ROSTER_UPDATE")]
    RosterUpdate(Vec<RosterEntry>),
    /// A directed message relayed to its recipient.
    #[serde(rename = "CHAT_MESSAGE")]
    ChatMessage(RelayedMessage),
}

impl Envelope {
    /// Kind tag of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IdentityAssigned(_) => IDENTITY_ASSIGNED,
            Self::RosterUpdate(_) => ROSTER_UPDATE,
            Self::ChatMessage(_) => CHAT_MESSAGE,
        }
    }

    /// Serialize to the JSON text frame sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Client-to-server envelope after validation.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A chat message to route.
    Chat(DirectMessage),
    /// A kind this relay does not handle.
    Unknown {
        /// The unrecognised `type` value.
        kind: String,
    },
}

impl Inbound {
    /// Parse and validate an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(ProtocolError::MissingType),
        };
        let data = map.remove("data").unwrap_or(Value::Null);

        if kind == CHAT_MESSAGE || kind == LEGACY_CHAT_MESSAGE {
            serde_json::from_value(data)
                .map(Self::Chat)
                .map_err(|source| ProtocolError::InvalidPayload { kind, source })
        } else {
            Ok(Self::Unknown { kind })
        }
    }
}
