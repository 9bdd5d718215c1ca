//! # Relay Protocol Messages
//!
//! JSON messages exchanged with a relay over the WebSocket transport.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Relay Protocol Messages                            │
//! │                                                                         │
//! │  HANDSHAKE (on every connect)                                          │
//! │  ────────────────────────────                                          │
//! │  CLIENT ───► Hello { workspace, protocol_version, client_id? }          │
//! │  CLIENT ───► SyncState { update }      (full local state, if any)      │
//! │  RELAY  ───► SyncState { update }      first one ⇒ "synced"            │
//! │                                                                         │
//! │  DOCUMENT UPDATES                                                      │
//! │  ────────────────                                                      │
//! │  Both   ◄──► Update { update }                                         │
//! │                                                                         │
//! │  PRESENCE (websocket variant only)                                     │
//! │  ─────────────────────────────────                                     │
//! │  Both   ◄──► Awareness { client_id, state? }                           │
//! │                                                                         │
//! │  KEEPALIVE                                                             │
//! │  ─────────                                                             │
//! │  Both   ◄──► Ping { timestamp } / Pong { timestamp }                   │
//! │                                                                         │
//! │  ERROR                                                                 │
//! │  ─────                                                                 │
//! │  RELAY  ───► Error { code, message }   ⇒ "connection-error"            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Adjacently tagged JSON; update and presence bytes are JSON arrays of
//! octets:
//! ```json
//! { "type": "Update", "payload": { "update": [66, 82, 68, 49] } }
//! ```

use serde::{Deserialize, Serialize};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// All relay protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RelayMessage {
    /// First message on every connection.
    Hello(HelloPayload),

    /// A full document state.
    SyncState(UpdatePayload),

    /// An incremental document update.
    Update(UpdatePayload),

    /// One participant's presence state. `None` means the participant left.
    Awareness(AwarenessPayload),

    Ping { timestamp: String },

    Pong { timestamp: String },

    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub workspace: String,

    pub protocol_version: u32,

    /// Presence client id; only sent by the variant that carries presence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub update: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessPayload {
    pub client_id: u64,

    #[serde(default)]
    pub state: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl RelayMessage {
    /// Returns the message type name (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            RelayMessage::Hello(_) => "Hello",
            RelayMessage::SyncState(_) => "SyncState",
            RelayMessage::Update(_) => "Update",
            RelayMessage::Awareness(_) => "Awareness",
            RelayMessage::Ping { .. } => "Ping",
            RelayMessage::Pong { .. } => "Pong",
            RelayMessage::Error(_) => "Error",
        }
    }

    pub fn hello(workspace: &str, client_id: Option<u64>) -> Self {
        RelayMessage::Hello(HelloPayload {
            workspace: workspace.to_string(),
            protocol_version: PROTOCOL_VERSION,
            client_id,
        })
    }

    pub fn sync_state(update: Vec<u8>) -> Self {
        RelayMessage::SyncState(UpdatePayload { update })
    }

    pub fn update(update: Vec<u8>) -> Self {
        RelayMessage::Update(UpdatePayload { update })
    }

    pub fn awareness(client_id: u64, state: Option<Vec<u8>>) -> Self {
        RelayMessage::Awareness(AwarenessPayload { client_id, state })
    }

    pub fn ping() -> Self {
        RelayMessage::Ping {
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Answers a ping, echoing its timestamp.
    pub fn pong(timestamp: &str) -> Self {
        RelayMessage::Pong {
            timestamp: timestamp.to_string(),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        RelayMessage::Error(ErrorPayload {
            code: code.to_string(),
            message: message.to_string(),
        })
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
