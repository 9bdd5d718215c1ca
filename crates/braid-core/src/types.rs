//! # Domain Types
//!
//! The closed vocabularies the Coordinator works with.
//!
//! ## Event → Connectivity Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Relay provider event mapping                           │
//! │                                                                         │
//! │   ProviderEvent        first occurrence        every occurrence         │
//! │   ─────────────        ────────────────        ────────────────         │
//! │   synced           ──► resolve signal     ──►  Connected                │
//! │   lost-connection  ──► resolve signal     ──►  Retrying                 │
//! │   connection-error ──► reject signal      ──►  Retrying                 │
//! │                                                                         │
//! │   There is no "disconnected" value: until the first emission the       │
//! │   connectivity of a session is unknown (None).                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Backend Kind
// =============================================================================

/// The synchronization channels a session can enable.
///
/// The declaration order is the Coordinator's fixed iteration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum BackendKind {
    /// Local durable cache (the browser's IndexedDB in the web host).
    LocalCache,

    /// Local structured store backed by an exportable SQLite image.
    StructuredStore,

    /// Relay protocol carrying document updates and presence.
    Websocket,

    /// Relay protocol carrying document updates only.
    Keck,
}

impl BackendKind {
    /// Every kind, in the Coordinator's iteration order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::LocalCache,
        BackendKind::StructuredStore,
        BackendKind::Websocket,
        BackendKind::Keck,
    ];

    /// Returns true for the two remote relay kinds.
    pub fn is_relay(&self) -> bool {
        matches!(self, BackendKind::Websocket | BackendKind::Keck)
    }

    /// Returns true for the two on-device kinds.
    pub fn is_local(&self) -> bool {
        !self.is_relay()
    }

    /// Returns true if the relay connection is bound to the presence handle.
    pub fn carries_presence(&self) -> bool {
        matches!(self, BackendKind::Websocket)
    }

    /// Stable kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalCache => "local-cache",
            BackendKind::StructuredStore => "structured-store",
            BackendKind::Websocket => "websocket",
            BackendKind::Keck => "keck",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local-cache" | "idb" | "indexeddb" => Ok(BackendKind::LocalCache),
            "structured-store" | "sqlite" => Ok(BackendKind::StructuredStore),
            "websocket" | "ws" => Ok(BackendKind::Websocket),
            "keck" => Ok(BackendKind::Keck),
            other => Err(CoreError::UnknownBackend(other.to_string())),
        }
    }
}

// =============================================================================
// Connectivity State
// =============================================================================

/// Aggregated health of the remote channels, as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ConnectivityState {
    /// A relay reached (or re-reached) synchronization.
    Connected,

    /// A relay lost its connection or failed to connect and is reconnecting.
    Retrying,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Connected => write!(f, "connected"),
            ConnectivityState::Retrying => write!(f, "retrying"),
        }
    }
}

// =============================================================================
// Provider Event
// =============================================================================

/// Lifecycle events emitted by relay connections.
///
/// Local backends have no event stream; they settle a single completion
/// signal instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderEvent {
    /// Initial (or renewed) synchronization with the relay completed.
    Synced,

    /// An established connection dropped.
    LostConnection,

    /// A connection attempt failed or the relay reported an error.
    ConnectionError,
}

impl ProviderEvent {
    /// Every event name.
    pub const ALL: [ProviderEvent; 3] = [
        ProviderEvent::Synced,
        ProviderEvent::LostConnection,
        ProviderEvent::ConnectionError,
    ];

    /// The connectivity value the persistent listener reports for this event.
    pub fn connectivity(&self) -> ConnectivityState {
        match self {
            ProviderEvent::Synced => ConnectivityState::Connected,
            ProviderEvent::LostConnection | ProviderEvent::ConnectionError => {
                ConnectivityState::Retrying
            }
        }
    }

    /// Whether this event, seen first, resolves (rather than rejects) the
    /// relay's completion signal.
    pub fn resolves_first_sync(&self) -> bool {
        !matches!(self, ProviderEvent::ConnectionError)
    }

    /// Event name as used on the wire and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEvent::Synced => "synced",
            ProviderEvent::LostConnection => "lost-connection",
            ProviderEvent::ConnectionError => "connection-error",
        }
    }
}

impl std::fmt::Display for ProviderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
