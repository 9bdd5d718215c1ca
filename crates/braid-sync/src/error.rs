//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Session      │  │     Backend             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  SessionActive  │  │  BackendFailed          │ │
//! │  │  MissingBackend │  │  Provider       │  │  Cancelled              │ │
//! │  │  Address        │  │  Unavailable    │  │  ExportFailed           │ │
//! │  │  InvalidUrl     │  │  NoRuntime      │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Transport     │  │    Protocol     │  │    Storage              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Connection     │  │  RelayError     │  │  DatabaseError          │ │
//! │  │  Disconnected   │  │  Serialization  │  │  DocumentError          │ │
//! │  │  Timeout        │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A backend failure never becomes an error of the whole session: it only
//! rejects that backend's completion signal, which surfaces here as
//! [`SyncError::BackendFailed`] when the caller awaits it.

use thiserror::Error;

use braid_core::{BackendKind, CoreError, ValidationError};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// A relay backend is enabled but no backend address was given.
    #[error("A relay backend is enabled but no backend address is configured")]
    MissingBackendAddress,

    /// Invalid relay URL.
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// A session for this workspace is still running.
    #[error("A sync session is already active for workspace '{0}'")]
    SessionActive(String),

    /// A backend kind was enabled without a provider to run it.
    #[error("No provider registered for backend {0}")]
    ProviderUnavailable(BackendKind),

    /// `start` was called outside a Tokio runtime.
    #[error("Sync sessions must be started inside a Tokio runtime")]
    NoRuntime,

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// A backend's completion signal was rejected.
    #[error("Backend {backend} failed: {reason}")]
    BackendFailed { backend: BackendKind, reason: String },

    /// The backend task was torn down before its signal settled.
    #[error("Backend {0} was cancelled before completing")]
    Cancelled(BackendKind),

    /// The host exporter rejected a structured store export.
    #[error("Export failed: {0}")]
    ExportFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish WebSocket connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket disconnected unexpectedly.
    #[error("Disconnected from relay")]
    Disconnected,

    /// Connection timeout.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// The relay reported an error.
    #[error("Relay error {code}: {message}")]
    RelayError { code: String, message: String },

    /// Failed to serialize message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The document rejected an update.
    #[error("Document error: {0}")]
    DocumentError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<braid_db::DbError> for SyncError {
    fn from(err: braid_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => SyncError::Validation(e),
            CoreError::UnknownBackend(name) => {
                SyncError::InvalidConfig(format!("unknown backend '{}'", name))
            }
            other => SyncError::DocumentError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => SyncError::Disconnected,
            WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Protocol(p) => SyncError::WebSocketError(p.to_string()),
            WsError::Io(io) => SyncError::ConnectionFailed(io.to_string()),
            WsError::Tls(tls) => SyncError::TlsError(tls.to_string()),
            other => SyncError::WebSocketError(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and a later attempt may succeed.
    ///
    /// The relay transport stops reconnecting after a connect failure that
    /// is not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Disconnected
                | SyncError::Timeout(_)
                | SyncError::WebSocketError(_)
                | SyncError::ExportFailed(_)
        )
    }

    /// The backend this error belongs to, if any.
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            SyncError::BackendFailed { backend, .. } => Some(*backend),
            SyncError::Cancelled(kind) | SyncError::ProviderUnavailable(kind) => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Disconnected.is_retryable());
        assert!(SyncError::Timeout(10).is_retryable());

        assert!(!SyncError::MissingBackendAddress.is_retryable());
        assert!(!SyncError::Cancelled(BackendKind::Keck).is_retryable());
    }

    #[test]
    fn test_relay_error_display() {
        let err = SyncError::RelayError {
            code: "UNAUTHORIZED".into(),
            message: "bad token".into(),
        };
        assert_eq!(err.to_string(), "Relay error UNAUTHORIZED: bad token");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_backend_failed_display() {
        let err = SyncError::BackendFailed {
            backend: BackendKind::Websocket,
            reason: "relay reported connection-error".into(),
        };
        assert!(err.to_string().contains("websocket"));
        assert_eq!(err.backend(), Some(BackendKind::Websocket));
    }

    #[test]
    fn test_core_error_conversion() {
        let err: SyncError = CoreError::UnknownBackend("pigeon".into()).into();
        assert!(matches!(err, SyncError::InvalidConfig(_)));

        let err: SyncError = CoreError::InvalidUpdate("empty".into()).into();
        assert!(matches!(err, SyncError::DocumentError(_)));
    }
}
