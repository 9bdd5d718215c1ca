//! # Error Types
//!
//! Domain-specific error types for braid-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  braid-core errors (this file)                                         │
//! │  ├── CoreError        - Document and vocabulary errors                 │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  braid-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  braid-sync errors (separate crate)                                    │
//! │  └── SyncError        - Coordinator, backend and transport failures    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError / SyncError → Host        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised by the shared vocabulary and the document collaborators.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A backend name did not match any known kind.
    #[error("Unknown backend: '{0}'. Valid options: local-cache, structured-store, websocket, keck")]
    UnknownBackend(String),

    /// A document update could not be applied.
    ///
    /// ## When This Occurs
    /// - Empty update payload
    /// - Truncated state bundle
    #[error("Invalid document update: {0}")]
    InvalidUpdate(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before a session starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., bad URL scheme, illegal characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
