//! # braid-core: Shared Vocabulary for Braid
//!
//! This crate holds the types every other Braid crate speaks in. It has zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Braid Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Host application (web / desktop)               │   │
//! │  │        edits the document, renders connectivity status          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 braid-sync (Coordinator)                        │   │
//! │  │   local-cache │ structured-store │ websocket │ keck             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ braid-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌────────────┐                │   │
//! │  │   │   types   │  │  document  │  │ validation │                │   │
//! │  │   │BackendKind│  │  Document  │  │ workspace  │                │   │
//! │  │   │Connectivty│  │  Awareness │  │ address    │                │   │
//! │  │   └───────────┘  └────────────┘  └────────────┘                │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Backend kinds, connectivity states, provider events
//! - [`document`] - Replicated document and presence collaborator traits
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use braid_core::types::{BackendKind, ProviderEvent, ConnectivityState};
//!
//! let kind: BackendKind = "ws".parse().unwrap();
//! assert_eq!(kind, BackendKind::Websocket);
//! assert!(kind.is_relay());
//!
//! assert_eq!(ProviderEvent::LostConnection.connectivity(), ConnectivityState::Retrying);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod document;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use document::{
    Awareness, Document, MemoryAwareness, MemoryDocument, ObserverId, SharedAwareness,
    SharedDocument, UpdateObserver,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::{BackendKind, ConnectivityState, ProviderEvent};

// =============================================================================
// Constants
// =============================================================================

/// Maximum length of a workspace identifier.
pub const MAX_WORKSPACE_ID_LEN: usize = 128;

/// Origin tag used for updates produced by the host application itself.
pub const LOCAL_ORIGIN: &str = "local";
