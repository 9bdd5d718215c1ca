//! # braid-sync: Multi-Backend Sync Coordinator
//!
//! Keeps one replicated document synchronized through every enabled
//! channel at once: a durable local cache, a file-backed structured store,
//! and two relay variants.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Coordinator Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │             Coordinator::start(context, options)                 │  │
//! │  │                                                                  │  │
//! │  │  One task per enabled backend kind, all running concurrently.    │  │
//! │  │  Returns a SyncSession holding one completion signal per kind.   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │      ┌──────────────┬─────────┴────────┬──────────────────────┐        │
//! │      ▼              ▼                  ▼                      ▼         │
//! │  ┌──────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐       │
//! │  │ local    │ │ structured   │ │ websocket    │ │ keck         │       │
//! │  │ cache    │ │ store        │ │ relay        │ │ relay        │       │
//! │  │          │ │              │ │ (presence)   │ │              │       │
//! │  │ open     │ │ poll export- │ │ first event  │ │ first event  │       │
//! │  │ → synced │ │ er → import  │ │ settles;     │ │ settles;     │       │
//! │  │          │ │ → open       │ │ every event  │ │ every event  │       │
//! │  │          │ │              │ │ → reporter   │ │ → reporter   │       │
//! │  └──────────┘ └──────────────┘ └──────┬───────┘ └──────┬───────┘       │
//! │                                       └───────┬────────┘                │
//! │                                               ▼                         │
//! │                              ConnectivityReporter (latched)            │
//! │                              connected / retrying                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`coordinator`] - `Coordinator` and the running `SyncSession`
//! - [`context`] / [`options`] - what a session is started with
//! - [`signal`] - one-shot completion signals
//! - [`events`] - provider event pub-sub (first occurrence + every occurrence)
//! - [`reporter`] - latched connectivity sink
//! - [`ticker`] - cancellable poll timer
//! - [`provider`] - backend contracts
//! - [`local`] - SQLite providers for the local backends
//! - [`transport`] / [`protocol`] - WebSocket relay provider and its messages
//! - [`config`] - TOML + environment configuration
//! - [`error`] - sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use braid_sync::{Coordinator, SyncConfig, SyncContext, WebSocketRelay};
//!
//! let config = SyncConfig::load(None)?;
//! let coordinator = Coordinator::builder()
//!     .with_local_cache(Arc::new(SqliteCacheProvider::open_path(config.cache_path()?).await?))
//!     .with_relay(Arc::new(WebSocketRelay::new(config.transport())))
//!     .build();
//!
//! let ctx = SyncContext::builder(document, awareness, config.workspace_id())
//!     .on_connectivity(Arc::new(|state| println!("{state}")))
//!     .build()?;
//!
//! let session = coordinator.start(ctx, config.options()?)?;
//! session.wait_local().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod local;
pub mod options;
pub mod protocol;
pub mod provider;
pub mod reporter;
pub mod signal;
pub mod ticker;
pub mod transport;

mod backends;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::SyncConfig;
pub use context::{SyncContext, SyncContextBuilder};
pub use coordinator::{Coordinator, CoordinatorBuilder, SyncSession};
pub use error::{SyncError, SyncResult};
pub use events::{ProviderEvents, Subscription};
pub use local::{SqliteCacheProvider, SqliteStoreProvider};
pub use options::{ExportDataFn, HasExporterFn, ImportDataFn, SyncOptions};
pub use protocol::RelayMessage;
pub use provider::{
    CacheHandle, LocalCacheProvider, Providers, RelayConnectRequest, RelayConnection,
    RelayProvider, StoreHandle, StructuredStoreProvider,
};
pub use reporter::{ConnectivityListener, ConnectivityReporter};
pub use signal::{CompletionSignal, SignalState};
pub use transport::{TransportConfig, WebSocketRelay};

pub use braid_core::{BackendKind, ConnectivityState, ProviderEvent};
