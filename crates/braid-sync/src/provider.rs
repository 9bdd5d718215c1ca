//! # Provider Contracts
//!
//! The seams between the coordinator and the concrete backends. Each
//! backend kind is run through one provider trait; the coordinator only
//! ever sees these contracts.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Kind              Provider                    Handle / result          │
//! │  ────────────────  ──────────────────────────  ──────────────────────── │
//! │  local-cache       LocalCacheProvider::open    CacheHandle::when_synced │
//! │  structured-store  StructuredStoreProvider     StoreHandle              │
//! │                      ::open(.., initial)         register_exporter      │
//! │                                                  when_synced            │
//! │  websocket / keck  RelayProvider::connect      RelayConnection guard    │
//! │                      (request, events)           + ProviderEvents       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Async methods return [`BoxFuture`] so the traits stay object safe.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use braid_core::{BackendKind, SharedAwareness, SharedDocument};

use crate::error::SyncResult;
use crate::events::ProviderEvents;
use crate::options::ExportDataFn;

// =============================================================================
// Local Backends
// =============================================================================

/// An open local cache bound to the document.
pub trait CacheHandle: Send + Sync {
    /// Resolves once the cached contents have been applied to the document.
    fn when_synced(&self) -> BoxFuture<'_, SyncResult<()>>;
}

pub trait LocalCacheProvider: Send + Sync {
    fn open<'a>(
        &'a self,
        workspace: &'a str,
        document: SharedDocument,
    ) -> BoxFuture<'a, SyncResult<Box<dyn CacheHandle>>>;
}

/// An open structured store bound to the document.
pub trait StoreHandle: Send + Sync {
    /// Installs the sink that persists the serialized store.
    fn register_exporter(&self, exporter: ExportDataFn);

    /// Resolves once the store's contents have been applied to the document.
    fn when_synced(&self) -> BoxFuture<'_, SyncResult<()>>;
}

pub trait StructuredStoreProvider: Send + Sync {
    /// Opens the store, initialised from `initial` when present.
    fn open<'a>(
        &'a self,
        workspace: &'a str,
        document: SharedDocument,
        initial: Option<Vec<u8>>,
    ) -> BoxFuture<'a, SyncResult<Box<dyn StoreHandle>>>;
}

// =============================================================================
// Relay Backends
// =============================================================================

/// Everything a relay connection is bound to.
#[derive(Clone)]
pub struct RelayConnectRequest {
    /// Which relay variant is being connected.
    pub variant: BackendKind,
    pub token: String,
    pub address: String,
    pub workspace: String,
    pub document: SharedDocument,
    /// Present only for the variant that carries presence.
    pub awareness: Option<SharedAwareness>,
    pub params: BTreeMap<String, String>,
}

impl std::fmt::Debug for RelayConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConnectRequest")
            .field("variant", &self.variant)
            .field("address", &self.address)
            .field("workspace", &self.workspace)
            .field("awareness", &self.awareness.is_some())
            .field("params", &self.params)
            .finish()
    }
}

/// Keeps a relay connection alive. Dropping it stops the connection.
#[derive(Debug)]
pub struct RelayConnection {
    _stop: Option<oneshot::Sender<()>>,
}

impl RelayConnection {
    /// Guard whose drop resolves `stop`'s receiver.
    pub fn new(stop: oneshot::Sender<()>) -> Self {
        RelayConnection { _stop: Some(stop) }
    }

    /// Guard for connections with nothing to stop.
    pub fn detached() -> Self {
        RelayConnection { _stop: None }
    }
}

pub trait RelayProvider: Send + Sync {
    /// Starts a connection that reports its lifecycle through `events`.
    ///
    /// Must not block: the connection runs in the background and the
    /// returned guard owns it.
    fn connect(
        &self,
        request: RelayConnectRequest,
        events: ProviderEvents,
    ) -> SyncResult<RelayConnection>;
}

// =============================================================================
// Provider Bundle
// =============================================================================

/// The providers available to a coordinator, one slot per kind.
#[derive(Clone, Default)]
pub struct Providers {
    pub local_cache: Option<Arc<dyn LocalCacheProvider>>,
    pub structured_store: Option<Arc<dyn StructuredStoreProvider>>,
    pub websocket: Option<Arc<dyn RelayProvider>>,
    pub keck: Option<Arc<dyn RelayProvider>>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(BackendKind::ALL.iter().filter(|k| self.supports(**k)))
            .finish()
    }
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_cache(mut self, provider: Arc<dyn LocalCacheProvider>) -> Self {
        self.local_cache = Some(provider);
        self
    }

    pub fn with_structured_store(mut self, provider: Arc<dyn StructuredStoreProvider>) -> Self {
        self.structured_store = Some(provider);
        self
    }

    pub fn with_websocket(mut self, provider: Arc<dyn RelayProvider>) -> Self {
        self.websocket = Some(provider);
        self
    }

    pub fn with_keck(mut self, provider: Arc<dyn RelayProvider>) -> Self {
        self.keck = Some(provider);
        self
    }

    /// Registers one provider for both relay variants.
    pub fn with_relay(self, provider: Arc<dyn RelayProvider>) -> Self {
        self.with_websocket(provider.clone()).with_keck(provider)
    }

    /// The relay provider for a relay kind.
    pub fn relay(&self, kind: BackendKind) -> Option<Arc<dyn RelayProvider>> {
        match kind {
            BackendKind::Websocket => self.websocket.clone(),
            BackendKind::Keck => self.keck.clone(),
            _ => None,
        }
    }

    /// Returns true if a provider is registered for `kind`.
    pub fn supports(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::LocalCache => self.local_cache.is_some(),
            BackendKind::StructuredStore => self.structured_store.is_some(),
            BackendKind::Websocket => self.websocket.is_some(),
            BackendKind::Keck => self.keck.is_some(),
        }
    }
}
