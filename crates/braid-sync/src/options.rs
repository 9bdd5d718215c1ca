//! # Session Options
//!
//! What a sync session runs and how the structured store is hooked up to
//! the host.
//!
//! ## Example
//! ```rust,ignore
//! let options = SyncOptions::new()
//!     .enable(BackendKind::LocalCache)
//!     .enable(BackendKind::Websocket)
//!     .backend_address("wss://relay.example.com")
//!     .param("room", "blue")
//!     .has_exporter(|| true)
//!     .import_data(|| async { None });
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use braid_core::validation::validate_relay_address;
use braid_core::{BackendKind, ValidationError};

use crate::error::{SyncError, SyncResult};

/// Interval between `has_exporter` polls.
pub const DEFAULT_EXPORTER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Predicate: is a persistence target for the structured store available?
pub type HasExporterFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Produces the bytes the structured store is initialised from, if any.
pub type ImportDataFn = Arc<dyn Fn() -> BoxFuture<'static, Option<Vec<u8>>> + Send + Sync>;

/// Persists a serialized structured store.
pub type ExportDataFn = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, SyncResult<()>> + Send + Sync>;

/// Options for one sync session.
#[derive(Clone)]
pub struct SyncOptions {
    /// Backend kinds to run. Order is irrelevant; all run concurrently.
    pub enabled: BTreeSet<BackendKind>,

    /// Relay endpoint. Required when a relay kind is enabled.
    pub backend_address: Option<String>,

    /// Passed through to the relay backends unchanged.
    pub params: BTreeMap<String, String>,

    /// Structured-store import hook.
    pub import_data: Option<ImportDataFn>,

    /// Structured-store export hook.
    pub export_data: Option<ExportDataFn>,

    /// Structured-store exporter availability predicate.
    pub has_exporter: Option<HasExporterFn>,

    /// Interval between exporter availability polls.
    /// Default: 500ms
    pub exporter_poll_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            enabled: BTreeSet::new(),
            backend_address: None,
            params: BTreeMap::new(),
            import_data: None,
            export_data: None,
            has_exporter: None,
            exporter_poll_interval: DEFAULT_EXPORTER_POLL_INTERVAL,
        }
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("enabled", &self.enabled)
            .field("backend_address", &self.backend_address)
            .field("params", &self.params)
            .field("import_data", &self.import_data.is_some())
            .field("export_data", &self.export_data.is_some())
            .field("has_exporter", &self.has_exporter.is_some())
            .field("exporter_poll_interval", &self.exporter_poll_interval)
            .finish()
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables one backend kind.
    pub fn enable(mut self, kind: BackendKind) -> Self {
        self.enabled.insert(kind);
        self
    }

    /// Replaces the enabled set.
    pub fn with_enabled(mut self, kinds: impl IntoIterator<Item = BackendKind>) -> Self {
        self.enabled = kinds.into_iter().collect();
        self
    }

    pub fn backend_address(mut self, address: impl Into<String>) -> Self {
        self.backend_address = Some(address.into());
        self
    }

    /// Adds one relay parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn import_data<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Vec<u8>>> + Send + 'static,
    {
        self.import_data = Some(Arc::new(move || hook().boxed()));
        self
    }

    pub fn export_data<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<()>> + Send + 'static,
    {
        self.export_data = Some(Arc::new(move |bytes| hook(bytes).boxed()));
        self
    }

    pub fn has_exporter<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.has_exporter = Some(Arc::new(predicate));
        self
    }

    pub fn exporter_poll_interval(mut self, interval: Duration) -> Self {
        self.exporter_poll_interval = interval;
        self
    }

    /// Returns true if `kind` will get a task.
    pub fn is_enabled(&self, kind: BackendKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Returns true if any relay kind is enabled.
    pub fn has_relay(&self) -> bool {
        self.enabled.iter().any(BackendKind::is_relay)
    }

    /// Checks the options before a session starts.
    ///
    /// ## Rules
    /// - A relay kind requires `backend_address`, as a `ws://` or `wss://` URL
    /// - Without a relay kind the address is opaque and not checked
    /// - The exporter poll interval must be non-zero
    pub fn validate(&self) -> SyncResult<()> {
        if self.has_relay() {
            let address = self
                .backend_address
                .as_deref()
                .ok_or(SyncError::MissingBackendAddress)?;
            validate_relay_address(address).map_err(|e| match e {
                ValidationError::Required { .. } => SyncError::MissingBackendAddress,
                other => SyncError::InvalidUrl(other.to_string()),
            })?;
        }

        if self.exporter_poll_interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "exporter_poll_interval must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
