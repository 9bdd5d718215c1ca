//! # Sync Configuration
//!
//! File and environment configuration for hosts that run the coordinator
//! from settings rather than code.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BRAID_WORKSPACE=notes                                              │
//! │     BRAID_BACKENDS=local-cache,websocket                               │
//! │     BRAID_BACKEND_ADDRESS=wss://relay.example.com                      │
//! │     BRAID_TOKEN=...                                                    │
//! │     BRAID_CACHE_PATH=/var/lib/braid/cache.sqlite                       │
//! │     BRAID_STORE_DIR=/var/lib/braid/stores                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/braid/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/dev.braid.braid/sync.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     workspace "default", local-cache only                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [workspace]
//! id = "notes"
//!
//! [backends]
//! enabled = ["local-cache", "structured-store", "websocket"]
//!
//! [store]
//! poll_interval_ms = 500
//!
//! [relay]
//! address = "wss://relay.example.com"
//! params = { room = "blue" }
//!
//! [auth]
//! token = "..."
//! ```
//!
//! The hooks of [`SyncOptions`] cannot come from a file; the host adds them
//! to the options returned by [`SyncConfig::options`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use braid_core::validation::validate_workspace_id;
use braid_core::BackendKind;

use crate::error::{SyncError, SyncResult};
use crate::options::SyncOptions;
use crate::transport::TransportConfig;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    /// Workspace (document) identifier.
    #[serde(default = "default_workspace_id")]
    pub id: String,
}

fn default_workspace_id() -> String {
    "default".to_string()
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        WorkspaceSettings {
            id: default_workspace_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Backend kinds to run, by name or alias (`idb`, `sqlite`, `ws`).
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
}

fn default_enabled() -> Vec<String> {
    vec![BackendKind::LocalCache.as_str().to_string()]
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            enabled: default_enabled(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Device cache database. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Directory of structured-store files. Defaults to the platform data
    /// directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Interval between exporter availability polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    500
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            dir: None,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Relay endpoint (`ws://` or `wss://`).
    #[serde(default)]
    pub address: Option<String>,

    /// Extra query parameters passed to both relay variants.
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Maximum consecutive failed connections before giving up.
    /// Set to 0 for infinite retries.
    #[serde(default)]
    pub max_retries: u32,

    /// Keepalive ping interval (seconds).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_ping_interval() -> u64 {
    30
}

impl Default for RelaySettings {
    fn default() -> Self {
        RelaySettings {
            address: None,
            params: BTreeMap::new(),
            connect_timeout_secs: default_connect_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_retries: 0,
            ping_interval_secs: default_ping_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Relay token. Relays are skipped without one.
    #[serde(default)]
    pub token: Option<String>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub workspace: WorkspaceSettings,

    #[serde(default)]
    pub backends: BackendSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub auth: AuthSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                config = read_config_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        validate_workspace_id(&self.workspace.id)?;

        if self.store.poll_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "store.poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.relay.connect_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "relay.connect_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.relay.ping_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "relay.ping_interval_secs must be greater than 0".into(),
            ));
        }

        self.options()?.validate()
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("BRAID_WORKSPACE") {
            debug!(workspace = %id, "Overriding workspace from environment");
            self.workspace.id = id;
        }

        if let Ok(backends) = std::env::var("BRAID_BACKENDS") {
            debug!(backends = %backends, "Overriding enabled backends from environment");
            self.backends.enabled = backends
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(address) = std::env::var("BRAID_BACKEND_ADDRESS") {
            debug!(address = %address, "Overriding backend address from environment");
            self.relay.address = Some(address);
        }

        if let Ok(token) = std::env::var("BRAID_TOKEN") {
            self.auth.token = Some(token);
        }

        if let Ok(path) = std::env::var("BRAID_CACHE_PATH") {
            self.cache.path = Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("BRAID_STORE_DIR") {
            self.store.dir = Some(PathBuf::from(dir));
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "braid", "braid")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "braid", "braid")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn workspace_id(&self) -> &str {
        &self.workspace.id
    }

    /// Non-empty relay token, if configured.
    pub fn token(&self) -> Option<&str> {
        self.auth.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Parses the enabled backend names.
    pub fn enabled_kinds(&self) -> SyncResult<BTreeSet<BackendKind>> {
        self.backends
            .enabled
            .iter()
            .map(|name| name.parse::<BackendKind>().map_err(SyncError::from))
            .collect()
    }

    /// Device cache database path.
    pub fn cache_path(&self) -> SyncResult<PathBuf> {
        self.cache
            .path
            .clone()
            .or_else(|| Self::data_dir().map(|dir| dir.join("cache.sqlite")))
            .ok_or_else(|| SyncError::InvalidConfig("No cache path available".into()))
    }

    /// Structured-store directory.
    pub fn store_dir(&self) -> SyncResult<PathBuf> {
        self.store
            .dir
            .clone()
            .or_else(|| Self::data_dir().map(|dir| dir.join("stores")))
            .ok_or_else(|| SyncError::InvalidConfig("No store directory available".into()))
    }

    /// Session options without hooks.
    pub fn options(&self) -> SyncResult<SyncOptions> {
        let mut options = SyncOptions::new()
            .with_enabled(self.enabled_kinds()?)
            .params(self.relay.params.clone())
            .exporter_poll_interval(Duration::from_millis(self.store.poll_interval_ms));

        if let Some(address) = &self.relay.address {
            options = options.backend_address(address.clone());
        }

        Ok(options)
    }

    /// Relay transport settings.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.relay.connect_timeout_secs),
            initial_backoff: Duration::from_millis(self.relay.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.relay.max_backoff_secs),
            max_retries: self.relay.max_retries,
            ping_interval: Duration::from_secs(self.relay.ping_interval_secs),
            ..Default::default()
        }
    }
}

/// Reads a config file without environment overrides.
fn read_config_file(path: &Path) -> SyncResult<SyncConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
    Ok(toml::from_str(&contents)?)
}
