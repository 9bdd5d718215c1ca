//! # braid
//!
//! Runs one sync session for the configured workspace until interrupted.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. tracing subscriber (RUST_LOG, default "info")                       │
//! │  2. SyncConfig::load(path from argv[1] or the platform config dir)      │
//! │  3. providers: SQLite cache, SQLite structured store, WebSocket relay   │
//! │  4. Coordinator::start ─► wait for the local backends                   │
//! │  5. log connectivity changes until Ctrl+C / SIGTERM                     │
//! │  6. session.shutdown()                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The structured store exports its image to `{store_dir}/{workspace}.snapshot`
//! and is re-imported from there on the next start.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use braid_core::{BackendKind, ConnectivityState, MemoryAwareness, MemoryDocument};
use braid_sync::{
    Coordinator, SqliteCacheProvider, SqliteStoreProvider, SyncConfig, SyncContext, SyncError,
    SyncOptions, WebSocketRelay,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SyncConfig::load(config_path).context("loading sync configuration")?;
    info!(workspace = %config.workspace_id(), "Configuration loaded");

    let options = config.options()?;
    let coordinator = build_coordinator(&config, &options).await?;

    let document = MemoryDocument::shared();
    let awareness = Arc::new(MemoryAwareness::new(std::process::id() as u64));

    let mut builder = SyncContext::builder(document.clone(), awareness, config.workspace_id())
        .on_connectivity(Arc::new(|state: ConnectivityState| {
            info!(state = %state, "Connectivity changed")
        }));
    if let Some(token) = config.token() {
        builder = builder.token(token);
    }
    let ctx = builder.build()?;

    let options = with_snapshot_hooks(options, snapshot_path(&config)?);
    let session = coordinator.start(ctx, options)?;

    match session.wait_local().await {
        Ok(()) => info!(updates = document.len(), "Local backends ready"),
        Err(e) => warn!(backend = ?e.backend(), error = %e, "A local backend failed"),
    }

    shutdown_signal().await;
    session.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Registers a provider for every enabled kind.
async fn build_coordinator(
    config: &SyncConfig,
    options: &SyncOptions,
) -> anyhow::Result<Coordinator> {
    let mut builder = Coordinator::builder();

    if options.is_enabled(BackendKind::LocalCache) {
        let path = config.cache_path()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let provider = SqliteCacheProvider::open_path(&path)
            .await
            .with_context(|| format!("opening cache at {}", path.display()))?;
        builder = builder.with_local_cache(Arc::new(provider));
    }

    if options.is_enabled(BackendKind::StructuredStore) {
        let provider = SqliteStoreProvider::new(config.store_dir()?);
        builder = builder.with_structured_store(Arc::new(provider));
    }

    if options.has_relay() {
        builder = builder.with_relay(Arc::new(WebSocketRelay::new(config.transport())));
    }

    Ok(builder.build())
}

fn snapshot_path(config: &SyncConfig) -> anyhow::Result<PathBuf> {
    Ok(config
        .store_dir()?
        .join(format!("{}.snapshot", config.workspace_id())))
}

/// Import from and export to a snapshot file next to the store.
fn with_snapshot_hooks(options: SyncOptions, snapshot: PathBuf) -> SyncOptions {
    let import_from = snapshot.clone();
    let export_to = snapshot;

    options
        .has_exporter(|| true)
        .import_data(move || {
            let path = import_from.clone();
            async move { tokio::fs::read(&path).await.ok() }
        })
        .export_data(move |bytes| {
            let path = export_to.clone();
            async move {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| SyncError::ExportFailed(e.to_string()))?;
                }
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|e| SyncError::ExportFailed(format!("{}: {}", path.display(), e)))
            }
        })
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping sync session...");
}
