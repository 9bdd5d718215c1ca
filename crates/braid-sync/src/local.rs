//! # SQLite Providers
//!
//! The production local backends, built on `braid-db`.
//!
//! ```text
//! ┌──────────────────────┬───────────────────────────────────────────────────┐
//! │ SqliteCacheProvider  │ one device database, one update log per workspace │
//! │ SqliteStoreProvider  │ one SQLite file per workspace under a directory;  │
//! │                      │ the file image is what import/export moves        │
//! └──────────────────────┴───────────────────────────────────────────────────┘
//! ```
//!
//! Both stores replay their log before `open` returns, so their
//! `when_synced` futures are already complete.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use braid_core::SharedDocument;
use braid_db::{Database, DbConfig, DocumentCache, StructuredStore};

use crate::error::{SyncError, SyncResult};
use crate::options::ExportDataFn;
use crate::provider::{CacheHandle, LocalCacheProvider, StoreHandle, StructuredStoreProvider};

// =============================================================================
// Local Cache
// =============================================================================

/// Local-cache provider backed by a device database.
#[derive(Debug, Clone)]
pub struct SqliteCacheProvider {
    db: Database,
}

impl SqliteCacheProvider {
    pub fn new(db: Database) -> Self {
        SqliteCacheProvider { db }
    }

    /// Opens (or creates) the device database at `path`.
    pub async fn open_path(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let db = Database::new(DbConfig::new(path)).await?;
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl CacheHandle for DocumentCache {
    fn when_synced(&self) -> BoxFuture<'_, SyncResult<()>> {
        futures_util::future::ready(Ok(())).boxed()
    }
}

impl LocalCacheProvider for SqliteCacheProvider {
    fn open<'a>(
        &'a self,
        workspace: &'a str,
        document: SharedDocument,
    ) -> BoxFuture<'a, SyncResult<Box<dyn CacheHandle>>> {
        async move {
            let cache = DocumentCache::open(&self.db, workspace, document).await?;
            Ok(Box::new(cache) as Box<dyn CacheHandle>)
        }
        .boxed()
    }
}

// =============================================================================
// Structured Store
// =============================================================================

/// Structured-store provider keeping one SQLite file per workspace.
#[derive(Debug, Clone)]
pub struct SqliteStoreProvider {
    dir: PathBuf,
}

impl SqliteStoreProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SqliteStoreProvider { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StructuredStoreProvider for SqliteStoreProvider {
    fn open<'a>(
        &'a self,
        workspace: &'a str,
        document: SharedDocument,
        initial: Option<Vec<u8>>,
    ) -> BoxFuture<'a, SyncResult<Box<dyn StoreHandle>>> {
        async move {
            let store = StructuredStore::open(&self.dir, workspace, document, initial).await?;
            Ok(Box::new(SqliteStructuredStore {
                store: Arc::new(store),
                exporter: Mutex::new(None),
            }) as Box<dyn StoreHandle>)
        }
        .boxed()
    }
}

/// An open structured store plus its export loop.
///
/// After every persisted write the store image is exported and handed to
/// the registered exporter.
pub struct SqliteStructuredStore {
    store: Arc<StructuredStore>,
    exporter: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteStructuredStore {
    pub fn store(&self) -> &StructuredStore {
        &self.store
    }
}

impl StoreHandle for SqliteStructuredStore {
    fn register_exporter(&self, exporter: ExportDataFn) {
        let store = self.store.clone();
        let mut changes = store.changes();

        let task = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                match export_once(&store, &exporter).await {
                    Ok(len) => debug!(bytes = len, "Structured store exported"),
                    Err(e) => warn!(error = %e, "Structured store export failed"),
                }
            }
        });

        let previous = self
            .exporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn when_synced(&self) -> BoxFuture<'_, SyncResult<()>> {
        futures_util::future::ready(Ok(())).boxed()
    }
}

/// Exports the current image and hands it to `exporter`. Returns the image size.
async fn export_once(store: &StructuredStore, exporter: &ExportDataFn) -> SyncResult<usize> {
    let bytes = store
        .export()
        .await
        .map_err(|e| SyncError::ExportFailed(e.to_string()))?;
    let len = bytes.len();

    exporter(bytes).await.map_err(|e| match e {
        e @ SyncError::ExportFailed(_) => e,
        other => SyncError::ExportFailed(other.to_string()),
    })?;
    Ok(len)
}

impl Drop for SqliteStructuredStore {
    fn drop(&mut self) {
        if let Some(task) = self
            .exporter
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}
