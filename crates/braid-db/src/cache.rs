//! # Durable Document Cache
//!
//! The local-cache backend: one SQLite file per device holding the update
//! log of every workspace opened on it. Opening the cache replays the
//! workspace's log into the document; from then on every edit from another
//! origin is appended.

use tokio::sync::watch;
use tracing::info;

use braid_core::SharedDocument;

use crate::error::DbResult;
use crate::persist::UpdatePersister;
use crate::pool::Database;

/// Origin tag for updates replayed from the cache.
pub const CACHE_ORIGIN: &str = "local-cache";

/// Live binding between a document and the device cache.
pub struct DocumentCache {
    workspace: String,
    db: Database,
    persister: UpdatePersister,
}

impl DocumentCache {
    /// Opens the cache for `workspace` and loads its contents into `document`.
    ///
    /// Returns once the stored log has been fully applied, which is the
    /// point the local-cache completion signal resolves.
    pub async fn open(db: &Database, workspace: &str, document: SharedDocument) -> DbResult<Self> {
        let persister =
            UpdatePersister::attach(db.updates(), workspace, document, CACHE_ORIGIN).await?;

        info!(
            workspace = %workspace,
            replayed = persister.replayed(),
            "Local cache loaded"
        );

        Ok(DocumentCache {
            workspace: workspace.to_string(),
            db: db.clone(),
            persister,
        })
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Number of stored updates applied on open.
    pub fn replayed(&self) -> usize {
        self.persister.replayed()
    }

    /// Counter bumped after every persisted write.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.persister.changes()
    }

    /// Number of rows currently stored for this workspace.
    pub async fn stored_updates(&self) -> DbResult<i64> {
        self.db.updates().count(&self.workspace).await
    }

    /// Collapses the stored log into one encoded state.
    pub fn compact(&self) -> DbResult<()> {
        self.persister.compact()
    }

    /// Stops persisting and waits for queued writes.
    pub async fn close(self) {
        self.persister.close().await;
    }
}
