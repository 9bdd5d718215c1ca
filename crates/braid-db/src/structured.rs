//! # Structured Store
//!
//! The local-structured-store backend: a standalone SQLite file per
//! workspace that the host can import from and export to.
//!
//! ## Import / Export
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  host import hook ──► bytes ──► {workspace}.import.sqlite (staged)     │
//! │                                         │ open + migrate ok             │
//! │                                         ▼                               │
//! │                       rename over {dir}/{workspace}.sqlite              │
//! │                                         │                               │
//! │                                         ▼                               │
//! │                              open + migrate + replay                    │
//! │                                         │                               │
//! │                                         ▼                               │
//! │                            document edits are appended                  │
//! │                                         │                               │
//! │                                         ▼                               │
//! │   export() ──► VACUUM INTO {workspace}.export.sqlite ──► bytes         │
//! │                                         │                               │
//! │                                         ▼                               │
//! │                                host export hook                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The exported image is a complete database, including the migration
//! table, so importing it elsewhere reproduces the same document.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use braid_core::SharedDocument;

use crate::error::{DbError, DbResult};
use crate::persist::UpdatePersister;
use crate::pool::{Database, DbConfig};

/// Origin tag for updates replayed from the structured store.
pub const STORE_ORIGIN: &str = "structured-store";

/// An open structured store bound to a document.
pub struct StructuredStore {
    workspace: String,
    path: PathBuf,
    export_path: PathBuf,
    db: Database,
    persister: UpdatePersister,
}

impl StructuredStore {
    /// Opens (or creates) the store for `workspace` under `dir`.
    ///
    /// When `initial` carries bytes, they replace the store file before it
    /// is opened, but only once they open and migrate as a database of
    /// their own. A rejected import leaves the existing store untouched.
    /// The stored updates are then replayed into `document`.
    pub async fn open(
        dir: &Path,
        workspace: &str,
        document: SharedDocument,
        initial: Option<Vec<u8>>,
    ) -> DbResult<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!("{}.sqlite", workspace));
        let export_path = dir.join(format!("{}.export.sqlite", workspace));

        if let Some(bytes) = initial.filter(|b| !b.is_empty()) {
            let staged = dir.join(format!("{}.import.sqlite", workspace));
            if let Err(e) = stage_import(&staged, &bytes).await {
                remove_with_sidecars(&staged).await?;
                warn!(workspace = %workspace, error = %e, "Structured store import rejected");
                return Err(e);
            }

            for sidecar in ["-wal", "-shm"] {
                remove_if_exists(&sidecar_path(&path, sidecar)).await?;
            }
            tokio::fs::rename(&staged, &path).await?;
            info!(workspace = %workspace, bytes = bytes.len(), "Structured store imported");
        }

        let db = Database::new(DbConfig::new(&path).max_connections(2))
            .await
            .map_err(|e| match e {
                DbError::ConnectionFailed(reason) | DbError::MigrationFailed(reason) => {
                    DbError::ConnectionFailed(format!("{}: {}", path.display(), reason))
                }
                other => other,
            })?;

        let persister =
            match UpdatePersister::attach(db.updates(), workspace, document, STORE_ORIGIN).await {
                Ok(persister) => persister,
                Err(e) => {
                    db.close().await;
                    return Err(e);
                }
            };

        info!(
            workspace = %workspace,
            path = %path.display(),
            replayed = persister.replayed(),
            "Structured store opened"
        );

        Ok(StructuredStore {
            workspace: workspace.to_string(),
            path,
            export_path,
            db,
            persister,
        })
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored updates applied on open.
    pub fn replayed(&self) -> usize {
        self.persister.replayed()
    }

    /// Counter bumped after every persisted write.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.persister.changes()
    }

    /// Serializes the whole store to a self-contained SQLite image.
    pub async fn export(&self) -> DbResult<Vec<u8>> {
        remove_if_exists(&self.export_path).await?;

        let target = self.export_path.to_string_lossy().into_owned();
        sqlx::query("VACUUM INTO ?1")
            .bind(&target)
            .execute(self.db.pool())
            .await?;

        let bytes = tokio::fs::read(&self.export_path).await?;
        remove_if_exists(&self.export_path).await?;

        debug!(workspace = %self.workspace, bytes = bytes.len(), "Structured store exported");
        Ok(bytes)
    }

    /// Collapses the stored log into one encoded state.
    pub fn compact(&self) -> DbResult<()> {
        self.persister.compact()
    }

    /// Stops persisting, waits for queued writes and closes the file.
    pub async fn close(self) {
        self.persister.close().await;
        self.db.close().await;
    }
}

/// Writes `bytes` to `staged` and proves they are a usable store: the file
/// must open, migrate, and end up checkpointed into one self-contained file.
async fn stage_import(staged: &Path, bytes: &[u8]) -> DbResult<()> {
    remove_with_sidecars(staged).await?;
    tokio::fs::write(staged, bytes).await?;

    let db = Database::new(DbConfig::new(staged).max_connections(1)).await?;
    let checkpoint = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(db.pool())
        .await;
    db.close().await;
    checkpoint?;

    for sidecar in ["-wal", "-shm"] {
        remove_if_exists(&sidecar_path(staged, sidecar)).await?;
    }
    Ok(())
}

async fn remove_with_sidecars(path: &Path) -> DbResult<()> {
    remove_if_exists(path).await?;
    for sidecar in ["-wal", "-shm"] {
        remove_if_exists(&sidecar_path(path, sidecar)).await?;
    }
    Ok(())
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn remove_if_exists(path: &Path) -> DbResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
