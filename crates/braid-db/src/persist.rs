//! # Update Persister
//!
//! Binds a shared document to an update log: replays what is stored, then
//! appends every update that did not come from the log itself.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  attach()                                                               │
//! │    1. observe(document)     ──► updates from other origins queue up    │
//! │    2. load(workspace)       ──► apply_update(row, own origin)          │
//! │    3. spawn writer task     ──► drains the queue in order              │
//! │                                                                         │
//! │  writer task                                                            │
//! │    Append(bytes, origin) ──► repo.append ──► changes += 1              │
//! │    Compact(state)        ──► repo.compact ──► changes += 1             │
//! │                                                                         │
//! │  drop / close()                                                         │
//! │    unobserve ──► queue closes ──► writer drains and exits              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Observing before replay means an edit made while the log is loading is
//! still persisted. Replayed rows carry the persister's own origin, so the
//! observer skips them and nothing is written twice.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use braid_core::{ObserverId, SharedDocument};

use crate::error::{DbError, DbResult};
use crate::repository::updates::UpdateLogRepository;

enum WriteOp {
    Append { update: Vec<u8>, origin: String },
    Compact { state: Vec<u8> },
}

/// Keeps a document and an update log in step until dropped.
pub struct UpdatePersister {
    document: SharedDocument,
    observer: ObserverId,
    queue: Option<mpsc::UnboundedSender<WriteOp>>,
    writer: Option<JoinHandle<()>>,
    changes: watch::Receiver<u64>,
    replayed: usize,
}

impl UpdatePersister {
    /// Replays the stored log into `document` and starts persisting.
    ///
    /// `origin` tags replayed updates; updates observed with this origin are
    /// not written back.
    pub async fn attach(
        repo: UpdateLogRepository,
        workspace: &str,
        document: SharedDocument,
        origin: &str,
    ) -> DbResult<Self> {
        let (queue, rx) = mpsc::unbounded_channel();

        let observer = {
            let queue = queue.clone();
            let own_origin = origin.to_string();
            document.observe(Arc::new(move |update: &[u8], origin: &str| {
                if origin != own_origin {
                    let _ = queue.send(WriteOp::Append {
                        update: update.to_vec(),
                        origin: origin.to_string(),
                    });
                }
            }))
        };

        let replayed = match replay(&repo, workspace, &document, origin).await {
            Ok(count) => count,
            Err(e) => {
                document.unobserve(observer);
                return Err(e);
            }
        };

        debug!(workspace = %workspace, origin = %origin, replayed, "Update log replayed");

        let (changes_tx, changes) = watch::channel(0u64);
        let writer = tokio::spawn(write_loop(repo, workspace.to_string(), rx, changes_tx));

        Ok(UpdatePersister {
            document,
            observer,
            queue: Some(queue),
            writer: Some(writer),
            changes,
            replayed,
        })
    }

    /// Number of stored updates applied during attach.
    pub fn replayed(&self) -> usize {
        self.replayed
    }

    /// The document this persister observes.
    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    /// Counter bumped after every completed write.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.clone()
    }

    /// Queues replacement of the stored log with the current encoded state.
    ///
    /// Ordered after every update already queued.
    pub fn compact(&self) -> DbResult<()> {
        let state = self.document.encode_state();
        self.queue
            .as_ref()
            .ok_or_else(|| DbError::Internal("persister is closed".to_string()))?
            .send(WriteOp::Compact { state })
            .map_err(|_| DbError::Internal("writer task has stopped".to_string()))
    }

    /// Stops observing and waits until every queued write has landed.
    pub async fn close(mut self) {
        self.detach();
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                warn!(error = %e, "Update writer task failed");
            }
        }
    }

    fn detach(&mut self) {
        self.document.unobserve(self.observer);
        self.queue = None;
    }
}

impl Drop for UpdatePersister {
    fn drop(&mut self) {
        // The writer keeps draining whatever is already queued.
        self.detach();
    }
}

async fn replay(
    repo: &UpdateLogRepository,
    workspace: &str,
    document: &SharedDocument,
    origin: &str,
) -> DbResult<usize> {
    let stored = repo.load(workspace).await?;
    for update in &stored {
        document.apply_update(update, origin)?;
    }
    Ok(stored.len())
}

async fn write_loop(
    repo: UpdateLogRepository,
    workspace: String,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    changes: watch::Sender<u64>,
) {
    while let Some(op) = rx.recv().await {
        let result = match op {
            WriteOp::Append { update, origin } => {
                repo.append(&workspace, &update, &origin).await.map(|_| ())
            }
            WriteOp::Compact { state } => repo.compact(&workspace, &state).await,
        };

        match result {
            Ok(()) => {
                changes.send_modify(|n| *n += 1);
            }
            Err(e) => warn!(workspace = %workspace, error = %e, "Failed to persist update"),
        }
    }
    debug!(workspace = %workspace, "Update writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use braid_core::{Document, MemoryDocument};

    #[tokio::test]
    async fn test_persists_foreign_updates_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let doc = MemoryDocument::shared();

        let persister = UpdatePersister::attach(db.updates(), "w1", doc.clone(), "cache")
            .await
            .unwrap();
        let mut changes = persister.changes();

        doc.apply_update(b"from-host", "local").unwrap();
        doc.apply_update(b"from-cache", "cache").unwrap();
        changes.wait_for(|n| *n >= 1).await.unwrap();
        persister.close().await;

        assert_eq!(db.updates().load("w1").await.unwrap(), vec![b"from-host".to_vec()]);
    }

    #[tokio::test]
    async fn test_replay_restores_document() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.updates().append("w1", b"a", "local").await.unwrap();
        db.updates().append("w1", b"b", "local").await.unwrap();

        let doc = MemoryDocument::shared();
        let persister = UpdatePersister::attach(db.updates(), "w1", doc.clone(), "cache")
            .await
            .unwrap();

        assert_eq!(persister.replayed(), 2);
        assert_eq!(doc.updates(), vec![b"a".to_vec(), b"b".to_vec()]);
        persister.close().await;

        // Replayed rows were not appended again.
        assert_eq!(db.updates().count("w1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_compact_after_queued_appends() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let doc = MemoryDocument::shared();
        let persister = UpdatePersister::attach(db.updates(), "w1", doc.clone(), "cache")
            .await
            .unwrap();

        doc.apply_update(b"x", "local").unwrap();
        doc.apply_update(b"y", "local").unwrap();
        persister.compact().unwrap();
        persister.close().await;

        let rows = db.updates().load("w1").await.unwrap();
        assert_eq!(rows, vec![doc.encode_state()]);

        let restored = MemoryDocument::shared();
        UpdatePersister::attach(db.updates(), "w1", restored.clone(), "cache")
            .await
            .unwrap()
            .close()
            .await;
        assert_eq!(restored.updates(), doc.updates());
    }

    #[tokio::test]
    async fn test_drop_stops_observing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let doc = MemoryDocument::shared();
        let persister = UpdatePersister::attach(db.updates(), "w1", doc.clone(), "cache")
            .await
            .unwrap();
        drop(persister);

        doc.apply_update(b"late", "local").unwrap();
        tokio::task::yield_now().await;
        assert_eq!(db.updates().count("w1").await.unwrap(), 0);
    }
}
