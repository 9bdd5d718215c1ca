//! # Update Log Repository
//!
//! Append-only log of opaque document updates, keyed by workspace.
//!
//! ## Replay Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open backend                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT data FROM doc_updates WHERE workspace = ? ORDER BY id          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  document.apply_update(row, backend origin)                             │
//! │                                                                         │
//! │  document edit from any other origin                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO doc_updates (workspace, data, origin, created_at)         │
//! │                                                                         │
//! │  compact: one transaction replaces every row with the encoded state    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Origin recorded for rows written by [`UpdateLogRepository::compact`].
pub const COMPACTION_ORIGIN: &str = "compaction";

/// Repository for the per-workspace update log.
#[derive(Debug, Clone)]
pub struct UpdateLogRepository {
    pool: SqlitePool,
}

impl UpdateLogRepository {
    /// Creates a new UpdateLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UpdateLogRepository { pool }
    }

    /// Appends one update and returns its row id.
    pub async fn append(&self, workspace: &str, data: &[u8], origin: &str) -> DbResult<i64> {
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO doc_updates (workspace, data, origin, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(workspace)
        .bind(data)
        .bind(origin)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(workspace = %workspace, id, bytes = data.len(), origin = %origin, "Update appended");
        Ok(id)
    }

    /// Loads every update for a workspace in append order.
    pub async fn load(&self, workspace: &str) -> DbResult<Vec<Vec<u8>>> {
        let rows: Vec<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM doc_updates WHERE workspace = ?1 ORDER BY id")
                .bind(workspace)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }

    /// Counts stored updates for a workspace.
    pub async fn count(&self, workspace: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doc_updates WHERE workspace = ?1")
            .bind(workspace)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Replaces a workspace's log with a single encoded state.
    ///
    /// Runs in one transaction: a crash leaves either the old log or the
    /// compacted row, never neither.
    pub async fn compact(&self, workspace: &str, state: &[u8]) -> DbResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let removed = sqlx::query("DELETE FROM doc_updates WHERE workspace = ?1")
            .bind(workspace)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO doc_updates (workspace, data, origin, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(workspace)
        .bind(state)
        .bind(COMPACTION_ORIGIN)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(workspace = %workspace, removed, "Update log compacted");
        Ok(())
    }

    /// Deletes every update for a workspace.
    pub async fn clear(&self, workspace: &str) -> DbResult<u64> {
        let removed = sqlx::query("DELETE FROM doc_updates WHERE workspace = ?1")
            .bind(workspace)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed)
    }
}
