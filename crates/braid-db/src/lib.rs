//! # braid-db: Database Layer for Braid
//!
//! This crate provides SQLite persistence for the two local backends.
//! It uses sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   braid-sync  ──► SqliteCacheProvider ──► DocumentCache                 │
//! │               ──► SqliteStoreProvider ──► StructuredStore               │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                                      UpdatePersister                    │
//! │                               (replay log → observe → append)           │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                                   UpdateLogRepository                   │
//! │                                     doc_updates table                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Update log repository
//! - [`persist`] - Binds a document to an update log
//! - [`cache`] - Durable local cache backend
//! - [`structured`] - File-backed structured store with import/export
//!
//! ## Usage
//!
//! ```rust,ignore
//! use braid_db::{Database, DbConfig, DocumentCache};
//!
//! let db = Database::new(DbConfig::new("path/to/cache.sqlite")).await?;
//! let cache = DocumentCache::open(&db, "workspace", document).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod migrations;
pub mod persist;
pub mod pool;
pub mod repository;
pub mod structured;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{DocumentCache, CACHE_ORIGIN};
pub use error::{DbError, DbResult};
pub use persist::UpdatePersister;
pub use pool::{Database, DbConfig};
pub use repository::updates::UpdateLogRepository;
pub use structured::{StructuredStore, STORE_ORIGIN};
