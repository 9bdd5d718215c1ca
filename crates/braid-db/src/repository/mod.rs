//! # Repository Module
//!
//! Database repository implementations for Braid.
//!
//! ```text
//! Backend (cache / structured store)
//!      │
//!      │  db.updates().append(workspace, bytes, origin)
//!      ▼
//! UpdateLogRepository
//! ├── append(&self, workspace, data, origin)
//! ├── load(&self, workspace)
//! ├── count(&self, workspace)
//! ├── compact(&self, workspace, state)
//! └── clear(&self, workspace)
//!      │
//!      ▼
//! SQLite doc_updates table
//! ```
//!
//! ## Available Repositories
//!
//! - [`UpdateLogRepository`](updates::UpdateLogRepository) - Per-workspace update log

pub mod updates;
