//! # Backend Tasks
//!
//! One async task per enabled backend kind. Every task settles its own
//! completion signal and then stays alive, keeping its backend bound to
//! the document, until the session aborts it.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────────────┐
//! │ local_cache      │ open → when_synced → resolve / reject                │
//! │ structured_store │ poll has_exporter → import → open → register         │
//! │                  │ exporter → when_synced → resolve / reject            │
//! │ relay            │ no token → resolve                                   │
//! │                  │ connect → first event settles → every event reported │
//! └──────────────────┴──────────────────────────────────────────────────────┘
//! ```

pub(crate) mod local_cache;
pub(crate) mod relay;
pub(crate) mod structured_store;

/// Parks the task for the rest of the session.
pub(crate) async fn hold_until_aborted() {
    std::future::pending::<()>().await
}
