//! # Structured Store Task
//!
//! The store is only opened once the host can persist it.
//!
//! ```text
//! every poll interval:  has_exporter()?
//!        │ false ──► keep polling
//!        │ true  ──► cancel timer (once)
//!        ▼
//! import_data() ──► open(workspace, document, bytes)
//!        ▼
//! register_exporter(export_data) ──► when_synced ──► resolve / reject
//! ```
//!
//! Without a `has_exporter` predicate, or while it keeps returning false,
//! the task stays pending. It never fails for lack of an exporter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, trace};

use crate::backends::hold_until_aborted;
use crate::context::SyncContext;
use crate::options::{ExportDataFn, HasExporterFn, ImportDataFn};
use crate::provider::StructuredStoreProvider;
use crate::signal::Completer;
use crate::ticker::PollTimer;

/// The host hooks the store task needs, split out of `SyncOptions`.
#[derive(Clone)]
pub(crate) struct StoreHooks {
    pub import_data: Option<ImportDataFn>,
    pub export_data: Option<ExportDataFn>,
    pub has_exporter: Option<HasExporterFn>,
    pub poll_interval: Duration,
}

pub(crate) async fn run(
    provider: Arc<dyn StructuredStoreProvider>,
    ctx: SyncContext,
    hooks: StoreHooks,
    completer: Completer,
) {
    let Some(has_exporter) = hooks.has_exporter else {
        debug!("No exporter predicate; structured store stays closed");
        let _pending = completer;
        return hold_until_aborted().await;
    };

    let mut timer = PollTimer::new(hooks.poll_interval);
    while let Some(tick) = timer.tick().await {
        if has_exporter() {
            timer.cancel();
            debug!(tick, "Exporter available");
            break;
        }
        trace!(tick, "Exporter not available yet");
    }

    let initial = match &hooks.import_data {
        Some(import) => import().await,
        None => None,
    };
    let imported = initial.as_ref().map(Vec::len);

    let store = match provider
        .open(ctx.workspace(), ctx.document().clone(), initial)
        .await
    {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to open structured store");
            completer.reject(e.to_string());
            return;
        }
    };

    if let Some(export) = hooks.export_data {
        store.register_exporter(export);
    }

    if let Err(e) = store.when_synced().await {
        error!(error = %e, "Structured store failed to sync");
        completer.reject(e.to_string());
        return;
    }

    info!(imported_bytes = ?imported, "Structured store synced");
    completer.resolve();

    let _store = store;
    hold_until_aborted().await;
}
