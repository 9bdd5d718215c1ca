//! Local cache task: open, await first sync, settle. No retry.

use std::sync::Arc;

use tracing::{error, info};

use crate::backends::hold_until_aborted;
use crate::context::SyncContext;
use crate::provider::LocalCacheProvider;
use crate::signal::Completer;

pub(crate) async fn run(
    provider: Arc<dyn LocalCacheProvider>,
    ctx: SyncContext,
    completer: Completer,
) {
    let cache = match provider.open(ctx.workspace(), ctx.document().clone()).await {
        Ok(cache) => cache,
        Err(e) => {
            error!(error = %e, "Failed to open local cache");
            completer.reject(e.to_string());
            return;
        }
    };

    if let Err(e) = cache.when_synced().await {
        error!(error = %e, "Local cache failed to sync");
        completer.reject(e.to_string());
        return;
    }

    info!("Local cache synced");
    completer.resolve();

    // The cache keeps persisting document updates while it is open.
    let _cache = cache;
    hold_until_aborted().await;
}
