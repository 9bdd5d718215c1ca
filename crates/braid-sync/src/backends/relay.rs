//! # Relay Task
//!
//! Shared by both relay variants.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  token absent? ──► resolve, no emission, done                          │
//! │                                                                         │
//! │  first = events.once_any(ALL)     ┐ both registered before connect,    │
//! │  every = events.subscribe()       ┘ so no event can slip past them     │
//! │                                                                         │
//! │  provider.connect(request, events)                                     │
//! │                                                                         │
//! │  first.await                                                            │
//! │    synced / lost-connection ──► resolve                                │
//! │    connection-error         ──► reject                                 │
//! │    stream ended             ──► reject                                 │
//! │                                                                         │
//! │  then, for every event (including the first):                          │
//! │    synced ──► connected      lost-connection / connection-error ──►    │
//! │                              retrying                                   │
//! │                                                                         │
//! │  The signal always settles before the first report.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use braid_core::{BackendKind, ProviderEvent};

use crate::context::SyncContext;
use crate::events::ProviderEvents;
use crate::provider::{RelayConnectRequest, RelayProvider};
use crate::signal::Completer;

/// Relay settings taken from the session options.
#[derive(Debug, Clone)]
pub(crate) struct RelayTarget {
    pub address: String,
    pub params: BTreeMap<String, String>,
    pub event_capacity: usize,
}

pub(crate) async fn run(
    kind: BackendKind,
    provider: Arc<dyn RelayProvider>,
    ctx: SyncContext,
    target: RelayTarget,
    completer: Completer,
) {
    let Some(token) = ctx.token().map(str::to_string) else {
        debug!("No token; relay skipped");
        completer.resolve();
        return;
    };

    let events = ProviderEvents::new(target.event_capacity);
    let first = events.once_any(&ProviderEvent::ALL);
    let mut every = events.subscribe();

    let request = RelayConnectRequest {
        variant: kind,
        token,
        address: target.address,
        workspace: ctx.workspace().to_string(),
        document: ctx.document().clone(),
        awareness: kind.carries_presence().then(|| ctx.awareness().clone()),
        params: target.params,
    };

    let _connection = match provider.connect(request, events) {
        Ok(connection) => connection,
        Err(e) => {
            warn!(error = %e, "Relay connect failed");
            completer.reject(e.to_string());
            return;
        }
    };

    match first.await {
        Some(event) if event.resolves_first_sync() => {
            info!(event = %event, "Relay first sync settled");
            completer.resolve();
        }
        Some(event) => {
            warn!(event = %event, "Relay failed before first sync");
            completer.reject(format!("relay reported {} before first sync", event));
        }
        None => {
            warn!("Relay event stream ended before first sync");
            completer.reject("relay event stream ended before first sync");
            return;
        }
    }

    while let Some(event) = every.next().await {
        ctx.reporter().report(kind, event.connectivity());
    }

    debug!("Relay event stream ended");
}
