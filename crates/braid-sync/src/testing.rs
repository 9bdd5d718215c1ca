//! In-process providers for exercising the coordinator without I/O.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::time::{sleep, sleep_until, Instant};

use braid_core::{BackendKind, ConnectivityState, MemoryAwareness, MemoryDocument, ProviderEvent};
use braid_core::SharedDocument;

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::events::ProviderEvents;
use crate::options::ExportDataFn;
use crate::provider::{
    CacheHandle, LocalCacheProvider, RelayConnectRequest, RelayConnection, RelayProvider,
    StoreHandle, StructuredStoreProvider,
};
use crate::reporter::{ConnectivityListener, ConnectivityReporter};

// =============================================================================
// Context
// =============================================================================

#[derive(Default)]
pub(crate) struct RecordingListener {
    states: Mutex<Vec<ConnectivityState>>,
}

impl RecordingListener {
    pub(crate) fn states(&self) -> Vec<ConnectivityState> {
        self.states.lock().unwrap().clone()
    }
}

impl ConnectivityListener for RecordingListener {
    fn on_connectivity(&self, state: ConnectivityState) {
        self.states.lock().unwrap().push(state);
    }
}

pub(crate) fn context(token: Option<&str>) -> (SyncContext, Arc<RecordingListener>) {
    context_for("workspace", token)
}

pub(crate) fn context_for(
    workspace: &str,
    token: Option<&str>,
) -> (SyncContext, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let ctx = context_with_workspace(
        workspace,
        token,
        ConnectivityReporter::new(listener.clone()),
    );
    (ctx, listener)
}

pub(crate) fn context_with(token: Option<&str>, reporter: ConnectivityReporter) -> SyncContext {
    context_with_workspace("workspace", token, reporter)
}

fn context_with_workspace(
    workspace: &str,
    token: Option<&str>,
    reporter: ConnectivityReporter,
) -> SyncContext {
    SyncContext::new(
        MemoryDocument::shared(),
        Arc::new(MemoryAwareness::new(1)),
        workspace,
        token.map(str::to_string),
        reporter,
    )
    .unwrap()
}

// =============================================================================
// Local Cache
// =============================================================================

pub(crate) struct FakeCacheProvider {
    delay: Duration,
    failure: Option<String>,
    opened: AtomicUsize,
}

impl FakeCacheProvider {
    /// Cache whose first sync completes `delay` after opening.
    pub(crate) fn new(delay: Duration) -> Self {
        FakeCacheProvider {
            delay,
            failure: None,
            opened: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(reason: &str) -> Self {
        FakeCacheProvider {
            delay: Duration::ZERO,
            failure: Some(reason.to_string()),
            opened: AtomicUsize::new(0),
        }
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

struct FakeCache {
    delay: Duration,
}

impl CacheHandle for FakeCache {
    fn when_synced(&self) -> BoxFuture<'_, SyncResult<()>> {
        let delay = self.delay;
        async move {
            sleep(delay).await;
            Ok(())
        }
        .boxed()
    }
}

impl LocalCacheProvider for FakeCacheProvider {
    fn open<'a>(
        &'a self,
        _workspace: &'a str,
        _document: SharedDocument,
    ) -> BoxFuture<'a, SyncResult<Box<dyn CacheHandle>>> {
        async move {
            self.opened.fetch_add(1, Ordering::SeqCst);
            match &self.failure {
                Some(reason) => Err(SyncError::DatabaseError(reason.clone())),
                None => Ok(Box::new(FakeCache { delay: self.delay }) as Box<dyn CacheHandle>),
            }
        }
        .boxed()
    }
}

// =============================================================================
// Structured Store
// =============================================================================

pub(crate) struct FakeStoreProvider {
    failure: Option<String>,
    opened: AtomicUsize,
    initial: Mutex<Vec<Option<Vec<u8>>>>,
    exporters: Arc<AtomicUsize>,
}

impl FakeStoreProvider {
    pub(crate) fn new() -> Self {
        FakeStoreProvider {
            failure: None,
            opened: AtomicUsize::new(0),
            initial: Mutex::new(Vec::new()),
            exporters: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn failing(reason: &str) -> Self {
        FakeStoreProvider {
            failure: Some(reason.to_string()),
            ..Self::new()
        }
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// The import bytes passed to each open, in order.
    pub(crate) fn initial_bytes(&self) -> Vec<Option<Vec<u8>>> {
        self.initial.lock().unwrap().clone()
    }

    pub(crate) fn exporters_registered(&self) -> usize {
        self.exporters.load(Ordering::SeqCst)
    }
}

struct FakeStore {
    exporters: Arc<AtomicUsize>,
}

impl StoreHandle for FakeStore {
    fn register_exporter(&self, _exporter: ExportDataFn) {
        self.exporters.fetch_add(1, Ordering::SeqCst);
    }

    fn when_synced(&self) -> BoxFuture<'_, SyncResult<()>> {
        async { Ok(()) }.boxed()
    }
}

impl StructuredStoreProvider for FakeStoreProvider {
    fn open<'a>(
        &'a self,
        _workspace: &'a str,
        _document: SharedDocument,
        initial: Option<Vec<u8>>,
    ) -> BoxFuture<'a, SyncResult<Box<dyn StoreHandle>>> {
        async move {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.initial.lock().unwrap().push(initial);
            match &self.failure {
                Some(reason) => Err(SyncError::DatabaseError(reason.clone())),
                None => Ok(Box::new(FakeStore {
                    exporters: self.exporters.clone(),
                }) as Box<dyn StoreHandle>),
            }
        }
        .boxed()
    }
}

// =============================================================================
// Relay
// =============================================================================

/// What a scripted relay was asked to connect to.
#[derive(Debug, Clone)]
pub(crate) struct RelaySnapshot {
    pub variant: BackendKind,
    pub token: String,
    pub address: String,
    pub workspace: String,
    pub has_awareness: bool,
    pub params: BTreeMap<String, String>,
}

/// Relay that emits a fixed script of `(millis after connect, event)`.
pub(crate) struct ScriptedRelay {
    script: Vec<(u64, ProviderEvent)>,
    close_after: bool,
    refusal: Option<String>,
    requests: Mutex<Vec<RelaySnapshot>>,
}

impl ScriptedRelay {
    pub(crate) fn new(script: Vec<(u64, ProviderEvent)>) -> Self {
        ScriptedRelay {
            script,
            close_after: false,
            refusal: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Relay whose `connect` fails immediately with `reason`.
    pub(crate) fn refusing(reason: &str) -> Self {
        ScriptedRelay {
            refusal: Some(reason.to_string()),
            ..Self::new(Vec::new())
        }
    }

    /// Ends the event stream once the script has run.
    pub(crate) fn closing(mut self) -> Self {
        self.close_after = true;
        self
    }

    pub(crate) fn connects(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<RelaySnapshot> {
        self.requests.lock().unwrap().clone()
    }
}

impl RelayProvider for ScriptedRelay {
    fn connect(
        &self,
        request: RelayConnectRequest,
        events: ProviderEvents,
    ) -> SyncResult<RelayConnection> {
        self.requests.lock().unwrap().push(RelaySnapshot {
            variant: request.variant,
            token: request.token,
            address: request.address,
            workspace: request.workspace,
            has_awareness: request.awareness.is_some(),
            params: request.params,
        });

        if let Some(reason) = &self.refusal {
            return Err(SyncError::ConnectionFailed(reason.clone()));
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let script = self.script.clone();
        let close_after = self.close_after;

        tokio::spawn(async move {
            let start = Instant::now();
            for (at, event) in script {
                tokio::select! {
                    _ = sleep_until(start + Duration::from_millis(at)) => {
                        events.emit(event);
                    }
                    _ = &mut stop_rx => return,
                }
            }
            if !close_after {
                let _ = stop_rx.await;
            }
            drop(events);
        });

        Ok(RelayConnection::new(stop_tx))
    }
}
