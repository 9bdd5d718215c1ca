//! # Sync Coordinator
//!
//! Starts one task per enabled backend and hands back their completion
//! signals.
//!
//! ## Session Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Coordinator::start                               │
//! │                                                                         │
//! │  validate options ─► check providers ─► take workspace lease           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ span "sync_session" { session, workspace }                       │  │
//! │  │                                                                  │  │
//! │  │   for kind in enabled:                                           │  │
//! │  │     (completer, signal) = completion(kind)                       │  │
//! │  │     tasks.spawn(run(kind, completer))  in span "backend"         │  │
//! │  │     signals[kind] = signal                                       │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  SyncSession { signals, tasks, reporter, lease }                       │
//! │                                                                         │
//! │  FAILURE POLICY                                                        │
//! │  ──────────────                                                        │
//! │  A failed backend settles its own signal only. Siblings keep running.  │
//! │  Nothing is retried here; relays reconnect on their own.               │
//! │                                                                         │
//! │  TEARDOWN                                                              │
//! │  ────────                                                              │
//! │  Dropping the session aborts every task, which releases open stores,   │
//! │  relay connections and the exporter poll timer, then frees the lease.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{join_all, try_join_all};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, info_span, Instrument, Span};
use uuid::Uuid;

use braid_core::{BackendKind, ConnectivityState};

use crate::backends::relay::RelayTarget;
use crate::backends::structured_store::StoreHooks;
use crate::backends::{local_cache, relay, structured_store};
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::options::SyncOptions;
use crate::provider::Providers;
use crate::reporter::ConnectivityReporter;
use crate::signal::{completion, CompletionSignal};

// =============================================================================
// Workspace Lease
// =============================================================================

type LeaseSet = Arc<Mutex<HashSet<String>>>;

/// Marks a workspace as having a live session. Released on drop.
#[derive(Debug)]
struct WorkspaceLease {
    workspace: String,
    leases: LeaseSet,
}

impl WorkspaceLease {
    fn acquire(leases: &LeaseSet, workspace: &str) -> SyncResult<Self> {
        let mut held = leases.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(workspace.to_string()) {
            return Err(SyncError::SessionActive(workspace.to_string()));
        }
        Ok(WorkspaceLease {
            workspace: workspace.to_string(),
            leases: leases.clone(),
        })
    }
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        self.leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.workspace);
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Runs sync sessions against a fixed set of providers.
///
/// ## Usage
/// ```rust,ignore
/// let coordinator = Coordinator::builder()
///     .with_local_cache(Arc::new(cache_provider))
///     .with_relay(Arc::new(WebSocketRelay::new(TransportConfig::default())))
///     .build();
///
/// let session = coordinator.start(ctx, options)?;
/// session.wait_local().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Coordinator {
    providers: Providers,
    leases: LeaseSet,
    event_capacity: usize,
}

impl Coordinator {
    pub fn new(providers: Providers) -> Self {
        Coordinator {
            providers,
            leases: Arc::new(Mutex::new(HashSet::new())),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Workspaces with a live session, sorted.
    pub fn active_workspaces(&self) -> Vec<String> {
        let mut active: Vec<String> = self
            .leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        active.sort();
        active
    }

    /// Starts one task per enabled backend kind.
    ///
    /// Returns as soon as the tasks are spawned; nothing is awaited. Kinds
    /// that are not enabled get neither a task nor a signal.
    ///
    /// ## Errors
    /// - `NoRuntime` when called outside a Tokio runtime
    /// - Option validation errors (see [`SyncOptions::validate`])
    /// - `ProviderUnavailable` for an enabled kind with no provider
    /// - `SessionActive` when the workspace already has a live session
    pub fn start(&self, ctx: SyncContext, options: SyncOptions) -> SyncResult<SyncSession> {
        let handle = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        options.validate()?;

        if let Some(kind) = options
            .enabled
            .iter()
            .copied()
            .find(|kind| !self.providers.supports(*kind))
        {
            return Err(SyncError::ProviderUnavailable(kind));
        }

        let lease = WorkspaceLease::acquire(&self.leases, ctx.workspace())?;

        let id = Uuid::new_v4();
        let span = info_span!("sync_session", session = %id, workspace = %ctx.workspace());

        let enabled: Vec<&'static str> = options.enabled.iter().map(BackendKind::as_str).collect();
        info!(
            parent: &span,
            enabled = ?enabled,
            backend_address = ?options.backend_address,
            params = options.params.len(),
            has_token = ctx.token().is_some(),
            import_data = options.import_data.is_some(),
            export_data = options.export_data.is_some(),
            has_exporter = options.has_exporter.is_some(),
            "Starting sync session"
        );

        let mut tasks = JoinSet::new();
        let mut signals = BTreeMap::new();

        for kind in BackendKind::ALL {
            if !options.is_enabled(kind) {
                continue;
            }

            let (completer, signal) = completion(kind);
            let task_span = info_span!(parent: &span, "backend", backend = %kind);
            let ctx = ctx.clone();

            match kind {
                BackendKind::LocalCache => {
                    let provider = self
                        .providers
                        .local_cache
                        .clone()
                        .ok_or(SyncError::ProviderUnavailable(kind))?;
                    tasks.spawn_on(
                        local_cache::run(provider, ctx, completer).instrument(task_span),
                        &handle,
                    );
                }
                BackendKind::StructuredStore => {
                    let provider = self
                        .providers
                        .structured_store
                        .clone()
                        .ok_or(SyncError::ProviderUnavailable(kind))?;
                    let hooks = StoreHooks {
                        import_data: options.import_data.clone(),
                        export_data: options.export_data.clone(),
                        has_exporter: options.has_exporter.clone(),
                        poll_interval: options.exporter_poll_interval,
                    };
                    tasks.spawn_on(
                        structured_store::run(provider, ctx, hooks, completer)
                            .instrument(task_span),
                        &handle,
                    );
                }
                BackendKind::Websocket | BackendKind::Keck => {
                    let provider = self
                        .providers
                        .relay(kind)
                        .ok_or(SyncError::ProviderUnavailable(kind))?;
                    let target = RelayTarget {
                        address: options.backend_address.clone().unwrap_or_default(),
                        params: options.params.clone(),
                        event_capacity: self.event_capacity,
                    };
                    tasks.spawn_on(
                        relay::run(kind, provider, ctx, target, completer).instrument(task_span),
                        &handle,
                    );
                }
            }

            signals.insert(kind, signal);
        }

        Ok(SyncSession {
            id,
            workspace: ctx.workspace().to_string(),
            signals,
            tasks,
            reporter: ctx.reporter().clone(),
            span,
            _lease: lease,
        })
    }
}

// =============================================================================
// Sync Session
// =============================================================================

/// A running session: the per-kind completion signals plus the tasks
/// behind them.
pub struct SyncSession {
    id: Uuid,
    workspace: String,
    signals: BTreeMap<BackendKind, CompletionSignal>,
    tasks: JoinSet<()>,
    reporter: ConnectivityReporter,
    span: Span,
    _lease: WorkspaceLease,
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("id", &self.id)
            .field("workspace", &self.workspace)
            .field("kinds", &self.signals.keys().collect::<Vec<_>>())
            .field("connectivity", &self.connectivity())
            .finish()
    }
}

impl SyncSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Completion signal per enabled kind.
    pub fn signals(&self) -> &BTreeMap<BackendKind, CompletionSignal> {
        &self.signals
    }

    /// The signal for `kind`, or `None` if it was not enabled.
    pub fn signal(&self, kind: BackendKind) -> Option<CompletionSignal> {
        self.signals.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.signals.keys().copied()
    }

    /// Latest aggregated connectivity; `None` until a relay reports.
    pub fn connectivity(&self) -> Option<ConnectivityState> {
        self.reporter.current()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<Option<ConnectivityState>> {
        self.reporter.watch()
    }

    /// Number of backend tasks owned by the session.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every enabled local kind to settle.
    ///
    /// Fails with the first local failure. Relay signals are not awaited.
    pub async fn wait_local(&self) -> SyncResult<()> {
        let local = self
            .signals
            .iter()
            .filter(|(kind, _)| kind.is_local())
            .map(|(_, signal)| signal.wait());
        try_join_all(local).await.map(|_| ())
    }

    /// Waits for every enabled kind and returns each outcome separately.
    pub async fn wait_all(&self) -> BTreeMap<BackendKind, SyncResult<()>> {
        let kinds: Vec<BackendKind> = self.signals.keys().copied().collect();
        let results = join_all(self.signals.values().map(|signal| signal.wait())).await;
        kinds.into_iter().zip(results).collect()
    }

    /// Aborts every backend task and waits for them to stop.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
        info!(parent: &self.span, "Sync session stopped");
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`Coordinator`].
#[derive(Debug, Default)]
pub struct CoordinatorBuilder {
    providers: Providers,
    event_capacity: Option<usize>,
}

impl CoordinatorBuilder {
    pub fn providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_local_cache(
        mut self,
        provider: Arc<dyn crate::provider::LocalCacheProvider>,
    ) -> Self {
        self.providers = self.providers.with_local_cache(provider);
        self
    }

    pub fn with_structured_store(
        mut self,
        provider: Arc<dyn crate::provider::StructuredStoreProvider>,
    ) -> Self {
        self.providers = self.providers.with_structured_store(provider);
        self
    }

    pub fn with_websocket(mut self, provider: Arc<dyn crate::provider::RelayProvider>) -> Self {
        self.providers = self.providers.with_websocket(provider);
        self
    }

    pub fn with_keck(mut self, provider: Arc<dyn crate::provider::RelayProvider>) -> Self {
        self.providers = self.providers.with_keck(provider);
        self
    }

    pub fn with_relay(mut self, provider: Arc<dyn crate::provider::RelayProvider>) -> Self {
        self.providers = self.providers.with_relay(provider);
        self
    }

    /// Buffer size of each relay's event channel.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity.max(1));
        self
    }

    pub fn build(self) -> Coordinator {
        let mut coordinator = Coordinator::new(self.providers);
        if let Some(capacity) = self.event_capacity {
            coordinator.event_capacity = capacity;
        }
        coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalState;
    use crate::testing::{context, context_for, FakeCacheProvider, FakeStoreProvider, ScriptedRelay};
    use braid_core::ProviderEvent;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    fn relay_options(kinds: &[BackendKind]) -> SyncOptions {
        SyncOptions::new()
            .with_enabled(kinds.iter().copied())
            .backend_address("wss://relay.test")
    }

    fn full_coordinator(relay: Arc<ScriptedRelay>) -> Coordinator {
        Coordinator::builder()
            .with_local_cache(Arc::new(FakeCacheProvider::new(Duration::from_millis(10))))
            .with_structured_store(Arc::new(FakeStoreProvider::new()))
            .with_relay(relay)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_kinds_get_no_signal() {
        let relay = Arc::new(ScriptedRelay::new(vec![(5, ProviderEvent::Synced)]));
        let coordinator = full_coordinator(relay.clone());
        let (ctx, _listener) = context(Some("token"));

        let session = coordinator
            .start(ctx, SyncOptions::new().enable(BackendKind::LocalCache))
            .unwrap();

        assert_eq!(session.kinds().collect::<Vec<_>>(), vec![BackendKind::LocalCache]);
        assert!(session.signal(BackendKind::Websocket).is_none());
        assert!(session.signal(BackendKind::StructuredStore).is_none());
        assert_eq!(session.task_count(), 1);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(relay.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_without_token_resolves_silently() {
        let relay = Arc::new(ScriptedRelay::new(vec![(5, ProviderEvent::Synced)]));
        let coordinator = full_coordinator(relay.clone());
        let (ctx, listener) = context(None);

        let session = coordinator
            .start(ctx, relay_options(&[BackendKind::Websocket, BackendKind::Keck]))
            .unwrap();

        for result in session.wait_all().await.into_values() {
            assert!(result.is_ok());
        }
        sleep(Duration::from_millis(100)).await;
        assert!(listener.states().is_empty());
        assert_eq!(session.connectivity(), None);
        assert_eq!(relay.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_reconnect_sequence_is_reported_in_order() {
        let relay = Arc::new(ScriptedRelay::new(vec![
            (10, ProviderEvent::Synced),
            (40, ProviderEvent::LostConnection),
            (90, ProviderEvent::Synced),
        ]));
        let coordinator = full_coordinator(relay);
        let (ctx, listener) = context(Some("token"));

        let session = coordinator
            .start(ctx, relay_options(&[BackendKind::Websocket]))
            .unwrap();
        let signal = session.signal(BackendKind::Websocket).unwrap();

        signal.wait().await.unwrap();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(signal.state(), SignalState::Resolved);
        assert_eq!(
            listener.states(),
            vec![
                ConnectivityState::Connected,
                ConnectivityState::Retrying,
                ConnectivityState::Connected,
            ]
        );
        assert_eq!(session.connectivity(), Some(ConnectivityState::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_error_first_rejects_and_reports_retrying() {
        let relay = Arc::new(ScriptedRelay::new(vec![(5, ProviderEvent::ConnectionError)]));
        let coordinator = full_coordinator(relay);
        let (ctx, listener) = context(Some("token"));

        let session = coordinator
            .start(ctx, relay_options(&[BackendKind::Keck]))
            .unwrap();

        let err = session
            .signal(BackendKind::Keck)
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert_eq!(err.backend(), Some(BackendKind::Keck));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(listener.states(), vec![ConnectivityState::Retrying]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_store_opens_once() {
        let store = Arc::new(FakeStoreProvider::new());
        let coordinator = Coordinator::builder()
            .with_structured_store(store.clone())
            .build();
        let (ctx, _listener) = context(None);

        let polls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let imports = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let options = {
            let polls = polls.clone();
            let imports = imports.clone();
            SyncOptions::new()
                .enable(BackendKind::StructuredStore)
                .has_exporter(move || {
                    polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) >= 2
                })
                .import_data(move || {
                    imports.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    async { Some(b"seed".to_vec()) }
                })
                .export_data(|_bytes| async { Ok(()) })
        };

        let session = coordinator.start(ctx, options).unwrap();
        session.wait_local().await.unwrap();

        sleep(Duration::from_secs(30)).await;
        assert_eq!(polls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(imports.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(store.opened(), 1);
        assert_eq!(store.initial_bytes(), vec![Some(b"seed".to_vec())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_and_relay_race() {
        let relay = Arc::new(ScriptedRelay::new(vec![(50, ProviderEvent::Synced)]));
        let coordinator = full_coordinator(relay);
        let (ctx, listener) = context(Some("token"));
        let start = Instant::now();

        let session = coordinator
            .start(
                ctx,
                relay_options(&[BackendKind::LocalCache, BackendKind::Websocket]),
            )
            .unwrap();

        session.wait_local().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(10));

        session
            .signal(BackendKind::Websocket)
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(50));

        // The same event reaches the persistent listener right after.
        tokio::task::yield_now().await;
        assert_eq!(listener.states(), vec![ConnectivityState::Connected]);
        assert_eq!(session.connectivity(), Some(ConnectivityState::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_without_exporter_stays_pending() {
        let store = Arc::new(FakeStoreProvider::new());
        let coordinator = Coordinator::builder()
            .with_structured_store(store.clone())
            .build();
        let (ctx, _listener) = context(None);

        let session = coordinator
            .start(
                ctx,
                SyncOptions::new()
                    .enable(BackendKind::StructuredStore)
                    .has_exporter(|| false),
            )
            .unwrap();

        sleep(Duration::from_secs(24 * 3600)).await;
        let signal = session.signal(BackendKind::StructuredStore).unwrap();
        assert!(signal.is_pending());
        assert_eq!(store.opened(), 0);

        // Tearing the session down cancels the waiters.
        session.shutdown().await;
        assert!(matches!(
            signal.wait().await,
            Err(SyncError::Cancelled(BackendKind::StructuredStore))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_cancel_siblings() {
        let relay = Arc::new(ScriptedRelay::new(vec![(20, ProviderEvent::Synced)]));
        let coordinator = Coordinator::builder()
            .with_local_cache(Arc::new(FakeCacheProvider::failing("disk full")))
            .with_relay(relay)
            .build();
        let (ctx, _listener) = context(Some("token"));

        let session = coordinator
            .start(
                ctx,
                relay_options(&[BackendKind::LocalCache, BackendKind::Websocket]),
            )
            .unwrap();

        assert!(session.wait_local().await.is_err());

        let results = session.wait_all().await;
        assert!(results[&BackendKind::LocalCache].is_err());
        assert!(results[&BackendKind::Websocket].is_ok());
    }

    #[tokio::test]
    async fn test_second_session_for_workspace_is_refused() {
        let coordinator = Coordinator::builder()
            .with_local_cache(Arc::new(FakeCacheProvider::new(Duration::ZERO)))
            .build();
        let options = SyncOptions::new().enable(BackendKind::LocalCache);

        let (ctx, _listener) = context_for("shared", None);
        let session = coordinator.start(ctx, options.clone()).unwrap();
        assert_eq!(coordinator.active_workspaces(), vec!["shared".to_string()]);

        let (again, _listener) = context_for("shared", None);
        assert!(matches!(
            coordinator.start(again, options.clone()),
            Err(SyncError::SessionActive(ws)) if ws == "shared"
        ));

        let (other, _listener) = context_for("other", None);
        let _other = coordinator.start(other, options.clone()).unwrap();

        drop(session);
        let (retry, _listener) = context_for("shared", None);
        assert!(coordinator.start(retry, options).is_ok());
    }

    #[tokio::test]
    async fn test_start_rejects_bad_setup() {
        let coordinator = Coordinator::builder()
            .with_local_cache(Arc::new(FakeCacheProvider::new(Duration::ZERO)))
            .build();

        let (ctx, _listener) = context(Some("token"));
        assert!(matches!(
            coordinator.start(ctx.clone(), SyncOptions::new().enable(BackendKind::Websocket)),
            Err(SyncError::MissingBackendAddress)
        ));
        assert!(matches!(
            coordinator.start(ctx.clone(), relay_options(&[BackendKind::Keck])),
            Err(SyncError::ProviderUnavailable(BackendKind::Keck))
        ));

        // Failed starts never hold the lease.
        assert!(coordinator.active_workspaces().is_empty());
    }

    #[test]
    fn test_start_outside_runtime() {
        let coordinator = Coordinator::new(Providers::new());
        let (ctx, _listener) = context(None);
        assert!(matches!(
            coordinator.start(ctx, SyncOptions::new()),
            Err(SyncError::NoRuntime)
        ));
    }
}
