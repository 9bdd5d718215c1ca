//! # Connectivity Reporter
//!
//! Single-slot sink for the aggregated connectivity state.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  websocket task ──┐                                                     │
//! │                   ├──► report(state) ──► latched slot (watch)           │
//! │  keck task ───────┘                      │                              │
//! │                                          ├──► watch receivers           │
//! │                                          └──► ConnectivityListener      │
//! │                                               (host callback)           │
//! │                                                                         │
//! │  The slot starts as None (unknown). There is no "disconnected" value:   │
//! │  without a new emission the last state stays current. Last write wins.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::info;

use braid_core::{BackendKind, ConnectivityState};

// =============================================================================
// Listener Trait
// =============================================================================

/// Receives every connectivity emission (implemented by the host).
pub trait ConnectivityListener: Send + Sync {
    fn on_connectivity(&self, state: ConnectivityState);
}

impl<F> ConnectivityListener for F
where
    F: Fn(ConnectivityState) + Send + Sync,
{
    fn on_connectivity(&self, state: ConnectivityState) {
        self(state)
    }
}

/// Listener that ignores every emission.
pub struct NoOpListener;

impl ConnectivityListener for NoOpListener {
    fn on_connectivity(&self, _state: ConnectivityState) {}
}

// =============================================================================
// Reporter
// =============================================================================

struct ReporterInner {
    /// Held across the latch update and the listener call, so the listener's
    /// last emission always matches the latched state.
    emit: Mutex<()>,
    slot: watch::Sender<Option<ConnectivityState>>,
    listener: Arc<dyn ConnectivityListener>,
    emissions: AtomicU64,
}

/// Shared handle to the session's connectivity slot.
#[derive(Clone)]
pub struct ConnectivityReporter {
    inner: Arc<ReporterInner>,
}

impl std::fmt::Debug for ConnectivityReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityReporter")
            .field("current", &self.current())
            .field("emissions", &self.emissions())
            .finish()
    }
}

impl Default for ConnectivityReporter {
    fn default() -> Self {
        Self::new(Arc::new(NoOpListener))
    }
}

impl ConnectivityReporter {
    pub fn new(listener: Arc<dyn ConnectivityListener>) -> Self {
        let (slot, _) = watch::channel(None);
        ConnectivityReporter {
            inner: Arc::new(ReporterInner {
                emit: Mutex::new(()),
                slot,
                listener,
                emissions: AtomicU64::new(0),
            }),
        }
    }

    /// Reporter that forwards emissions to a closure.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        Self::new(Arc::new(callback))
    }

    /// Records `state` as current and forwards it to the listener.
    ///
    /// Concurrent reports are serialized; the listener must not call back
    /// into `report`.
    pub fn report(&self, backend: BackendKind, state: ConnectivityState) {
        let _emitting = self
            .inner
            .emit
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = self.inner.slot.send_replace(Some(state));
        self.inner.emissions.fetch_add(1, Ordering::SeqCst);

        info!(
            backend = %backend,
            state = %state,
            changed = previous != Some(state),
            "Connectivity"
        );

        self.inner.listener.on_connectivity(state);
    }

    /// Latest reported state; `None` until the first emission.
    pub fn current(&self) -> Option<ConnectivityState> {
        *self.inner.slot.borrow()
    }

    /// Receiver that observes every change of the latched state.
    pub fn watch(&self) -> watch::Receiver<Option<ConnectivityState>> {
        self.inner.slot.subscribe()
    }

    /// Number of emissions so far.
    pub fn emissions(&self) -> u64 {
        self.inner.emissions.load(Ordering::SeqCst)
    }
}
