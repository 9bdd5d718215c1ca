//! # Completion Signals
//!
//! One-shot, multi-reader readiness values: each backend task owns a
//! [`Completer`] and the session hands out the matching
//! [`CompletionSignal`].
//!
//! ```text
//! completion(kind) ──► (Completer, CompletionSignal)
//!                          │              │ clone ─► caller A
//!                          │              │ clone ─► caller B
//!                          ▼              ▼
//!              resolve(self) / reject(self)   wait() → Ok / BackendFailed
//!              drop without settling         wait() → Cancelled
//! ```
//!
//! Settling consumes the completer, so a signal settles at most once.

use tokio::sync::watch;

use braid_core::BackendKind;

use crate::error::{SyncError, SyncResult};

/// Observable state of a completion signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState {
    /// Not settled yet.
    Pending,
    /// Settled successfully.
    Resolved,
    /// Settled with a failure reason.
    Rejected(String),
}

impl SignalState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SignalState::Pending)
    }
}

/// Creates a linked completer/signal pair for one backend.
pub fn completion(kind: BackendKind) -> (Completer, CompletionSignal) {
    let (tx, rx) = watch::channel(SignalState::Pending);
    (Completer { kind, tx }, CompletionSignal { kind, rx })
}

/// The settling half, owned by the backend task.
#[derive(Debug)]
pub struct Completer {
    kind: BackendKind,
    tx: watch::Sender<SignalState>,
}

impl Completer {
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Settles the signal successfully.
    pub fn resolve(self) {
        self.tx.send_replace(SignalState::Resolved);
    }

    /// Settles the signal with a failure.
    pub fn reject(self, reason: impl Into<String>) {
        self.tx.send_replace(SignalState::Rejected(reason.into()));
    }
}

/// The awaiting half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    kind: BackendKind,
    rx: watch::Receiver<SignalState>,
}

impl CompletionSignal {
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Current state without waiting.
    pub fn state(&self) -> SignalState {
        self.rx.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        !self.rx.borrow().is_settled()
    }

    /// Waits until the signal settles.
    ///
    /// ## Returns
    /// * `Ok(())` - the backend completed its first sync
    /// * `Err(SyncError::BackendFailed)` - the backend rejected
    /// * `Err(SyncError::Cancelled)` - the task ended without settling
    pub async fn wait(&self) -> SyncResult<()> {
        let mut rx = self.rx.clone();
        let settled = rx
            .wait_for(SignalState::is_settled)
            .await
            .map(|state| state.clone());

        match settled {
            Ok(SignalState::Resolved) => Ok(()),
            Ok(SignalState::Rejected(reason)) => Err(SyncError::BackendFailed {
                backend: self.kind,
                reason,
            }),
            Ok(SignalState::Pending) | Err(_) => Err(SyncError::Cancelled(self.kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolve_is_seen_by_every_clone() {
        let (completer, signal) = completion(BackendKind::LocalCache);
        let other = signal.clone();
        assert!(signal.is_pending());

        completer.resolve();

        assert!(signal.wait().await.is_ok());
        assert!(other.wait().await.is_ok());
        assert_eq!(other.state(), SignalState::Resolved);
    }

    #[tokio::test]
    async fn test_reject_carries_reason() {
        let (completer, signal) = completion(BackendKind::Keck);
        completer.reject("relay reported connection-error");

        match signal.wait().await {
            Err(SyncError::BackendFailed { backend, reason }) => {
                assert_eq!(backend, BackendKind::Keck);
                assert!(reason.contains("connection-error"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_completer_cancels() {
        let (completer, signal) = completion(BackendKind::StructuredStore);
        drop(completer);

        assert!(matches!(
            signal.wait().await,
            Err(SyncError::Cancelled(BackendKind::StructuredStore))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_wake_on_settle() {
        let (completer, signal) = completion(BackendKind::Websocket);

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.wait().await.is_ok() }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(signal.is_pending());
        completer.resolve();

        assert!(waiter.await.unwrap());
    }
}
