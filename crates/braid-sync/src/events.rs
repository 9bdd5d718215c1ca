//! # Provider Events
//!
//! Pub-sub over a relay connection's lifecycle events, supporting both
//! subscription styles the relay tasks need:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   relay transport ── emit(event) ──► broadcast::Sender<ProviderEvent>   │
//! │                                            │                            │
//! │                      ┌─────────────────────┼───────────────────┐        │
//! │                      ▼                     ▼                   ▼        │
//! │             once_any(&[..])          on(event)           subscribe()    │
//! │          first matching event    every matching event   every event     │
//! │          (single-resolution)     (persistent)           (persistent)    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Subscriptions take their receiver when they are created, not when they
//! are first polled, so nothing emitted after that point is missed.

use std::future::Future;

use tokio::sync::broadcast;
use tracing::warn;

use braid_core::ProviderEvent;

/// Default buffer for undelivered events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Emitting side of a relay's event stream.
///
/// Every clone emits into the same stream. The stream ends once all clones
/// are dropped.
#[derive(Debug, Clone)]
pub struct ProviderEvents {
    tx: broadcast::Sender<ProviderEvent>,
}

impl Default for ProviderEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl ProviderEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ProviderEvents { tx }
    }

    /// Emits an event. Returns how many subscribers received it.
    pub fn emit(&self, event: ProviderEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Persistent subscription to every event.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter: None,
        }
    }

    /// Persistent subscription to one event name.
    pub fn on(&self, event: ProviderEvent) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter: Some(vec![event]),
        }
    }

    /// Resolves with the first of `events` emitted after this call, or
    /// `None` if the stream ends first.
    pub fn once_any(
        &self,
        events: &[ProviderEvent],
    ) -> impl Future<Output = Option<ProviderEvent>> + Send + 'static {
        let mut subscription = Subscription {
            rx: self.tx.subscribe(),
            filter: Some(events.to_vec()),
        };
        async move { subscription.next().await }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A persistent, optionally filtered, view of the event stream.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ProviderEvent>,
    filter: Option<Vec<ProviderEvent>>,
}

impl Subscription {
    /// Next matching event, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<ProviderEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Provider event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn matches(&self, event: ProviderEvent) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |wanted| wanted.contains(&event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_once_any_sees_first_matching_event() {
        let events = ProviderEvents::default();
        let first = events.once_any(&[ProviderEvent::Synced, ProviderEvent::ConnectionError]);

        events.emit(ProviderEvent::LostConnection);
        events.emit(ProviderEvent::ConnectionError);
        events.emit(ProviderEvent::Synced);

        assert_eq!(first.await, Some(ProviderEvent::ConnectionError));
    }

    #[tokio::test]
    async fn test_once_any_registers_before_first_poll() {
        let events = ProviderEvents::default();
        let first = events.once_any(&ProviderEvent::ALL);

        // Emitted before the future is ever polled.
        events.emit(ProviderEvent::Synced);
        assert_eq!(first.await, Some(ProviderEvent::Synced));
    }

    #[tokio::test]
    async fn test_on_filters_and_persists() {
        let events = ProviderEvents::default();
        let mut synced = events.on(ProviderEvent::Synced);

        events.emit(ProviderEvent::Synced);
        events.emit(ProviderEvent::LostConnection);
        events.emit(ProviderEvent::Synced);
        drop(events);

        assert_eq!(synced.next().await, Some(ProviderEvent::Synced));
        assert_eq!(synced.next().await, Some(ProviderEvent::Synced));
        assert_eq!(synced.next().await, None);
    }

    #[tokio::test]
    async fn test_stream_end_resolves_none() {
        let events = ProviderEvents::default();
        let first = events.once_any(&ProviderEvent::ALL);
        drop(events);

        assert_eq!(first.await, None);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let events = ProviderEvents::new(4);
        assert_eq!(events.emit(ProviderEvent::Synced), 0);

        let _sub = events.subscribe();
        assert_eq!(events.subscriber_count(), 1);
        assert_eq!(events.emit(ProviderEvent::Synced), 1);
    }
}
