//! # Document Collaborators
//!
//! The replicated document and the presence (awareness) handle are owned by
//! the host application and shared by every backend of a session. Their merge
//! algorithm and binary encoding belong to the document library; Braid only
//! needs the narrow surface below.
//!
//! ## Update Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   host edit ──► apply_update(bytes, "local") ──► observers             │
//! │                                                   │                     │
//! │                        ┌──────────────────────────┼──────────────┐     │
//! │                        ▼                          ▼              ▼     │
//! │                  local cache               structured store    relay   │
//! │                  (persist)                 (persist + export)  (send)  │
//! │                                                                         │
//! │   Every observer receives the origin tag, so a backend can skip the    │
//! │   updates it applied itself and never echoes them back.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`MemoryDocument`] is a minimal update-log document: it keeps each distinct
//! update once, in arrival order. It backs tests and the bootstrap binary.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{CoreError, CoreResult};

/// Callback invoked with every newly applied update and its origin tag.
pub type UpdateObserver = Arc<dyn Fn(&[u8], &str) + Send + Sync>;

/// Shared document handle. Its lifetime exceeds any sync session.
pub type SharedDocument = Arc<dyn Document>;

/// Shared presence handle.
pub type SharedAwareness = Arc<dyn Awareness>;

/// Identifies a registered update observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

// =============================================================================
// Traits
// =============================================================================

/// A replicated document that accepts and emits binary updates.
pub trait Document: Send + Sync {
    /// Merges an update (or an encoded state) into the document.
    ///
    /// Returns `true` if anything new was applied.
    fn apply_update(&self, update: &[u8], origin: &str) -> CoreResult<bool>;

    /// Encodes the full document state as a single update.
    fn encode_state(&self) -> Vec<u8>;

    /// Returns true if no update has been applied yet.
    fn is_empty(&self) -> bool;

    /// Registers an observer for newly applied updates.
    fn observe(&self, observer: UpdateObserver) -> ObserverId;

    /// Removes an observer. Unknown ids are ignored.
    fn unobserve(&self, id: ObserverId);
}

/// Presence information shared with the relay that carries it.
pub trait Awareness: Send + Sync {
    /// This participant's client id.
    fn client_id(&self) -> u64;

    /// This participant's encoded presence state, if any.
    fn local_state(&self) -> Option<Vec<u8>>;

    /// Records (or clears, with `None`) a remote participant's state.
    fn apply_remote(&self, client_id: u64, state: Option<Vec<u8>>);
}

// =============================================================================
// Memory Document
// =============================================================================

/// Marker prefixing an encoded state bundle.
const BUNDLE_MAGIC: &[u8; 4] = b"BRD1";

#[derive(Default)]
struct DocState {
    updates: Vec<Vec<u8>>,
    seen: HashSet<Vec<u8>>,
    observers: Vec<(ObserverId, UpdateObserver)>,
    next_observer: u64,
}

/// In-memory update-log document.
#[derive(Default)]
pub struct MemoryDocument {
    state: Mutex<DocState>,
}

impl MemoryDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document already wrapped for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of distinct updates applied so far.
    pub fn len(&self) -> usize {
        self.lock().updates.len()
    }

    /// Returns true if nothing has been applied.
    pub fn is_empty(&self) -> bool {
        self.lock().updates.is_empty()
    }

    /// Snapshot of the applied updates, in arrival order.
    pub fn updates(&self) -> Vec<Vec<u8>> {
        self.lock().updates.clone()
    }

    /// Returns true if this exact update has been applied.
    pub fn contains(&self, update: &[u8]) -> bool {
        self.lock().seen.contains(update)
    }

    fn lock(&self) -> MutexGuard<'_, DocState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_one(&self, update: &[u8], origin: &str) -> bool {
        let observers: Vec<UpdateObserver> = {
            let mut state = self.lock();
            if !state.seen.insert(update.to_vec()) {
                return false;
            }
            state.updates.push(update.to_vec());
            state.observers.iter().map(|(_, o)| o.clone()).collect()
        };

        // Observers run outside the lock so they may read the document.
        for observer in observers {
            observer(update, origin);
        }
        true
    }
}

impl Document for MemoryDocument {
    fn apply_update(&self, update: &[u8], origin: &str) -> CoreResult<bool> {
        if update.is_empty() {
            return Err(CoreError::InvalidUpdate("empty update".to_string()));
        }

        if !update.starts_with(BUNDLE_MAGIC) {
            return Ok(self.apply_one(update, origin));
        }

        let members = decode_bundle(&update[BUNDLE_MAGIC.len()..])?;
        let mut changed = false;
        for member in members {
            changed |= self.apply_one(member, origin);
        }
        Ok(changed)
    }

    fn is_empty(&self) -> bool {
        MemoryDocument::is_empty(self)
    }

    fn encode_state(&self) -> Vec<u8> {
        let state = self.lock();
        let mut out = BUNDLE_MAGIC.to_vec();
        for update in &state.updates {
            out.extend_from_slice(&(update.len() as u32).to_be_bytes());
            out.extend_from_slice(update);
        }
        out
    }

    fn observe(&self, observer: UpdateObserver) -> ObserverId {
        let mut state = self.lock();
        let id = ObserverId(state.next_observer);
        state.next_observer += 1;
        state.observers.push((id, observer));
        id
    }

    fn unobserve(&self, id: ObserverId) {
        self.lock().observers.retain(|(existing, _)| *existing != id);
    }
}

fn decode_bundle(mut body: &[u8]) -> CoreResult<Vec<&[u8]>> {
    let mut members = Vec::new();
    while !body.is_empty() {
        if body.len() < 4 {
            return Err(CoreError::InvalidUpdate("truncated bundle header".to_string()));
        }
        let len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
        body = &body[4..];
        if body.len() < len || len == 0 {
            return Err(CoreError::InvalidUpdate(format!(
                "bundle member of {} bytes does not fit {} remaining",
                len,
                body.len()
            )));
        }
        members.push(&body[..len]);
        body = &body[len..];
    }
    Ok(members)
}

// =============================================================================
// Memory Awareness
// =============================================================================

/// In-memory presence handle.
pub struct MemoryAwareness {
    client_id: u64,
    local: Mutex<Option<Vec<u8>>>,
    remote: Mutex<HashMap<u64, Vec<u8>>>,
}

impl MemoryAwareness {
    pub fn new(client_id: u64) -> Self {
        MemoryAwareness {
            client_id,
            local: Mutex::new(None),
            remote: Mutex::new(HashMap::new()),
        }
    }

    /// Sets this participant's presence state.
    pub fn set_local_state(&self, state: Option<Vec<u8>>) {
        *self.local.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Snapshot of the known remote participants.
    pub fn remote_states(&self) -> HashMap<u64, Vec<u8>> {
        self.remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Awareness for MemoryAwareness {
    fn client_id(&self) -> u64 {
        self.client_id
    }

    fn local_state(&self) -> Option<Vec<u8>> {
        self.local
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply_remote(&self, client_id: u64, state: Option<Vec<u8>>) {
        if client_id == self.client_id {
            return;
        }
        let mut remote = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        match state {
            Some(state) => {
                remote.insert(client_id, state);
            }
            None => {
                remote.remove(&client_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_apply_deduplicates() {
        let doc = MemoryDocument::new();
        assert!(doc.apply_update(b"a", "local").unwrap());
        assert!(!doc.apply_update(b"a", "local").unwrap());
        assert!(doc.apply_update(b"b", "local").unwrap());
        assert_eq!(doc.len(), 2);
        assert!(doc.apply_update(b"", "local").is_err());
    }

    #[test]
    fn test_state_bundle_merges_into_other_document() {
        let left = MemoryDocument::new();
        left.apply_update(b"one", "local").unwrap();
        left.apply_update(b"two", "local").unwrap();

        let right = MemoryDocument::new();
        right.apply_update(b"two", "local").unwrap();
        assert!(right.apply_update(&left.encode_state(), "relay").unwrap());

        assert_eq!(right.len(), 2);
        assert!(right.contains(b"one"));
        assert!(!right.apply_update(&left.encode_state(), "relay").unwrap());
    }

    #[test]
    fn test_truncated_bundle_is_rejected() {
        let doc = MemoryDocument::new();
        let mut bundle = BUNDLE_MAGIC.to_vec();
        bundle.extend_from_slice(&10u32.to_be_bytes());
        bundle.extend_from_slice(b"short");
        assert!(matches!(
            doc.apply_update(&bundle, "relay"),
            Err(CoreError::InvalidUpdate(_))
        ));
    }

    #[test]
    fn test_observers_see_origin_and_can_unsubscribe() {
        let doc = MemoryDocument::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_origin = Arc::new(Mutex::new(String::new()));

        let id = {
            let calls = calls.clone();
            let seen_origin = seen_origin.clone();
            doc.observe(Arc::new(move |_update: &[u8], origin: &str| {
                calls.fetch_add(1, Ordering::SeqCst);
                *seen_origin.lock().unwrap() = origin.to_string();
            }))
        };

        doc.apply_update(b"x", "relay:websocket").unwrap();
        doc.apply_update(b"x", "relay:websocket").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen_origin.lock().unwrap(), "relay:websocket");

        doc.unobserve(id);
        doc.apply_update(b"y", "local").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_awareness_ignores_own_client() {
        let awareness = MemoryAwareness::new(7);
        awareness.apply_remote(7, Some(b"me".to_vec()));
        awareness.apply_remote(9, Some(b"peer".to_vec()));
        assert_eq!(awareness.remote_states().len(), 1);

        awareness.apply_remote(9, None);
        assert!(awareness.remote_states().is_empty());
    }
}
