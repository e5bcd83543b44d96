//! Event infrastructure for board-sync-core.
//!
//! Provides `SyncEvent` for monitoring and `EventBus` for subscriptions.
//! Background paths (debounced saves, polling, retries) never surface errors
//! to callers, so this is where a UI or daemon observes what happened.

use crate::store::Tab;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Events emitted by the synchronizer's background work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// A document was persisted.
    Saved {
        /// Replica that was written.
        tab: Tab,
        /// Number of strokes in the persisted document.
        strokes: usize,
        /// Freshness stamp of the persisted document.
        #[serde(rename = "lastModified")]
        last_modified: u64,
    },
    /// A background save was dropped after failing.
    SaveFailed {
        /// Replica that could not be written.
        tab: Tab,
        /// Human-readable failure reason.
        reason: String,
    },
    /// A shared write attempt failed and may be retried.
    WriteRetry {
        /// 1-based attempt number that failed.
        attempt: u32,
        /// Human-readable failure reason.
        reason: String,
    },
    /// The poll loop observed a newer shared document.
    RemoteUpdated {
        /// Freshness stamp of the fetched document.
        #[serde(rename = "lastModified")]
        last_modified: u64,
        /// Number of strokes in the fetched document.
        strokes: usize,
    },
    /// A poll tick could not fetch the shared document.
    PollFailed {
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(SyncEvent) + Send + Sync>;

/// Event bus for publishing sync events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while emit holds a read lock
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SyncEvent) {
        // Snapshot the list so a callback may subscribe without deadlocking
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}
