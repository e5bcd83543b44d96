//! Debounced writer: coalesce bursts of edits into one persistence call.
//!
//! Every `schedule` records the newest document and restarts the quiescence
//! timer. Only when the timer expires without another `schedule` is the
//! document written, so intermediate states are dropped. The timer is a
//! spawned Tokio task; restarting it aborts the previous task unless that
//! task has already started persisting.

use crate::cache::SnapshotCache;
use crate::document::{Document, now_millis};
use crate::events::{EventBus, SyncEvent};
use crate::retry::{RetryConfig, write_with_retry};
use crate::store::{LocalStore, SharedStore, Tab};
use crate::synchronizer::SyncError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Pending quiescence timer.
struct Timer {
    handle: JoinHandle<()>,
    /// Set once the window elapsed and persistence began
    fired: Arc<AtomicBool>,
}

struct Inner<L, S> {
    local: Arc<L>,
    shared: Arc<S>,
    window: Duration,
    retry: RetryConfig,
    events: Arc<EventBus>,
    cache: Arc<SnapshotCache>,
    pending: Mutex<Option<(Tab, Document)>>,
    timer: Mutex<Option<Timer>>,
    /// Serializes persistence so one writer never has overlapping writes
    write_lock: tokio::sync::Mutex<()>,
}

/// Coalesces document saves per quiescence window.
pub struct DebouncedWriter<L, S> {
    inner: Arc<Inner<L, S>>,
}

impl<L, S> DebouncedWriter<L, S>
where
    L: LocalStore + 'static,
    S: SharedStore + 'static,
{
    pub fn new(
        local: Arc<L>,
        shared: Arc<S>,
        window: Duration,
        retry: RetryConfig,
        events: Arc<EventBus>,
        cache: Arc<SnapshotCache>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                local,
                shared,
                window,
                retry,
                events,
                cache,
                pending: Mutex::new(None),
                timer: Mutex::new(None),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Record `document` as the state to persist for `tab` and restart the timer.
    ///
    /// Must be called from within a Tokio runtime. Failures of the eventual
    /// write are logged and published as `SyncEvent::SaveFailed`, never returned.
    pub fn schedule(&self, tab: Tab, document: Document) {
        *self.inner.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some((tab, document));

        let mut timer = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = timer.take() {
            previous.cancel();
        }

        let inner = Arc::clone(&self.inner);
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            fired_clone.store(true, Ordering::SeqCst);
            if let Some(Err(e)) = inner.persist_pending().await {
                error!("Debounced save failed: {}", e);
            }
        });

        *timer = Some(Timer { handle, fired });
    }

    /// Persist the pending document now instead of waiting for the timer.
    ///
    /// Returns `Ok(())` when nothing was pending.
    pub async fn flush(&self) -> Result<(), SyncError> {
        if let Some(timer) = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            timer.cancel();
        }
        match self.inner.persist_pending().await {
            Some(result) => result.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Drop the pending document without writing it.
    pub fn cancel(&self) {
        if let Some(timer) = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            timer.cancel();
        }
        self.inner.pending.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Whether a scheduled document has not been persisted yet.
    pub fn has_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Persist immediately, bypassing the timer. Errors are returned.
    pub async fn persist_now(&self, tab: Tab, document: Document) -> Result<Document, SyncError> {
        let _guard = self.inner.write_lock.lock().await;
        self.inner.persist(tab, document).await
    }
}

impl Timer {
    fn cancel(self) {
        // A timer that already fired is mid-write; let it finish
        if !self.fired.load(Ordering::SeqCst) {
            self.handle.abort();
        }
    }
}

impl<L, S> Inner<L, S>
where
    L: LocalStore,
    S: SharedStore,
{
    async fn persist_pending(&self) -> Option<Result<Document, SyncError>> {
        let _guard = self.write_lock.lock().await;
        let (tab, document) = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        debug!("Quiescence window elapsed, persisting {} board", tab);
        Some(self.persist(tab, document).await)
    }

    /// Stamp and write one document. Callers hold `write_lock`.
    async fn persist(&self, tab: Tab, mut document: Document) -> Result<Document, SyncError> {
        document.touch(now_millis());

        let result = match tab {
            Tab::Local => LocalStore::write(&*self.local, &document)
                .await
                .map_err(SyncError::from),
            Tab::Shared => {
                self.cache.invalidate();
                write_with_retry(&*self.shared, &document, &self.retry, Some(&self.events))
                    .await
                    .map(|_| ())
                    .map_err(SyncError::from)
            }
        };

        match result {
            Ok(()) => {
                info!(
                    "Saved {} board ({} strokes, lastModified {})",
                    tab,
                    document.strokes.len(),
                    document.last_modified
                );
                self.events.emit(SyncEvent::Saved {
                    tab,
                    strokes: document.strokes.len(),
                    last_modified: document.last_modified,
                });
                Ok(document)
            }
            Err(e) => {
                self.events.emit(SyncEvent::SaveFailed {
                    tab,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
