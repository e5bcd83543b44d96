//! Poll loop: keep a shared-tab replica eventually consistent without push.
//!
//! A spawned task fetches the shared document every interval and hands it to
//! the caller's callback when it is strictly newer than the watermark. The
//! watermark is the larger of the caller-supplied "last known modified" value
//! and the newest document this loop already passed through, so duplicate or
//! out-of-order deliveries are dropped.
//!
//! Fetch failures are expected (shared backends come and go) and only logged.
//! Staleness is bounded by one interval plus fetch latency.

use crate::cache::SnapshotCache;
use crate::document::Document;
use crate::events::{EventBus, SyncEvent};
use crate::store::SharedStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Stop handle for a running poll loop.
///
/// Stopping takes effect before the next tick; a fetch already in flight may
/// complete, but its result is discarded. Dropping the handle stops the loop.
pub struct PollHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Request cancellation. Idempotent.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Whether the polling task is still alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Request cancellation and wait for the task to exit.
    pub async fn stopped(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

/// Builder for a poll loop over one shared store.
pub struct PollLoop<S> {
    shared: Arc<S>,
    interval: Duration,
    events: Option<Arc<EventBus>>,
    cache: Option<Arc<SnapshotCache>>,
}

impl<S: SharedStore + 'static> PollLoop<S> {
    pub fn new(shared: Arc<S>, interval: Duration) -> Self {
        Self {
            shared,
            interval,
            events: None,
            cache: None,
        }
    }

    /// Publish `RemoteUpdated` / `PollFailed` events to `events`.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Record every fetched document in `cache`.
    pub fn with_cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Spawn the loop. The first fetch happens one interval from now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F, W>(self, on_update: F, last_known_modified: W) -> PollHandle
    where
        F: Fn(Document) + Send + Sync + 'static,
        W: Fn() -> u64 + Send + Sync + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx, on_update, last_known_modified));
        PollHandle {
            stop_tx,
            task: Some(task),
        }
    }

    async fn run<F, W>(self, mut stop_rx: watch::Receiver<bool>, on_update: F, last_known_modified: W)
    where
        F: Fn(Document) + Send + Sync + 'static,
        W: Fn() -> u64 + Send + Sync + 'static,
    {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut high_water = 0u64;

        debug!("Polling shared board every {:?}", period);

        loop {
            tokio::select! {
                biased;
                // Err means the handle is gone; either way, stop
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {}
            }
            if *stop_rx.borrow() {
                break;
            }

            let document = match self.shared.read().await {
                Ok(document) => document,
                Err(e) => {
                    debug!("Poll fetch failed, will retry next tick: {}", e);
                    if let Some(events) = &self.events {
                        events.emit(SyncEvent::PollFailed {
                            reason: e.to_string(),
                        });
                    }
                    continue;
                }
            };

            if *stop_rx.borrow() {
                break;
            }

            if let Some(cache) = &self.cache {
                cache.set(document.clone());
            }

            let watermark = last_known_modified().max(high_water);
            if document.last_modified <= watermark {
                continue;
            }

            high_water = document.last_modified;
            info!(
                "Shared board changed (lastModified {} > {}, {} strokes)",
                document.last_modified,
                watermark,
                document.strokes.len()
            );
            if let Some(events) = &self.events {
                events.emit(SyncEvent::RemoteUpdated {
                    last_modified: document.last_modified,
                    strokes: document.strokes.len(),
                });
            }
            on_update(document);
        }

        debug!("Poll loop stopped");
    }
}

/// Start polling `shared` every `interval`.
///
/// `on_update` receives each fetched document newer than the watermark;
/// `last_known_modified` reports what the caller has already applied.
pub fn start_polling<S, F, W>(
    shared: Arc<S>,
    interval: Duration,
    on_update: F,
    last_known_modified: W,
) -> PollHandle
where
    S: SharedStore + 'static,
    F: Fn(Document) + Send + Sync + 'static,
    W: Fn() -> u64 + Send + Sync + 'static,
{
    PollLoop::new(shared, interval).start(on_update, last_known_modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    const INTERVAL: Duration = Duration::from_millis(2500);

    fn doc_at(last_modified: u64) -> Document {
        Document {
            last_modified,
            ..Document::create_default()
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<u64>>>, impl Fn(Document) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback = move |doc: Document| seen_clone.lock().unwrap().push(doc.last_modified);
        (seen, callback)
    }

    /// Advance just past the next tick.
    async fn next_tick() {
        tokio::time::sleep(INTERVAL).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_after_one_interval() {
        let shared = Arc::new(InMemoryStore::with_document(&doc_at(10)));
        let (seen, callback) = recorder();

        let _handle = start_polling(Arc::clone(&shared), INTERVAL, callback, || 0);

        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(shared.read_count(), 0);

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(shared.read_count(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_strictly_newer_documents_pass() {
        let shared = Arc::new(InMemoryStore::new());
        let (seen, callback) = recorder();

        let handle = start_polling(Arc::clone(&shared), INTERVAL, callback, || 0);
        tokio::time::sleep(Duration::from_millis(10)).await;

        for value in [10, 10, 20, 20, 30] {
            shared.seed(&doc_at(value));
            next_tick().await;
        }
        handle.stopped().await;

        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_watermark_suppresses_known_documents() {
        let shared = Arc::new(InMemoryStore::with_document(&doc_at(50)));
        let watermark = Arc::new(AtomicU64::new(100));
        let watermark_clone = Arc::clone(&watermark);
        let (seen, callback) = recorder();

        let _handle = start_polling(Arc::clone(&shared), INTERVAL, callback, move || {
            watermark_clone.load(Ordering::SeqCst)
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        next_tick().await;
        assert!(seen.lock().unwrap().is_empty());

        shared.seed(&doc_at(150));
        next_tick().await;
        assert_eq!(*seen.lock().unwrap(), vec![150]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failures_are_swallowed() {
        let shared = Arc::new(InMemoryStore::with_document(&doc_at(10)));
        shared.fail_next_reads(2);
        let events = Arc::new(EventBus::new());
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = Arc::clone(&failures);
        let _sub = events.subscribe(move |event| {
            if let SyncEvent::PollFailed { .. } = event {
                failures_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        let (seen, callback) = recorder();

        let handle = PollLoop::new(Arc::clone(&shared), INTERVAL)
            .with_events(Arc::clone(&events))
            .start(callback, || 0);
        tokio::time::sleep(Duration::from_millis(10)).await;

        for _ in 0..3 {
            next_tick().await;
        }

        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert_eq!(*seen.lock().unwrap(), vec![10]);
        assert!(handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_shared_document_is_not_fatal() {
        let shared = Arc::new(InMemoryStore::new());
        let (seen, callback) = recorder();

        let handle = start_polling(Arc::clone(&shared), INTERVAL, callback, || 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        next_tick().await;
        next_tick().await;

        assert_eq!(shared.read_count(), 2);
        assert!(seen.lock().unwrap().is_empty());
        assert!(handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_ticks() {
        let shared = Arc::new(InMemoryStore::with_document(&doc_at(10)));
        let (seen, callback) = recorder();

        let handle = start_polling(Arc::clone(&shared), INTERVAL, callback, || 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        next_tick().await;
        assert_eq!(shared.read_count(), 1);

        handle.stop();
        shared.seed(&doc_at(20));
        next_tick().await;
        next_tick().await;

        assert_eq!(shared.read_count(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![10]);
        assert!(!handle.is_running());
    }

    /// Shared store whose reads take `latency` to complete.
    struct SlowStore {
        inner: InMemoryStore,
        latency: Duration,
    }

    #[async_trait::async_trait]
    impl SharedStore for SlowStore {
        async fn read(&self) -> crate::store::Result<Document> {
            tokio::time::sleep(self.latency).await;
            SharedStore::read(&self.inner).await
        }

        async fn write(&self, document: &Document) -> crate::store::Result<()> {
            SharedStore::write(&self.inner, document).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_fetch_discards_result() {
        let shared = Arc::new(SlowStore {
            inner: InMemoryStore::with_document(&doc_at(10)),
            latency: Duration::from_secs(1),
        });
        let (seen, callback) = recorder();

        let handle = start_polling(Arc::clone(&shared), INTERVAL, callback, || 0);

        // First tick at 2500ms starts a fetch that finishes at 3500ms
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(shared.inner.read_count(), 0);
        handle.stop();
        handle.stopped().await;

        assert_eq!(shared.inner.read_count(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_loop() {
        let shared = Arc::new(InMemoryStore::with_document(&doc_at(10)));
        let (_seen, callback) = recorder();

        let handle = start_polling(Arc::clone(&shared), INTERVAL, callback, || 0);
        drop(handle);
        next_tick().await;
        next_tick().await;

        assert_eq!(shared.read_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetched_documents_fill_cache() {
        let shared = Arc::new(InMemoryStore::with_document(&doc_at(42)));
        let cache = Arc::new(SnapshotCache::new());

        let _handle = PollLoop::new(Arc::clone(&shared), INTERVAL)
            .with_cache(Arc::clone(&cache))
            .start(|_| {}, || 100);
        tokio::time::sleep(Duration::from_millis(10)).await;
        next_tick().await;

        assert_eq!(cache.get().unwrap().last_modified, 42);
    }
}
