//! Headless replica keeping a local board file in step with a shared one.
//!
//! The daemon holds the merged board in memory. Remote updates found by the
//! poll loop are merged in and mirrored to the local file right away; strokes
//! the shared replica has not seen yet go out through a debounced shared save.

use board_sync_core::{
    Document, LocalStore, PollHandle, SharedStore, Subscription, SyncError, SyncEvent,
    Synchronizer, Tab, has_unpushed_strokes,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct Daemon<L, S> {
    sync: Synchronizer<L, S>,
    /// Merged board as this replica currently sees it
    board: Mutex<Document>,
    /// Newest shared `lastModified` already applied or written by us
    watermark: Arc<AtomicU64>,
    _saved: Subscription,
}

impl<L, S> Daemon<L, S>
where
    L: LocalStore + 'static,
    S: SharedStore + 'static,
{
    pub fn new(sync: Synchronizer<L, S>) -> Self {
        let watermark = Arc::new(AtomicU64::new(0));

        // Our own shared saves must not come back as remote updates
        let watermark_clone = Arc::clone(&watermark);
        let saved = sync.events().subscribe(move |event| {
            if let SyncEvent::Saved {
                tab: Tab::Shared,
                last_modified,
                ..
            } = event
            {
                watermark_clone.fetch_max(last_modified, Ordering::SeqCst);
            }
        });

        Self {
            sync,
            board: Mutex::new(Document::create_default()),
            watermark,
            _saved: saved,
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer<L, S> {
        &self.sync
    }

    /// Current merged board.
    pub fn board(&self) -> Document {
        self.board.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Newest shared `lastModified` this daemon has accounted for.
    pub fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::SeqCst)
    }

    /// Startup reconciliation: merge the local replica into the shared one and
    /// write the result back. Returns the diagnostics warnings for the board.
    pub async fn reconcile(&self) -> Result<Vec<String>, SyncError> {
        let local = self.sync.load_local().await;
        let remote = self.sync.connect_shared().await?;

        let never_persisted = remote.last_modified == 0;
        let needs_push = never_persisted || has_unpushed_strokes(&local, &remote);
        let merged = if never_persisted {
            // Nothing shared yet; publish this replica as-is
            local
        } else {
            self.sync.merge(&local, &remote)
        };
        self.watermark.fetch_max(remote.last_modified, Ordering::SeqCst);

        let saved = self.sync.save_now(Tab::Local, merged).await?;
        let saved = if needs_push {
            self.sync.save_now(Tab::Shared, saved).await?
        } else {
            saved
        };

        info!(
            "Reconciled board: {} strokes across {} layer(s){}",
            saved.strokes.len(),
            saved.layers.len(),
            if needs_push { ", pushed to shared" } else { "" }
        );

        let warnings = self.sync.check_warnings(&saved);
        *self.board.lock().unwrap_or_else(|e| e.into_inner()) = saved;
        Ok(warnings)
    }

    /// Apply a shared document newer than the watermark.
    pub async fn on_remote_update(&self, remote: Document) {
        let (merged, needs_push) = {
            let mut board = self.board.lock().unwrap_or_else(|e| e.into_inner());
            let needs_push = has_unpushed_strokes(&board, &remote);
            *board = self.sync.merge(&board, &remote);
            (board.clone(), needs_push)
        };
        self.watermark.fetch_max(remote.last_modified, Ordering::SeqCst);

        debug!(
            "Merged remote board ({} strokes, lastModified {})",
            merged.strokes.len(),
            remote.last_modified
        );

        // Local mirror failures heal on the next remote update
        if let Err(e) = self.sync.save_now(Tab::Local, merged.clone()).await {
            warn!("Failed to mirror shared board locally: {}", e);
        }
        if needs_push {
            info!("Local strokes missing from shared board, scheduling shared save");
            self.sync.schedule_save(Tab::Shared, merged);
        }
    }

    /// Start the poll loop feeding remote updates into `updates`.
    fn start_polling(&self, updates: mpsc::UnboundedSender<Document>) -> PollHandle {
        let watermark = Arc::clone(&self.watermark);
        self.sync.start_polling(
            move |document| {
                // Receiver gone means we are shutting down
                let _ = updates.send(document);
            },
            move || watermark.load(Ordering::SeqCst),
        )
    }

    /// Poll until `shutdown` resolves, then stop polling and flush pending saves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), SyncError> {
        let (update_tx, mut update_rx) = mpsc::unbounded_channel();
        let poll = self.start_polling(update_tx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(remote) = update_rx.recv() => {
                    self.on_remote_update(remote).await;
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        poll.stopped().await;
        self.sync.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_sync_core::{InMemoryStore, Point, Stroke, SyncConfig, Tool};
    use std::time::Duration;

    fn daemon() -> (
        Arc<InMemoryStore>,
        Arc<InMemoryStore>,
        Daemon<InMemoryStore, InMemoryStore>,
    ) {
        let local = Arc::new(InMemoryStore::new());
        let shared = Arc::new(InMemoryStore::new());
        let sync = Synchronizer::new(
            Arc::clone(&local),
            Arc::clone(&shared),
            SyncConfig::default(),
        );
        (local, shared, Daemon::new(sync))
    }

    fn draw(doc: &mut Document, author: &str) -> Stroke {
        let layer = doc.layers[0].id.clone();
        let stroke = Stroke::new(
            layer,
            Tool::Brush,
            vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)],
            "#000000",
            2.0,
            author,
            author,
        );
        doc.add_stroke(stroke.clone());
        stroke
    }

    #[tokio::test]
    async fn test_reconcile_publishes_local_when_shared_missing() {
        let (local, shared, daemon) = daemon();
        let mut doc = Document::create_default();
        draw(&mut doc, "me");
        local.seed(&doc);

        daemon.reconcile().await.unwrap();

        let published = shared.snapshot().unwrap();
        assert_eq!(published.strokes, doc.strokes);
        assert_eq!(published.layers, doc.layers);
        assert_eq!(daemon.watermark(), published.last_modified);
    }

    #[tokio::test]
    async fn test_reconcile_without_local_changes_leaves_shared_alone() {
        let (_local, shared, daemon) = daemon();
        let mut remote = Document::create_default();
        draw(&mut remote, "them");
        remote.last_modified = 1000;
        shared.seed(&remote);

        daemon.reconcile().await.unwrap();

        assert_eq!(shared.write_count(), 0);
        assert_eq!(daemon.board().strokes, remote.strokes);
        assert_eq!(daemon.watermark(), 1000);
    }

    #[tokio::test]
    async fn test_reconcile_merges_both_sides() {
        let (local, shared, daemon) = daemon();
        let mut base = Document::create_default();
        let a = draw(&mut base, "them");
        base.last_modified = 1000;

        let mut remote = base.clone();
        let c = draw(&mut remote, "them");
        remote.last_modified = 2000;
        shared.seed(&remote);

        let mut mine = base.clone();
        let b = draw(&mut mine, "me");
        local.seed(&mine);

        daemon.reconcile().await.unwrap();

        let ids: Vec<_> = shared
            .snapshot()
            .unwrap()
            .strokes
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id, b.id]);
        assert_eq!(local.snapshot().unwrap().strokes.len(), 3);
    }

    #[tokio::test]
    async fn test_reconcile_surfaces_shared_failure() {
        let (_local, shared, daemon) = daemon();
        shared.fail_next_reads(1);

        assert!(daemon.reconcile().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_update_mirrors_locally_and_pushes_local_strokes() {
        let (local, shared, daemon) = daemon();
        daemon.reconcile().await.unwrap();

        // A stroke only this replica has
        let mut board = daemon.board();
        draw(&mut board, "me");
        *daemon.board.lock().unwrap() = board;

        let mut remote = shared.snapshot().unwrap();
        draw(&mut remote, "them");
        remote.last_modified += 1;
        shared.seed(&remote);

        daemon.on_remote_update(remote.clone()).await;
        assert_eq!(local.snapshot().unwrap().strokes.len(), 2);
        assert!(daemon.synchronizer().has_pending_save());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let pushed = shared.snapshot().unwrap();
        assert_eq!(pushed.strokes.len(), 2);
        assert_eq!(daemon.watermark(), pushed.last_modified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_polled_updates_until_shutdown() {
        let (local, shared, daemon) = daemon();
        daemon.reconcile().await.unwrap();

        let mut remote = shared.snapshot().unwrap();
        draw(&mut remote, "them");
        remote.last_modified += 1;
        shared.seed(&remote);

        let daemon = Arc::new(daemon);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let runner = {
            let daemon = Arc::clone(&daemon);
            tokio::spawn(async move {
                daemon
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        stop_tx.send(()).unwrap();
        runner.await.unwrap().unwrap();

        assert_eq!(daemon.board().strokes, remote.strokes);
        assert_eq!(local.snapshot().unwrap().strokes, remote.strokes);
        assert_eq!(daemon.watermark(), remote.last_modified);
    }
}
