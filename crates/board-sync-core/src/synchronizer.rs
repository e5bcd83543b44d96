//! Synchronizer: the reconciliation API the whiteboard UI talks to.
//!
//! Owns the two stores, the debounced writer, the snapshot cache and the
//! event bus for one board. Only operations a user triggers directly
//! (`connect_shared`, `save_now`, `flush`) return errors; background saves
//! and polling log failures and heal on the next successful cycle.

use crate::cache::SnapshotCache;
use crate::config::SyncConfig;
use crate::debounce::DebouncedWriter;
use crate::diagnostics::check_warnings_with;
use crate::document::Document;
use crate::events::EventBus;
use crate::merge;
use crate::poll::{PollHandle, PollLoop};
use crate::retry::RetryError;
use crate::store::{LocalStore, SharedStore, StoreError, Tab};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Shared write failed after {attempts} attempt(s): {reason}")]
    WriteFailed { attempts: u32, reason: String },
}

impl From<RetryError> for SyncError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::Exhausted { attempts, reason } => SyncError::WriteFailed { attempts, reason },
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Reconciles one board's local replica with its shared replica.
pub struct Synchronizer<L, S> {
    local: Arc<L>,
    shared: Arc<S>,
    config: SyncConfig,
    events: Arc<EventBus>,
    cache: Arc<SnapshotCache>,
    writer: DebouncedWriter<L, S>,
}

impl<L, S> Synchronizer<L, S>
where
    L: LocalStore + 'static,
    S: SharedStore + 'static,
{
    pub fn new(local: Arc<L>, shared: Arc<S>, config: SyncConfig) -> Self {
        let events = Arc::new(EventBus::new());
        let cache = Arc::new(SnapshotCache::new());
        let writer = DebouncedWriter::new(
            Arc::clone(&local),
            Arc::clone(&shared),
            config.debounce,
            config.retry.clone(),
            Arc::clone(&events),
            Arc::clone(&cache),
        );

        Self {
            local,
            shared,
            config,
            events,
            cache,
            writer,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Event bus carrying saves, retries, remote updates and poll failures.
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn create_default(&self) -> Document {
        Document::create_default()
    }

    pub fn merge(&self, local: &Document, remote: &Document) -> Document {
        merge::merge(local, remote)
    }

    pub fn check_warnings(&self, document: &Document) -> Vec<String> {
        check_warnings_with(document, &self.config.diagnostics)
    }

    /// Load the private replica, substituting the default document when
    /// nothing usable is stored or the store cannot be read.
    pub async fn load_local(&self) -> Document {
        match LocalStore::read(&*self.local).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!("No local board stored, starting from default");
                Document::create_default()
            }
            Err(e) => {
                warn!("Failed to read local board, starting from default: {}", e);
                Document::create_default()
            }
        }
    }

    /// Initial, user-initiated load of the shared replica.
    ///
    /// A missing or unrecognized shared document yields the default; a
    /// backend failure is returned so the UI can report it.
    pub async fn connect_shared(&self) -> Result<Document> {
        match SharedStore::read(&*self.shared).await {
            Ok(document) => {
                self.cache.set(document.clone());
                Ok(document)
            }
            Err(e) if e.is_missing() => {
                debug!("No usable shared board ({}), starting from default", e);
                Ok(Document::create_default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The last shared document this synchronizer saw, reading through on a miss.
    pub async fn shared_snapshot(&self) -> Result<Document> {
        if let Some(document) = self.cache.get() {
            return Ok(document);
        }
        self.connect_shared().await
    }

    /// Persist immediately on behalf of the user. Terminal failures are returned.
    pub async fn save_now(&self, tab: Tab, document: Document) -> Result<Document> {
        self.writer.persist_now(tab, document).await
    }

    /// Queue `document` for a debounced save to the replica backing `tab`.
    pub fn schedule_save(&self, tab: Tab, document: Document) {
        self.writer.schedule(tab, document);
    }

    /// Write any pending debounced save now.
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    pub fn has_pending_save(&self) -> bool {
        self.writer.has_pending()
    }

    /// Start polling the shared replica at the configured interval.
    pub fn start_polling<F, W>(&self, on_update: F, last_known_modified: W) -> PollHandle
    where
        F: Fn(Document) + Send + Sync + 'static,
        W: Fn() -> u64 + Send + Sync + 'static,
    {
        PollLoop::new(Arc::clone(&self.shared), self.config.poll_interval)
            .with_events(Arc::clone(&self.events))
            .with_cache(Arc::clone(&self.cache))
            .start(on_update, last_known_modified)
    }
}
