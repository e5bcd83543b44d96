//! Store traits for the two replicas a synchronizer reconciles.
//!
//! Implementations:
//! - `InMemoryStore` - For testing and embedding
//! - `FileStore` (in board-sync-daemon) - JSON files via tokio::fs
//!
//! Both sides persist whole documents. The validity gate lives in
//! [`decode`]: anything that does not carry the expected schema marker is a
//! `SchemaMismatch`, which callers treat exactly like `NotFound`.

use crate::document::{Document, SCHEMA_VERSION};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Which replica the active whiteboard tab edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tab {
    /// The user's private board, persisted to the local store
    Local,
    /// The collectively edited board, persisted to the shared store with retry
    Shared,
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tab::Local => f.write_str("local"),
            Tab::Shared => f.write_str("shared"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No persisted document")]
    NotFound,

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether this error means "no usable document", which resolves to the
    /// default document rather than a failure.
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::NotFound | StoreError::SchemaMismatch(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Serialize a document for persistence.
///
/// Non-finite stroke geometry is refused: JSON would store it as `null`, and
/// the document would then fail the validity gate on its next read.
pub fn encode(document: &Document) -> Result<Vec<u8>> {
    if let Some(stroke) = document.strokes.iter().find(|s| !s.is_finite()) {
        return Err(StoreError::Serialization(format!(
            "stroke {} has non-finite geometry",
            stroke.id
        )));
    }
    serde_json::to_vec(document).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Parse persisted bytes, accepting only documents with the expected schema marker.
pub fn decode(bytes: &[u8]) -> Result<Document> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| StoreError::SchemaMismatch(e.to_string()))?;

    match value.get("version").and_then(serde_json::Value::as_u64) {
        Some(v) if v == u64::from(SCHEMA_VERSION) => {}
        Some(v) => {
            return Err(StoreError::SchemaMismatch(format!(
                "expected version {SCHEMA_VERSION}, found {v}"
            )));
        }
        None => {
            return Err(StoreError::SchemaMismatch(
                "missing version marker".to_string(),
            ));
        }
    }

    serde_json::from_value(value).map_err(|e| StoreError::SchemaMismatch(e.to_string()))
}

/// The user's private replica.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read the persisted document. `Ok(None)` when nothing usable is stored.
    async fn read(&self) -> Result<Option<Document>>;

    /// Persist the document wholesale.
    async fn write(&self, document: &Document) -> Result<()>;
}

/// The collectively edited replica. Reads and writes may transiently fail.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Fetch the shared document.
    async fn read(&self) -> Result<Document>;

    /// Persist the document wholesale.
    async fn write(&self, document: &Document) -> Result<()>;
}

/// In-memory store for testing.
///
/// Holds the raw persisted payload so the validity gate runs on every read,
/// and supports injecting transient failures.
pub struct InMemoryStore {
    payload: RwLock<Option<Vec<u8>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failing_reads: AtomicUsize,
    failing_writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            payload: RwLock::new(None),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            failing_reads: AtomicUsize::new(0),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Create a store already holding `document`.
    pub fn with_document(document: &Document) -> Self {
        let store = Self::new();
        store.seed(document);
        store
    }

    /// Replace the stored document without counting a write.
    pub fn seed(&self, document: &Document) {
        let bytes = serde_json::to_vec(document).unwrap_or_default();
        self.seed_raw(bytes);
    }

    /// Replace the stored payload with arbitrary bytes.
    pub fn seed_raw(&self, bytes: impl Into<Vec<u8>>) {
        *self.payload.write().unwrap_or_else(|e| e.into_inner()) = Some(bytes.into());
    }

    /// Decode the currently stored document, if any.
    pub fn snapshot(&self) -> Option<Document> {
        let payload = self.payload.read().unwrap_or_else(|e| e.into_inner());
        payload.as_deref().and_then(|bytes| decode(bytes).ok())
    }

    /// Make the next `n` reads fail with `Unavailable`.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes fail with `Unavailable`.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Number of read attempts, failed ones included.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write attempts, failed ones included.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn load(&self) -> Result<Document> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_reads) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        let payload = self.payload.read().unwrap_or_else(|e| e.into_inner());
        match payload.as_deref() {
            Some(bytes) => decode(bytes),
            None => Err(StoreError::NotFound),
        }
    }

    fn store(&self, document: &Document) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        let bytes = encode(document)?;
        *self.payload.write().unwrap_or_else(|e| e.into_inner()) = Some(bytes);
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for InMemoryStore {
    async fn read(&self) -> Result<Option<Document>> {
        match self.load() {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_missing() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, document: &Document) -> Result<()> {
        self.store(document)
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn read(&self) -> Result<Document> {
        self.load()
    }

    async fn write(&self, document: &Document) -> Result<()> {
        self.store(document)
    }
}

// Forward both traits through Arc so one store can back several handles in tests
#[async_trait]
impl<T: LocalStore + ?Sized> LocalStore for std::sync::Arc<T> {
    async fn read(&self) -> Result<Option<Document>> {
        (**self).read().await
    }

    async fn write(&self, document: &Document) -> Result<()> {
        (**self).write(document).await
    }
}

#[async_trait]
impl<T: SharedStore + ?Sized> SharedStore for std::sync::Arc<T> {
    async fn read(&self) -> Result<Document> {
        (**self).read().await
    }

    async fn write(&self, document: &Document) -> Result<()> {
        (**self).write(document).await
    }
}
