//! Last-read snapshot of the shared replica, owned by one synchronizer.

use crate::document::Document;
use std::sync::RwLock;

/// Cache of the most recent shared document this synchronizer has seen.
///
/// Filled by reads and poll ticks, cleared by every shared write so a stale
/// pre-write snapshot is never served back.
#[derive(Default)]
pub struct SnapshotCache {
    snapshot: RwLock<Option<Document>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Document> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Store `document` unless the cache already holds something fresher.
    pub fn set(&self, document: Document) {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(existing) if existing.last_modified > document.last_modified => {}
            _ => *guard = Some(document),
        }
    }

    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
