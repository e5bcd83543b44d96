//! File-backed board store using tokio::fs.
//!
//! One JSON file per replica. Writes go to a sibling temp file first and are
//! renamed into place, so a reader on another machine never sees a torn file.

use async_trait::async_trait;
use board_sync_core::Document;
use board_sync_core::store::{LocalStore, Result, SharedStore, StoreError, decode, encode};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// A board persisted as a single JSON file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file, unique per write so concurrent writers never share one.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        PathBuf::from(name)
    }

    /// Raw file contents, `None` if the file does not exist.
    async fn read_bytes(&self) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        // Create parent directories if needed
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        if let Err(e) = fs::write(&temp, bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn read(&self) -> Result<Option<Document>> {
        let Some(bytes) = self
            .read_bytes()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        else {
            return Ok(None);
        };

        match decode(&bytes) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                warn!("Ignoring unrecognized board file {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    async fn write(&self, document: &Document) -> Result<()> {
        let bytes = encode(document)?;
        self.write_bytes(&bytes)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl SharedStore for FileStore {
    async fn read(&self) -> Result<Document> {
        // Shared mounts fail transiently; surface IO trouble as Unavailable
        let bytes = self
            .read_bytes()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .ok_or(StoreError::NotFound)?;
        decode(&bytes)
    }

    async fn write(&self, document: &Document) -> Result<()> {
        let bytes = encode(document)?;
        self.write_bytes(&bytes)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
