//! Advisory size checks over a document.
//!
//! Warnings never block a save; they exist so the UI can tell users a board
//! is getting heavy before polling and rewriting it becomes slow.

use crate::config::SyncConfig;
use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Thresholds for [`check_warnings_with`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    /// Stroke count above which a warning is produced
    pub max_strokes: usize,
    /// Serialized size in bytes above which a warning is produced
    pub max_bytes: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_strokes: 10_000,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Check a document against the default thresholds.
pub fn check_warnings(document: &Document) -> Vec<String> {
    check_warnings_with(document, &SyncConfig::default().diagnostics)
}

/// Check a document against custom thresholds.
pub fn check_warnings_with(document: &Document, config: &DiagnosticsConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    let strokes = document.strokes.len();
    if strokes > config.max_strokes {
        warnings.push(format!(
            "Board has {} strokes (more than {}); saving and syncing may slow down",
            strokes, config.max_strokes
        ));
    }

    let bytes = serialized_size(document);
    if bytes > config.max_bytes {
        warnings.push(format!(
            "Board data is {:.1} MiB (more than {:.1} MiB); consider clearing old strokes",
            bytes as f64 / (1024.0 * 1024.0),
            config.max_bytes as f64 / (1024.0 * 1024.0)
        ));
    }

    warnings
}

fn serialized_size(document: &Document) -> usize {
    // Count bytes without materializing the whole payload
    struct Counter(usize);

    impl std::io::Write for Counter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0 += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut counter = Counter(0);
    match serde_json::to_writer(&mut counter, document) {
        Ok(()) => counter.0,
        Err(_) => 0,
    }
}
