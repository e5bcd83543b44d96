//! board-sync-core: shared-document synchronization for collaborative whiteboards.
//!
//! This crate provides the core functionality for:
//! - The whiteboard document model exchanged between replicas
//! - Local/shared store abstractions with a schema-version validity gate
//! - Identity-based stroke merge between a local and a shared snapshot
//! - Debounced persistence, polling, and retried shared writes
//! - Advisory size diagnostics

pub mod cache;
pub mod config;
pub mod debounce;
pub mod diagnostics;
pub mod document;
pub mod events;
pub mod merge;
pub mod poll;
pub mod retry;
pub mod store;
pub mod synchronizer;

pub use cache::SnapshotCache;
pub use config::SyncConfig;
pub use debounce::DebouncedWriter;
pub use diagnostics::{DiagnosticsConfig, check_warnings, check_warnings_with};
pub use document::{Document, Layer, LayerId, Point, Stroke, StrokeId, Tool};
pub use events::{EventBus, Subscription, SyncEvent};
pub use merge::{has_unpushed_strokes, merge};
pub use poll::{PollHandle, PollLoop, start_polling};
pub use retry::{RetryConfig, RetryError, write_with_retry};
pub use store::{InMemoryStore, LocalStore, SharedStore, StoreError, Tab};
pub use synchronizer::{SyncError, Synchronizer};
