//! Retry wrapper for shared-store writes.
//!
//! Shared backends (network shares, synced folders) drop out briefly, so a
//! write is attempted a bounded number of times with a fixed pause between
//! attempts. There is no outbox: a write that exhausts its attempts is gone
//! until the next local mutation schedules a fresh one.

use crate::config::duration_ms;
use crate::document::Document;
use crate::events::{EventBus, SyncEvent};
use crate::store::SharedStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for write retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Fixed delay between attempts
    #[serde(with = "duration_ms")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("Write failed after {attempts} attempt(s): {reason}")]
    Exhausted { attempts: u32, reason: String },
}

/// Write `document` to `store`, retrying transient failures.
///
/// Returns the number of attempts it took on success.
pub async fn write_with_retry<S: SharedStore + ?Sized>(
    store: &S,
    document: &Document,
    config: &RetryConfig,
    events: Option<&EventBus>,
) -> Result<u32, RetryError> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match store.write(document).await {
            Ok(()) => {
                debug!("Shared write succeeded on attempt {}", attempt);
                return Ok(attempt);
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    "Shared write attempt {}/{} failed: {}",
                    attempt, max_attempts, reason
                );
                if let Some(bus) = events {
                    bus.emit(SyncEvent::WriteRetry {
                        attempt,
                        reason: reason.clone(),
                    });
                }
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        reason,
                    });
                }
            }
        }

        tokio::time::sleep(config.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_write_stops_at_bound() {
        let store = InMemoryStore::new();
        store.fail_next_writes(usize::MAX);
        let config = RetryConfig::default();

        let result = write_with_retry(&store, &Document::create_default(), &config, None).await;

        assert_eq!(store.write_count(), 3);
        match result {
            Err(RetryError::Exhausted { attempts, reason }) => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("injected write failure"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_once_then_succeed_takes_two_attempts() {
        let store = InMemoryStore::new();
        store.fail_next_writes(1);
        let doc = Document::create_default();

        let attempts = write_with_retry(&store, &doc, &RetryConfig::default(), None)
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.snapshot(), Some(doc));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_fixed_delay_between_attempts() {
        let store = InMemoryStore::new();
        store.fail_next_writes(usize::MAX);
        let config = RetryConfig {
            max_attempts: 4,
            delay: Duration::from_millis(500),
        };

        let start = tokio::time::Instant::now();
        let _ = write_with_retry(&store, &Document::create_default(), &config, None).await;

        // Three pauses between four attempts, none after the last
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_retry_events() {
        let store = InMemoryStore::new();
        store.fail_next_writes(2);
        let bus = Arc::new(EventBus::new());
        let retries = Arc::new(AtomicU32::new(0));
        let retries_clone = Arc::clone(&retries);
        let _sub = bus.subscribe(move |event| {
            if let SyncEvent::WriteRetry { .. } = event {
                retries_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        let attempts = write_with_retry(
            &store,
            &Document::create_default(),
            &RetryConfig::default(),
            Some(&bus),
        )
        .await
        .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let store = InMemoryStore::new();
        let config = RetryConfig {
            max_attempts: 0,
            delay: Duration::from_millis(10),
        };

        let attempts = write_with_retry(&store, &Document::create_default(), &config, None)
            .await
            .unwrap();
        assert_eq!(attempts, 1);
    }
}
