//! Synchronizer configuration.
//!
//! All durations are expressed in milliseconds when (de)serialized, so a
//! config file reads `{"debounce": 500, "pollInterval": 2500, ...}`.

use crate::diagnostics::DiagnosticsConfig;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quiescence window before a scheduled save is committed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Default interval between shared-replica fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Quiescence window for the debounced writer
    #[serde(with = "duration_ms")]
    pub debounce: Duration,
    /// Poll loop tick interval
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Shared-store write retry policy
    pub retry: RetryConfig,
    /// Advisory size thresholds
    pub diagnostics: DiagnosticsConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parse a JSON config. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
