use board_sync_core::SyncConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration resolved from the command line and an optional JSON file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Private replica file
    pub local_path: PathBuf,
    /// Shared replica file (usually on a synced or network mount)
    pub shared_path: PathBuf,
    pub sync: SyncConfig,
}

impl Config {
    /// Resolve the replica paths (supports ~ for home directory) and load
    /// tuning from `config_file` when given.
    pub fn load(local: &str, shared: &str, config_file: Option<&str>) -> Result<Self, ConfigError> {
        let local_path = expand_tilde(local);
        let shared_path = expand_tilde(shared);
        if local_path == shared_path {
            return Err(ConfigError::SamePath(local_path));
        }

        let sync = match config_file {
            Some(path) => read_sync_config(&expand_tilde(path))?,
            None => SyncConfig::default(),
        };

        Ok(Self {
            local_path,
            shared_path,
            sync,
        })
    }

    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        if let Some(interval) = interval {
            self.sync.poll_interval = interval;
        }
        self
    }

    pub fn with_debounce(mut self, window: Option<Duration>) -> Self {
        if let Some(window) = window {
            self.sync.debounce = window;
        }
        self
    }
}

fn read_sync_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    SyncConfig::from_json(&json).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Local and shared replicas must be different files: {0:?}")]
    SamePath(PathBuf),

    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
