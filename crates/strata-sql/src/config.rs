use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for [`SqliteAdapter`](crate::SqliteAdapter), read from the
/// `[settings]` table of the store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file. Created if missing.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// How long a statement waits on a locked database before failing with
    /// a timeout.
    pub busy_timeout_ms: u64,
    /// How long to wait for a pooled connection.
    pub connect_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("strata.db"),
            pool_size: 8,
            busy_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl SqliteConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
