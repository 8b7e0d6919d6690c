use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Top-level store configuration, usually read from TOML:
///
/// ```toml
/// backend = "sqlite"
///
/// [commit]
/// max_retries = 8
///
/// [settings]
/// path = "/var/lib/strata/store.db"
/// ```
///
/// `settings` is opaque here; the selected adapter parses it into its own
/// typed configuration with [`StoreConfig::adapter_settings`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Registry name of the backend.
    pub backend: String,
    pub commit: CommitConfig,
    pub settings: toml::Table,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            commit: CommitConfig::default(),
            settings: toml::Table::new(),
        }
    }
}

impl StoreConfig {
    /// Configuration for `backend` with default commit settings.
    pub fn for_backend(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Self::default()
        }
    }

    /// Set one adapter setting.
    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.settings.insert(name.into(), value.into());
        self
    }

    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::InvalidArgument(format!("invalid configuration: {e}")))
    }

    /// Read configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidArgument(format!("cannot read configuration {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse `settings` into an adapter's typed configuration.
    pub fn adapter_settings<T: DeserializeOwned>(&self) -> StoreResult<T> {
        toml::Value::Table(self.settings.clone())
            .try_into()
            .map_err(|e| {
                StoreError::InvalidArgument(format!("invalid {} settings: {e}", self.backend))
            })
    }
}

/// Tuning of the commit protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Attempts at the reference update before giving up.
    pub max_retries: u32,
    pub retry_backoff_min_ms: u64,
    pub retry_backoff_max_ms: u64,
    /// A key-list snapshot is written for every commit whose `seq` is a
    /// multiple of this. Zero disables snapshots.
    pub key_list_distance: u64,
    /// Time budget for a single commit or scan.
    pub call_timeout_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            retry_backoff_min_ms: 5,
            retry_backoff_max_ms: 250,
            key_list_distance: 20,
            call_timeout_ms: 30_000,
        }
    }
}

impl CommitConfig {
    pub fn retry_backoff_min(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_min_ms)
    }

    pub fn retry_backoff_max(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_max_ms.max(self.retry_backoff_min_ms))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct FileSettings {
        path: String,
        pool_size: u32,
    }

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, "memory");
        assert_eq!(config.commit.key_list_distance, 20);
        assert_eq!(config.commit.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parses_toml_with_partial_sections() {
        let config = StoreConfig::from_toml_str(
            r#"
            backend = "sqlite"

            [commit]
            max_retries = 3

            [settings]
            path = "/tmp/x.db"
            pool_size = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, "sqlite");
        assert_eq!(config.commit.max_retries, 3);
        assert_eq!(config.commit.retry_backoff_max_ms, 250);

        let settings: FileSettings = config.adapter_settings().unwrap();
        assert_eq!(
            settings,
            FileSettings {
                path: "/tmp/x.db".into(),
                pool_size: 4
            }
        );
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            StoreConfig::from_toml_str("backend = "),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn with_setting_feeds_adapter_settings() {
        let config = StoreConfig::for_backend("redb").with_setting("path", "/data/s.redb");
        let settings: FileSettings = config.adapter_settings().unwrap();
        assert_eq!(settings.path, "/data/s.redb");
        assert_eq!(settings.pool_size, 0);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(&path, "backend = \"redb\"\n[commit]\nkey_list_distance = 5\n").unwrap();
        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.backend, "redb");
        assert_eq!(config.commit.key_list_distance, 5);
        assert!(StoreConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
