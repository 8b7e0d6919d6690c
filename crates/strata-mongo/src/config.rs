use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for [`MongoAdapter`](crate::MongoAdapter).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// `host:port` seeds.
    pub hosts: Vec<String>,
    pub database: String,
    pub app_name: Option<String>,
    /// How long an operation waits for a usable server before failing.
    pub server_selection_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost:27017".into()],
            database: "strata".into(),
            app_name: Some("strata".into()),
            server_selection_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl MongoConfig {
    /// Parse a comma-separated host list, as found in environment variables.
    pub fn with_hosts(mut self, hosts: &str) -> Self {
        self.hosts = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_millis(self.server_selection_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_list() {
        let config = MongoConfig::default().with_hosts(" a:1, b:2 ,,");
        assert_eq!(config.hosts, vec!["a:1", "b:2"]);
    }
}
