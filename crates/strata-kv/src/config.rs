use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings for [`RedbAdapter`](crate::RedbAdapter).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedbConfig {
    /// Database file. Parent directories are created if missing.
    pub path: PathBuf,
}

impl Default for RedbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("strata.redb"),
        }
    }
}

impl RedbConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}
