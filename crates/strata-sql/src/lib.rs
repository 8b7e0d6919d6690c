//! Relational storage adapter for Strata, backed by SQLite.
//!
//! Connections come from an `r2d2` pool and are returned to it on every exit
//! path. Object writes use `INSERT OR IGNORE` inside one transaction per
//! batch, so batches are atomic. Reference updates run inside an `IMMEDIATE`
//! transaction as a conditional `UPDATE ... WHERE generation = ?`, together
//! with any global-state upserts.
//!
//! # Schema
//!
//! ```text
//! commits(hash PK, parent_hashes, seq, data)
//! contents(content_id, version, data, PK(content_id, version))
//! refs(name PK, hash, generation, data)
//! key_lists(commit_hash PK, data)
//! global_state(content_id PK, data)
//! ```

pub mod adapter;
pub mod config;
mod schema;

pub use adapter::SqliteAdapter;
pub use config::SqliteConfig;

use std::sync::Arc;

use strata_store::{Adapter, StoreConfig, StoreResult};

/// Registry name of this backend.
pub const BACKEND: &str = "sqlite";

/// [`AdapterFactory`](strata_store::AdapterFactory) for the registry.
pub fn factory(config: &StoreConfig) -> StoreResult<Arc<dyn Adapter>> {
    Ok(Arc::new(SqliteAdapter::open(config.adapter_settings()?)?))
}
