//! Document-store storage adapter for Strata, backed by MongoDB.
//!
//! Uses the driver's blocking API; the driver owns the connection pool.
//! Every document stores the encoded frame in a binary `data` field next to
//! the fields used for lookups. Reference documents also carry `generation`,
//! and a reference update is a `replace_one` filtered on `{_id, generation}`.
//! MongoDB does not give multi-document atomicity here, so the adapter is
//! non-transactional: batches are idempotent unordered inserts, and global
//! state is upserted after a successful reference swap.
//!
//! # Collections
//!
//! ```text
//! commits       { _id: hash, parents, seq, data }
//! contents      { _id: { content_id, version }, data }
//! refs          { _id: name, hash, generation, data }
//! key_lists     { _id: commit hash, data }
//! global_state  { _id: content id, data }
//! ```

pub mod adapter;
pub mod config;

pub use adapter::MongoAdapter;
pub use config::MongoConfig;

use std::sync::Arc;

use strata_store::{Adapter, StoreConfig, StoreResult};

/// Registry name of this backend.
pub const BACKEND: &str = "mongodb";

/// [`AdapterFactory`](strata_store::AdapterFactory) for the registry.
pub fn factory(config: &StoreConfig) -> StoreResult<Arc<dyn Adapter>> {
    Ok(Arc::new(MongoAdapter::open(config.adapter_settings()?)?))
}
