//! Embedded key-value storage adapter for Strata, backed by redb.
//!
//! Everything lives in a single `.redb` file. Each batch of objects is
//! written in one write transaction. A reference update is a
//! read-compare-insert inside one write transaction; redb serializes write
//! transactions, which makes the swap linearizable.
//!
//! The adapter reports itself as transactional: global-state records that
//! accompany a reference update commit in the swap's write transaction.
//!
//! # Tables
//!
//! ```text
//! commits       hash                  -> commit frame
//! contents      version ‖ content id  -> content frame
//! refs          name                  -> reference frame
//! key_lists     commit hash           -> key-list frame
//! global_state  content id            -> global-state frame
//! ```

pub mod adapter;
pub mod config;

pub use adapter::RedbAdapter;
pub use config::RedbConfig;

use std::sync::Arc;

use strata_store::{Adapter, StoreConfig, StoreResult};

/// Registry name of this backend.
pub const BACKEND: &str = "redb";

/// [`AdapterFactory`](strata_store::AdapterFactory) for the registry.
pub fn factory(config: &StoreConfig) -> StoreResult<Arc<dyn Adapter>> {
    Ok(Arc::new(RedbAdapter::open(config.adapter_settings()?)?))
}
