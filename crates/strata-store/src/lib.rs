//! Backend adapter interface for Strata.
//!
//! Every physical backend implements the [`Adapter`] trait. The contract is
//! deliberately small: point reads, idempotent batched writes of immutable
//! objects, and one atomicity-critical operation, [`Adapter::cas_reference`].
//! Key-space materialization ([`scan_keys`]) is written once on top of it.
//!
//! # Backends
//!
//! - [`InMemoryAdapter`] -- transactional, `RwLock`-based; used for tests and
//!   as the reference for the conformance suite
//! - `strata-sql`, `strata-kv`, `strata-mongo` -- SQLite, redb and MongoDB
//!
//! Backends are selected by name through an [`AdapterRegistry`] from a
//! [`StoreConfig`].
//!
//! # Design Rules
//!
//! 1. Commits, contents and key lists are immutable and content-addressed;
//!    re-writing them is always safe.
//! 2. A reference only changes through a compare-and-swap on its generation
//!    token, executed by the backend. No in-process lock orders updates.
//! 3. Backend-native errors are translated into [`StoreError`] at the adapter
//!    boundary.
//! 4. Only idempotent operations are retried blindly.

pub mod adapter;
pub mod config;
pub mod error;
pub mod memory;
pub mod registry;
pub mod retry;
pub mod scan;

#[cfg(any(test, feature = "conformance"))]
pub mod conformance;

pub use adapter::{Adapter, Capabilities, CasOutcome, ReferenceUpdate};
pub use config::{CommitConfig, StoreConfig};
pub use error::{Missing, StoreError, StoreResult};
pub use memory::InMemoryAdapter;
pub use registry::{AdapterFactory, AdapterRegistry};
pub use retry::RetryPolicy;
pub use scan::{key_space, scan_keys, Cancellation, ResumeToken, ScanKeys, ScanOptions};
