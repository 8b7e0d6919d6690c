//! Strata: a content-addressed version store.
//!
//! Commits, contents and references live in a pluggable storage backend;
//! branches move only through compare-and-swap, so any number of writers can
//! share one store. [`VersionStore`] is the entry point for applications.
//!
//! # Architecture
//!
//! ```text
//! strata (VersionStore, backend registry)
//!   └── strata-refs   commit protocol, reference lifecycle, merges
//!         └── strata-merge   common ancestors, rebase, merge plans
//!               └── strata-store   Adapter SPI, errors, config, scans
//!                     ├── strata-sql    SQLite
//!                     ├── strata-kv     redb
//!                     └── strata-mongo  MongoDB (feature `mongodb`)
//! ```
//!
//! # Example
//!
//! ```
//! use strata::{CommitMeta, CommitRequest, ContentId, ContentKey, ContentObject, ContentType, StoreConfig, VersionStore};
//!
//! let store = VersionStore::open(&StoreConfig::default())?;
//! store.initialize()?;
//!
//! let table = ContentObject::new(ContentId::generate(), ContentType::TABLE, b"{}".to_vec());
//! let request = CommitRequest::new("main", CommitMeta::new("alice", "add orders"))
//!     .put(ContentKey::parse("sales.orders")?, table);
//! let result = store.commit(request)?;
//! assert_eq!(store.get_reference("main")?.hash, result.commit.hash());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod registry;
pub mod store;

pub use registry::builtin_registry;
pub use store::{VersionStore, DEFAULT_BRANCH};

// Re-export the types callers work with.
pub use strata_merge::{MergeBehavior, MergeBehaviors, MergePlan, MergePolicies, MergePolicy, PolicyDecision};
pub use strata_model::{
    Commit, CommitBuilder, ContentObject, GenerationToken, GlobalState, KeyEntry, KeyList, Operation,
    ReferenceKind, ReferenceRecord,
};
pub use strata_refs::{CommitLog, CommitRequest, CommitResult, MergeRequest, MergeResult};
pub use strata_store::{
    Adapter, AdapterRegistry, Cancellation, CommitConfig, Missing, ResumeToken, ScanKeys, ScanOptions, StoreConfig,
    StoreError, StoreResult,
};
pub use strata_types::{CommitMeta, ContentId, ContentKey, ContentType, Hash};
