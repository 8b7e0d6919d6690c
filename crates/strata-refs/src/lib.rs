//! Reference store for Strata.
//!
//! [`ReferenceStore`] turns the adapter's single atomic primitive, a
//! compare-and-swap on a reference's generation token, into the operations
//! callers use: committing to a branch, merging, and managing references.
//!
//! # Commit protocol
//!
//! One commit moves through
//! `Building -> Persisted -> CasPending -> Committed`, or on a rejected swap
//! through `ConflictRetry -> Building` again, at most `max_retries` times
//! before failing with `ConflictExhausted`:
//!
//! 1. read the reference's `(hash, generation)`;
//! 2. if the head moved since the caller's expected commit, let the
//!    [`ConflictResolver`](strata_merge::ConflictResolver) rebase the
//!    proposal onto it or fail with `MergeConflict`;
//! 3. check the operations against the parent's key space;
//! 4. persist contents, the commit and, every `key_list_distance` commits, a
//!    key list (idempotent, retried on transient errors);
//! 5. swap the reference using the generation read in step 1.
//!
//! A swap that fails with `Timeout` or `Connection` may or may not have been
//! applied. The reference is re-read to find out; it is never retried blind.

mod keyspace;
pub mod log;
mod protocol;
pub mod request;
pub mod store;

pub use log::CommitLog;
pub use request::{CommitRequest, CommitResult, MergeRequest, MergeResult};
pub use store::ReferenceStore;
