//! Conflict resolution for Strata.
//!
//! When a writer built its change against a commit that is no longer the
//! head of the reference, the [`ConflictResolver`] decides whether the change
//! can be re-parented onto the actual head:
//!
//! 1. find the common ancestor of the expected and actual heads by
//!    a joint backward traversal in `seq` order
//!    ([`ConflictResolver::common_ancestor`]);
//! 2. collect every key changed on the actual side since that ancestor
//!    ([`ConflictResolver::changes_since`]);
//! 3. compare with the keys of the proposed operations. Each collision is
//!    offered to the [`MergePolicy`] registered for its content type; the
//!    default policy rejects.
//!
//! All colliding keys are reported together in one
//! [`StoreError::MergeConflict`](strata_store::StoreError::MergeConflict).
//! The same machinery plans merges of one commit into another
//! ([`ConflictResolver::plan_merge`]).

pub mod policy;
pub mod resolver;

pub use policy::{
    MergePolicies, MergePolicy, PolicyDecision, PreferExisting, PreferProposed, RejectOnCollision,
};
pub use resolver::{Change, ConflictResolver, MergeBehavior, MergeBehaviors, MergePlan, Rebase};
