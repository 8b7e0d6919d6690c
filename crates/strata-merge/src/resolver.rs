use std::collections::{BTreeMap, BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};
use strata_model::Operation;
use strata_store::{Adapter, StoreError, StoreResult};
use strata_types::{ContentKey, Hash};

use crate::policy::{MergePolicies, PolicyDecision};

/// Most recent change to a key on one side of a divergence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub commit: Hash,
    pub operation: Operation,
}

/// A proposal re-parented onto the actual head of a reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rebase {
    /// New parent for the proposal.
    pub onto: Hash,
    pub ancestor: Hash,
    /// Proposed operations that survive, in their original order.
    pub operations: Vec<Operation>,
    /// Keys whose proposed operation a policy discarded.
    pub dropped: Vec<ContentKey>,
}

/// How the merge treats one key changed on the source side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeBehavior {
    /// Apply the change; a concurrent change on the target goes through the
    /// content type's merge policy.
    #[default]
    Normal,
    /// Apply the change regardless of the target.
    Force,
    /// Leave the key as it is on the target.
    Drop,
}

/// Per-key merge behaviors with a default for unlisted keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeBehaviors {
    pub default: MergeBehavior,
    pub keys: BTreeMap<ContentKey, MergeBehavior>,
}

impl MergeBehaviors {
    pub fn with(mut self, key: ContentKey, behavior: MergeBehavior) -> Self {
        self.keys.insert(key, behavior);
        self
    }

    pub fn for_key(&self, key: &ContentKey) -> MergeBehavior {
        self.keys.get(key).copied().unwrap_or(self.default)
    }
}

/// Outcome of planning a merge of `source` into `target`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergePlan {
    pub source: Hash,
    pub target: Hash,
    pub ancestor: Hash,
    /// Operations the merge commit applies on top of `target`, by key.
    pub operations: Vec<Operation>,
    /// Keys changed on both sides that the policies rejected, sorted.
    pub conflicts: Vec<ContentKey>,
    /// Keys left untouched because of a `Drop` behavior or a policy.
    pub dropped: Vec<ContentKey>,
}

impl MergePlan {
    /// The source is already reachable from the target.
    pub fn is_noop(&self) -> bool {
        self.ancestor == self.source
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// A commit waiting in the common-ancestor queue, ordered by `seq` first.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    seq: u64,
    hash: Hash,
    parents: Vec<Hash>,
}

const FROM_A: u8 = 0b01;
const FROM_B: u8 = 0b10;
const FROM_BOTH: u8 = FROM_A | FROM_B;

/// Detects concurrent changes between diverging histories.
///
/// Reads commits through the adapter only; it never writes.
pub struct ConflictResolver<'a> {
    adapter: &'a dyn Adapter,
    policies: &'a MergePolicies,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(adapter: &'a dyn Adapter, policies: &'a MergePolicies) -> Self {
        Self { adapter, policies }
    }

    // ---------------------------------------------------------------
    // History queries
    // ---------------------------------------------------------------

    /// Lowest common ancestor of `a` and `b`.
    ///
    /// Both sides are walked backwards together, highest `seq` first, and
    /// every commit remembers which side reached it. A parent always has a
    /// lower `seq` than its child, so a commit is only popped once all of its
    /// reachable descendants have been, and the first commit reached from
    /// both sides has no common ancestor below it. Unrelated histories meet
    /// at [`Hash::NO_ANCESTOR`].
    pub fn common_ancestor(&self, a: Hash, b: Hash) -> StoreResult<Hash> {
        if a == b {
            return Ok(a);
        }
        let mut reached = HashMap::from([(a, FROM_A), (b, FROM_B)]);
        let mut queue = BinaryHeap::from([self.pending(a)?, self.pending(b)?]);

        while let Some(next) = queue.pop() {
            let sides = reached.get(&next.hash).copied().unwrap_or_default();
            if sides == FROM_BOTH {
                return Ok(next.hash);
            }
            for parent in next.parents {
                let seen = reached.entry(parent).or_default();
                let queued = *seen != 0;
                *seen |= sides;
                if !queued {
                    queue.push(self.pending(parent)?);
                }
            }
        }
        Ok(Hash::NO_ANCESTOR)
    }

    fn pending(&self, hash: Hash) -> StoreResult<Pending> {
        if hash.is_no_ancestor() {
            return Ok(Pending {
                seq: 0,
                hash,
                parents: Vec::new(),
            });
        }
        let commit = self.adapter.get_commit(&hash)?;
        let parents = if commit.is_root() {
            vec![Hash::NO_ANCESTOR]
        } else {
            commit.parents().to_vec()
        };
        Ok(Pending {
            seq: commit.seq(),
            hash,
            parents,
        })
    }

    /// Every key changed between `ancestor` (exclusive) and `head`, walking
    /// first parents. The newest change to a key wins.
    ///
    /// If `ancestor` is not on the first-parent chain of `head` the walk runs
    /// to the root, which over-reports changes but never misses one.
    pub fn changes_since(&self, head: Hash, ancestor: Hash) -> StoreResult<BTreeMap<ContentKey, Change>> {
        let mut changes = BTreeMap::new();
        let mut next = head;
        while next != ancestor && !next.is_no_ancestor() {
            let commit = self.adapter.get_commit(&next)?;
            for op in commit.operations() {
                changes.entry(op.key().clone()).or_insert_with(|| Change {
                    commit: commit.hash(),
                    operation: op.clone(),
                });
            }
            next = commit.parent();
        }
        Ok(changes)
    }

    // ---------------------------------------------------------------
    // Rebase and merge
    // ---------------------------------------------------------------

    /// Re-parent `operations`, written against `expected`, onto `actual`.
    ///
    /// Fails with `MergeConflict` listing every proposed key that was also
    /// changed on the actual side since the common ancestor, unless the
    /// policy for its content type resolves it.
    pub fn rebase(&self, expected: Hash, actual: Hash, operations: Vec<Operation>) -> StoreResult<Rebase> {
        if expected == actual {
            return Ok(Rebase {
                onto: actual,
                ancestor: actual,
                operations,
                dropped: Vec::new(),
            });
        }

        let ancestor = self.common_ancestor(expected, actual)?;
        let concurrent = self.changes_since(actual, ancestor)?;

        let mut kept = Vec::with_capacity(operations.len());
        let mut dropped = Vec::new();
        let mut conflicts = Vec::new();
        for op in operations {
            let Some(change) = concurrent.get(op.key()) else {
                kept.push(op);
                continue;
            };
            match self.policies.decide(op.key(), &change.operation, &op) {
                PolicyDecision::Conflict => conflicts.push(op.key().clone()),
                PolicyDecision::KeepProposed => kept.push(op),
                PolicyDecision::KeepExisting => dropped.push(op.key().clone()),
            }
        }

        if !conflicts.is_empty() {
            tracing::debug!(
                expected = %expected.short_hex(),
                actual = %actual.short_hex(),
                conflicts = conflicts.len(),
                "proposal collides with concurrent changes"
            );
            return Err(StoreError::merge_conflict(conflicts));
        }
        tracing::debug!(
            expected = %expected.short_hex(),
            actual = %actual.short_hex(),
            ancestor = %ancestor.short_hex(),
            concurrent = concurrent.len(),
            "rebased proposal"
        );
        Ok(Rebase {
            onto: actual,
            ancestor,
            operations: kept,
            dropped,
        })
    }

    /// Plan merging `source` into `target`.
    ///
    /// Changes made on the source side since the common ancestor are applied
    /// according to `behaviors`. A key changed identically on both sides
    /// needs no operation. The plan is returned even when it has conflicts,
    /// so callers can report it as a dry run.
    pub fn plan_merge(&self, source: Hash, target: Hash, behaviors: &MergeBehaviors) -> StoreResult<MergePlan> {
        let ancestor = self.common_ancestor(source, target)?;
        let mut plan = MergePlan {
            source,
            target,
            ancestor,
            operations: Vec::new(),
            conflicts: Vec::new(),
            dropped: Vec::new(),
        };
        if plan.is_noop() {
            return Ok(plan);
        }

        let incoming = self.changes_since(source, ancestor)?;
        let existing = self.changes_since(target, ancestor)?;
        for (key, change) in incoming {
            let op = change.operation;
            match behaviors.for_key(&key) {
                MergeBehavior::Drop => plan.dropped.push(key),
                MergeBehavior::Force => plan.operations.push(op),
                MergeBehavior::Normal => match existing.get(&key) {
                    None => plan.operations.push(op),
                    Some(theirs) if theirs.operation == op => {}
                    Some(theirs) => match self.policies.decide(&key, &theirs.operation, &op) {
                        PolicyDecision::Conflict => plan.conflicts.push(key),
                        PolicyDecision::KeepProposed => plan.operations.push(op),
                        PolicyDecision::KeepExisting => plan.dropped.push(key),
                    },
                },
            }
        }

        tracing::debug!(
            source = %source.short_hex(),
            target = %target.short_hex(),
            ancestor = %ancestor.short_hex(),
            operations = plan.operations.len(),
            conflicts = plan.conflicts.len(),
            "planned merge"
        );
        Ok(plan)
    }
}
