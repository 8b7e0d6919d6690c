use std::convert::Infallible;
use std::sync::Arc;

use strata_merge::{ConflictResolver, MergePolicies};
use strata_model::{Commit, CommitBuilder, ContentObject, Operation, ReferenceKind, ReferenceRecord};
use strata_store::{Adapter, CasOutcome, CommitConfig, ReferenceUpdate, RetryPolicy, StoreError, StoreResult};
use strata_types::{CommitMeta, Hash};

use crate::keyspace::KeySpace;
use crate::log::CommitLog;
use crate::protocol::{Outcome, Step};
use crate::request::{CommitRequest, CommitResult, MergeRequest, MergeResult};

/// Branches, tags and the commits they point at, on top of one adapter.
///
/// Safe to share between threads; every mutation goes through the adapter's
/// compare-and-swap, so concurrent writers never lose each other's commits.
pub struct ReferenceStore {
    pub(crate) adapter: Arc<dyn Adapter>,
    pub(crate) config: CommitConfig,
    pub(crate) retry: RetryPolicy,
    policies: MergePolicies,
}

impl ReferenceStore {
    pub fn new(adapter: Arc<dyn Adapter>, config: CommitConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            adapter,
            config,
            retry,
            policies: MergePolicies::default(),
        }
    }

    /// Replace the policies deciding concurrent changes to the same key.
    pub fn with_policies(mut self, policies: MergePolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn config(&self) -> &CommitConfig {
        &self.config
    }

    pub fn policies(&self) -> &MergePolicies {
        &self.policies
    }

    // ---------------------------------------------------------------
    // Reference lifecycle
    // ---------------------------------------------------------------

    /// Create `name` pointing at `target`, an existing commit or
    /// [`Hash::NO_ANCESTOR`] for an empty branch.
    pub fn create_reference(&self, name: &str, kind: ReferenceKind, target: Hash) -> StoreResult<ReferenceRecord> {
        let record = ReferenceRecord::new(name, kind, target)?;
        self.ensure_commit(target)?;
        self.adapter.add_reference(&record)?;
        tracing::info!(reference = %name, %kind, hash = %target.short_hex(), "created reference");
        Ok(record)
    }

    pub fn get_reference(&self, name: &str) -> StoreResult<ReferenceRecord> {
        self.read_reference(name)
    }

    /// References whose names start with `prefix`, in name order.
    pub fn list_references(&self, prefix: &str) -> StoreResult<Vec<ReferenceRecord>> {
        self.retry.run("list references", || self.adapter.list_references(prefix))
    }

    /// Point `name` at `target` if it still points at `expected`.
    ///
    /// Single-shot: a lost race fails with `ConflictRejected` and is left to
    /// the caller.
    pub fn assign_reference(&self, name: &str, expected: Hash, target: Hash) -> StoreResult<ReferenceRecord> {
        self.ensure_commit(target)?;
        let current = self.read_reference(name)?;
        if current.hash != expected {
            return Err(rejected(name, expected, &current));
        }
        let update = ReferenceUpdate::advance(&current, target);
        match self.adapter.cas_reference(&update)? {
            CasOutcome::Success => {
                let record = update.applied_to(&current);
                tracing::info!(reference = %name, from = %expected.short_hex(), to = %target.short_hex(), "assigned reference");
                Ok(record)
            }
            CasOutcome::ConflictRejected { current } => Err(rejected(name, expected, &current)),
        }
    }

    /// Delete `name` if it still points at `expected`.
    pub fn delete_reference(&self, name: &str, expected: Hash) -> StoreResult<()> {
        let current = self.read_reference(name)?;
        if current.hash != expected {
            return Err(rejected(name, expected, &current));
        }
        match self.adapter.delete_reference(name, current.generation)? {
            CasOutcome::Success => {
                tracing::info!(reference = %name, hash = %expected.short_hex(), "deleted reference");
                Ok(())
            }
            CasOutcome::ConflictRejected { current } => Err(rejected(name, expected, &current)),
        }
    }

    /// Hash named by a reference, or by a full hex commit hash.
    pub fn resolve(&self, name_or_hash: &str) -> StoreResult<Hash> {
        if let Some(record) = self.adapter.find_reference(name_or_hash)? {
            return Ok(record.hash);
        }
        let hash = Hash::from_hex(name_or_hash).map_err(|_| StoreError::reference_not_found(name_or_hash))?;
        self.ensure_commit(hash)?;
        Ok(hash)
    }

    /// First-parent history from a reference or commit hash.
    pub fn log(&self, from: &str) -> StoreResult<CommitLog<'_>> {
        Ok(CommitLog::new(self.adapter(), self.resolve(from)?))
    }

    // ---------------------------------------------------------------
    // Commit and merge
    // ---------------------------------------------------------------

    /// Commit `request` to its branch.
    ///
    /// If the branch moved past `request.expected`, the operations are
    /// rebased onto the new head; keys changed on both sides fail the commit
    /// with `MergeConflict` unless a merge policy resolves them.
    pub fn commit(&self, request: CommitRequest) -> StoreResult<CommitResult> {
        let CommitRequest {
            reference,
            expected,
            meta,
            mut operations,
            contents,
            global_state,
        } = request;

        let mut objects = Vec::with_capacity(contents.len());
        for (key, content) in contents {
            operations.push(content.put_operation(key)?);
            objects.push(content);
        }
        self.persist_contents(&objects)?;

        let resolver = ConflictResolver::new(self.adapter(), &self.policies);
        let mut base = expected;
        let outcome = self.drive(&reference, &global_state, |current| {
            ensure_branch(current)?;
            let expected = *base.get_or_insert(current.hash);
            let rebase = resolver.rebase(expected, current.hash, operations.clone())?;
            if !rebase.dropped.is_empty() {
                tracing::debug!(reference = %current.name, dropped = rebase.dropped.len(), "kept concurrent values");
            }
            let commit = self.prepare(current.hash, &meta, rebase.operations, None)?;
            Ok(Step::<_, Infallible>::Swap {
                target: commit.hash(),
                payload: (commit, current.hash != expected),
            })
        })?;

        match outcome {
            Outcome::Committed {
                reference,
                payload: (commit, rebased),
                attempts,
            } => Ok(CommitResult {
                commit,
                reference,
                attempts,
                rebased,
            }),
            Outcome::Finished(never) => match never {},
        }
    }

    /// Merge `request.source` into the `request.target` branch.
    ///
    /// A target with no commits is fast-forwarded to the source. Otherwise a
    /// merge commit is written whose parents are the target head and the
    /// source. Dry runs and no-op merges return the plan without writing.
    pub fn merge(&self, request: MergeRequest) -> StoreResult<MergeResult> {
        let MergeRequest {
            source,
            target,
            meta,
            behaviors,
            dry_run,
        } = request;

        let source_commit = match source.is_no_ancestor() {
            true => None,
            false => Some(self.read_commit(source)?),
        };
        let resolver = ConflictResolver::new(self.adapter(), &self.policies);

        let outcome = self.drive(&target, &[], |current| {
            ensure_branch(current)?;
            let plan = resolver.plan_merge(source, current.hash, &behaviors)?;
            if plan.is_noop() || dry_run {
                return Ok(Step::Finish(MergeResult {
                    plan,
                    commit: None,
                    reference: current.clone(),
                    applied: false,
                }));
            }
            if plan.has_conflicts() {
                return Err(StoreError::merge_conflict(plan.conflicts.clone()));
            }
            if current.hash.is_no_ancestor() {
                return Ok(Step::Swap {
                    target: source,
                    payload: (plan, None),
                });
            }
            let commit = self.prepare(current.hash, &meta, plan.operations.clone(), source_commit.as_ref())?;
            Ok(Step::Swap {
                target: commit.hash(),
                payload: (plan, Some(commit)),
            })
        })?;

        match outcome {
            Outcome::Committed {
                reference,
                payload: (plan, commit),
                ..
            } => {
                tracing::info!(
                    target = %reference.name,
                    source = %source.short_hex(),
                    operations = plan.operations.len(),
                    dropped = plan.dropped.len(),
                    "merged"
                );
                Ok(MergeResult {
                    plan,
                    commit,
                    reference,
                    applied: true,
                })
            }
            Outcome::Finished(result) => Ok(result),
        }
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    pub(crate) fn read_reference(&self, name: &str) -> StoreResult<ReferenceRecord> {
        self.retry.run("read reference", || self.adapter.get_reference(name))
    }

    fn read_commit(&self, hash: Hash) -> StoreResult<Commit> {
        self.retry.run("read commit", || self.adapter.get_commit(&hash))
    }

    fn ensure_commit(&self, hash: Hash) -> StoreResult<()> {
        if !hash.is_no_ancestor() {
            self.read_commit(hash)?;
        }
        Ok(())
    }

    fn persist_contents(&self, objects: &[ContentObject]) -> StoreResult<()> {
        if objects.is_empty() {
            return Ok(());
        }
        self.retry.run("put content", || self.adapter.put_content(objects))
    }

    /// Build the commit on top of `parent` and persist it, together with a
    /// key list when its `seq` falls on the snapshot distance.
    fn prepare(
        &self,
        parent: Hash,
        meta: &CommitMeta,
        operations: Vec<Operation>,
        merged: Option<&Commit>,
    ) -> StoreResult<Commit> {
        let head = match parent.is_no_ancestor() {
            true => None,
            false => Some(self.read_commit(parent)?),
        };
        let space = self.retry.run("load key space", || KeySpace::load(self.adapter(), parent))?;
        space.check(&operations)?;

        let mut builder = CommitBuilder::new(meta.clone())
            .with_head(head.as_ref())
            .with_operations(operations);
        if let Some(merged) = merged {
            builder = builder.with_merge_parent(merged);
        }
        let commit = builder.build()?;
        self.retry
            .run("put commit", || self.adapter.put_commits(std::slice::from_ref(&commit)))?;

        let distance = self.config.key_list_distance;
        if distance > 0 && commit.seq() % distance == 0 {
            let list = space.apply(&commit);
            self.retry.run("put key list", || self.adapter.put_key_list(&list))?;
            tracing::debug!(hash = %commit.hash().short_hex(), keys = list.len(), "wrote key list");
        }
        Ok(commit)
    }
}

fn ensure_branch(record: &ReferenceRecord) -> StoreResult<()> {
    if record.is_branch() {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "{} is a {}; only branches take commits",
            record.name, record.kind
        )))
    }
}

fn rejected(name: &str, expected: Hash, current: &ReferenceRecord) -> StoreError {
    StoreError::ConflictRejected {
        reference: name.to_string(),
        expected,
        actual: current.hash,
    }
}
