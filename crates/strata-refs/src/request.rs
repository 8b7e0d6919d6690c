use strata_merge::{MergeBehavior, MergeBehaviors, MergePlan};
use strata_model::{Commit, ContentObject, GlobalState, Operation, ReferenceRecord};
use strata_types::{CommitMeta, ContentKey, Hash};

/// A change to commit on a branch.
#[derive(Clone, Debug)]
pub struct CommitRequest {
    pub reference: String,
    /// Commit the change was written against. `None` means the head at the
    /// time of the first read.
    pub expected: Option<Hash>,
    pub meta: CommitMeta,
    /// Operations on objects that are already stored.
    pub operations: Vec<Operation>,
    /// New objects, each bound to a key by a `Put`.
    pub contents: Vec<(ContentKey, ContentObject)>,
    /// Records written together with the reference update.
    pub global_state: Vec<GlobalState>,
}

impl CommitRequest {
    pub fn new(reference: impl Into<String>, meta: CommitMeta) -> Self {
        Self {
            reference: reference.into(),
            expected: None,
            meta,
            operations: Vec::new(),
            contents: Vec::new(),
            global_state: Vec::new(),
        }
    }

    pub fn expecting(mut self, hash: Hash) -> Self {
        self.expected = Some(hash);
        self
    }

    /// Store `content` and bind it to `key`.
    pub fn put(mut self, key: ContentKey, content: ContentObject) -> Self {
        self.contents.push((key, content));
        self
    }

    pub fn delete(mut self, key: ContentKey) -> Self {
        self.operations.push(Operation::delete(key));
        self
    }

    pub fn with_operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn with_global_state(mut self, state: GlobalState) -> Self {
        self.global_state.push(state);
        self
    }
}

/// A successful commit.
#[derive(Clone, Debug)]
pub struct CommitResult {
    pub commit: Commit,
    /// The reference as updated.
    pub reference: ReferenceRecord,
    /// Attempts needed, including the successful one.
    pub attempts: u32,
    /// The commit was re-parented onto a head other than the expected one.
    pub rebased: bool,
}

/// Merge of one commit into a branch.
#[derive(Clone, Debug)]
pub struct MergeRequest {
    pub source: Hash,
    pub target: String,
    pub meta: CommitMeta,
    pub behaviors: MergeBehaviors,
    /// Plan only; nothing is written.
    pub dry_run: bool,
}

impl MergeRequest {
    pub fn new(source: Hash, target: impl Into<String>, meta: CommitMeta) -> Self {
        Self {
            source,
            target: target.into(),
            meta,
            behaviors: MergeBehaviors::default(),
            dry_run: false,
        }
    }

    pub fn with_behavior(mut self, key: ContentKey, behavior: MergeBehavior) -> Self {
        self.behaviors.keys.insert(key, behavior);
        self
    }

    pub fn with_default_behavior(mut self, behavior: MergeBehavior) -> Self {
        self.behaviors.default = behavior;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// What a merge did, or would do for a dry run.
#[derive(Clone, Debug)]
pub struct MergeResult {
    pub plan: MergePlan,
    /// The merge commit, if one was written. A fast-forward of an empty
    /// target writes none.
    pub commit: Option<Commit>,
    /// The target reference after the merge; unchanged for dry runs and
    /// no-ops.
    pub reference: ReferenceRecord,
    pub applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::{ContentId, ContentType};

    #[test]
    fn commit_request_builder() {
        let key = ContentKey::parse("db.t").unwrap();
        let content = ContentObject::new(ContentId::generate(), ContentType::TABLE, b"{}".to_vec());
        let request = CommitRequest::new("main", CommitMeta::new("alice", "add table"))
            .expecting(Hash::NO_ANCESTOR)
            .put(key.clone(), content)
            .delete(ContentKey::parse("db.old").unwrap());
        assert_eq!(request.expected, Some(Hash::NO_ANCESTOR));
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.operations, vec![Operation::delete(ContentKey::parse("db.old").unwrap())]);
    }

    #[test]
    fn merge_request_builder() {
        let key = ContentKey::parse("a").unwrap();
        let request = MergeRequest::new(Hash::from_hash([1; 32]), "main", CommitMeta::new("bob", "merge"))
            .with_behavior(key.clone(), MergeBehavior::Force)
            .dry_run();
        assert!(request.dry_run);
        assert_eq!(request.behaviors.for_key(&key), MergeBehavior::Force);
        assert_eq!(
            request.behaviors.for_key(&ContentKey::parse("b").unwrap()),
            MergeBehavior::Normal
        );
    }
}
