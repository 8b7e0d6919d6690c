use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_codec::{Canonical, ObjectKind};
use strata_types::{CommitMeta, ContentId, ContentKey, ContentType, Hash};

use crate::error::{ModelError, ModelResult};

/// One change to the key space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Bind `key` to a version of the object identified by `content_id`.
    Put {
        key: ContentKey,
        content_id: ContentId,
        content_type: ContentType,
        version: Hash,
    },
    /// Remove `key` from the key space.
    Delete { key: ContentKey },
}

impl Operation {
    pub fn put(
        key: ContentKey,
        content_id: ContentId,
        content_type: ContentType,
        version: Hash,
    ) -> Self {
        Self::Put {
            key,
            content_id,
            content_type,
            version,
        }
    }

    pub fn delete(key: ContentKey) -> Self {
        Self::Delete { key }
    }

    pub fn key(&self) -> &ContentKey {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    pub fn content_id(&self) -> Option<&ContentId> {
        match self {
            Self::Put { content_id, .. } => Some(content_id),
            Self::Delete { .. } => None,
        }
    }

    pub fn content_type(&self) -> Option<ContentType> {
        match self {
            Self::Put { content_type, .. } => Some(*content_type),
            Self::Delete { .. } => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Immutable commit: a node in the commit DAG.
///
/// `parents[0]` is the parent on the branch the commit was made on; a merge
/// commit carries the merged commit as an additional parent. The delta in
/// `operations` is always relative to the first parent. Root commits have no
/// parents and `seq == 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(skip, default = "placeholder_hash")]
    hash: Hash,
    parents: Vec<Hash>,
    seq: u64,
    meta: CommitMeta,
    operations: Vec<Operation>,
}

fn placeholder_hash() -> Hash {
    Hash::NO_ANCESTOR
}

impl Commit {
    /// Content-addressed id of this commit.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn parents(&self) -> &[Hash] {
        &self.parents
    }

    /// First parent, or [`Hash::NO_ANCESTOR`] for a root commit.
    pub fn parent(&self) -> Hash {
        self.parents.first().copied().unwrap_or(Hash::NO_ANCESTOR)
    }

    /// Parents other than the first (merged-in commits).
    pub fn secondary_parents(&self) -> &[Hash] {
        self.parents.get(1..).unwrap_or_default()
    }

    /// Distance from the root along the longest parent chain, starting at 1.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn meta(&self) -> &CommitMeta {
        &self.meta
    }

    /// Delta against the first parent, sorted by key.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Find the operation touching `key`, if any.
    pub fn operation(&self, key: &ContentKey) -> Option<&Operation> {
        self.operations
            .binary_search_by(|op| op.key().cmp(key))
            .ok()
            .map(|i| &self.operations[i])
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

impl Canonical for Commit {
    const KIND: ObjectKind = ObjectKind::Commit;

    fn validate(&self) -> Result<(), String> {
        if self.seq == 0 {
            return Err("seq must be at least 1".into());
        }
        if self.parents.is_empty() && self.seq != 1 {
            return Err(format!("root commit must have seq 1, has {}", self.seq));
        }
        for (i, parent) in self.parents.iter().enumerate() {
            if parent.is_no_ancestor() {
                return Err("parent must not be the no-ancestor hash".into());
            }
            if self.parents[..i].contains(parent) {
                return Err(format!("duplicate parent {}", parent.short_hex()));
            }
        }
        for pair in self.operations.windows(2) {
            if pair[0].key() >= pair[1].key() {
                return Err(format!(
                    "operations not strictly ordered at key {}",
                    pair[1].key()
                ));
            }
        }
        Ok(())
    }

    fn restore_derived(&mut self, frame: &[u8]) {
        self.hash = Self::KIND.hasher().hash(frame);
    }
}

/// Builder for [`Commit`].
///
/// Operations may be added in any order; [`build`](CommitBuilder::build)
/// sorts them and rejects a key that appears twice.
#[derive(Clone, Debug)]
pub struct CommitBuilder {
    meta: CommitMeta,
    parents: Vec<(Hash, u64)>,
    operations: Vec<Operation>,
}

impl CommitBuilder {
    pub fn new(meta: CommitMeta) -> Self {
        Self {
            meta,
            parents: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Set the first parent.
    pub fn with_parent(mut self, parent: &Commit) -> Self {
        self.parents.insert(0, (parent.hash(), parent.seq()));
        self
    }

    /// Set the first parent from a head that may be [`Hash::NO_ANCESTOR`].
    /// `parent` is the loaded commit for any other head.
    pub fn with_head(self, parent: Option<&Commit>) -> Self {
        match parent {
            Some(commit) => self.with_parent(commit),
            None => self,
        }
    }

    /// Add a merged-in parent after the first.
    pub fn with_merge_parent(mut self, parent: &Commit) -> Self {
        self.parents.push((parent.hash(), parent.seq()));
        self
    }

    pub fn with_meta(mut self, meta: CommitMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn put(
        self,
        key: ContentKey,
        content_id: ContentId,
        content_type: ContentType,
        version: Hash,
    ) -> Self {
        self.with_operation(Operation::put(key, content_id, content_type, version))
    }

    pub fn delete(self, key: ContentKey) -> Self {
        self.with_operation(Operation::delete(key))
    }

    pub fn with_operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn with_operations(mut self, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.operations.extend(ops);
        self
    }

    /// Canonicalize, validate and hash.
    pub fn build(self) -> ModelResult<Commit> {
        let mut sorted: BTreeMap<ContentKey, Operation> = BTreeMap::new();
        for op in self.operations {
            let key = op.key().clone();
            if sorted.insert(key.clone(), op).is_some() {
                return Err(ModelError::DuplicateKey(key));
            }
        }

        let mut parents = Vec::with_capacity(self.parents.len());
        let mut seq = 1;
        for (hash, parent_seq) in self.parents {
            if hash.is_no_ancestor() || parents.contains(&hash) {
                return Err(ModelError::InvalidParents(format!(
                    "parent {} is repeated or empty",
                    hash.short_hex()
                )));
            }
            parents.push(hash);
            seq = seq.max(parent_seq + 1);
        }

        let mut commit = Commit {
            hash: Hash::NO_ANCESTOR,
            parents,
            seq,
            meta: self.meta,
            operations: sorted.into_values().collect(),
        };
        commit.hash = strata_codec::hash(&commit)?;
        Ok(commit)
    }
}
