use strata_model::{
    Commit, ContentObject, GenerationToken, GlobalState, KeyList, ReferenceRecord,
};
use strata_types::{ContentId, Hash};

use crate::error::{StoreError, StoreResult};

/// What a backend can guarantee natively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Batched writes are atomic, and global-state upserts commit in the same
    /// transaction as the reference update.
    pub transactional: bool,
}

/// A compare-and-swap request for one reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceUpdate {
    pub name: String,
    pub expected: GenerationToken,
    pub new_hash: Hash,
    pub new_generation: GenerationToken,
    /// Records written alongside a successful update.
    pub global_state: Vec<GlobalState>,
}

impl ReferenceUpdate {
    /// Move `current` to `new_hash`, bumping its generation by one.
    pub fn advance(current: &ReferenceRecord, new_hash: Hash) -> Self {
        Self {
            name: current.name.clone(),
            expected: current.generation,
            new_hash,
            new_generation: current.generation.next(),
            global_state: Vec::new(),
        }
    }

    pub fn with_global_state(mut self, states: impl IntoIterator<Item = GlobalState>) -> Self {
        self.global_state.extend(states);
        self
    }

    /// The record the reference holds once this update succeeds.
    pub fn applied_to(&self, current: &ReferenceRecord) -> ReferenceRecord {
        ReferenceRecord {
            name: current.name.clone(),
            kind: current.kind,
            hash: self.new_hash,
            generation: self.new_generation,
        }
    }
}

/// Result of a conditional reference write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    Success,
    /// The stored generation did not match; nothing was written.
    ConflictRejected { current: ReferenceRecord },
}

impl CasOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Storage contract implemented by every backend.
///
/// All implementations must satisfy these invariants:
/// - Commits, contents and key lists are immutable. Writing one that already
///   exists is a no-op, so every write except the reference operations is
///   idempotent and safe to retry.
/// - [`cas_reference`](Adapter::cas_reference) and
///   [`delete_reference`](Adapter::delete_reference) are linearizable per
///   reference name and never partially applied.
/// - Reads of missing objects fail with [`StoreError::NotFound`]; stored bytes
///   that fail to decode fail with [`StoreError::CorruptData`].
/// - Backend-native errors are mapped onto [`StoreError`].
pub trait Adapter: Send + Sync {
    /// Registry name of the backend.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn get_commit(&self, hash: &Hash) -> StoreResult<Commit>;

    /// Read several commits. Fails on the first missing one.
    ///
    /// Default implementation calls `get_commit()` for each hash.
    fn get_commits(&self, hashes: &[Hash]) -> StoreResult<Vec<Commit>> {
        hashes.iter().map(|hash| self.get_commit(hash)).collect()
    }

    /// Persist commits. Atomic as a batch only on transactional backends;
    /// elsewhere each commit becomes visible independently.
    fn put_commits(&self, commits: &[Commit]) -> StoreResult<()>;

    fn get_content(&self, content_id: &ContentId, version: &Hash) -> StoreResult<ContentObject>;

    /// Persist content objects, keyed by `(content_id, version)`. Same
    /// batching contract as [`put_commits`](Adapter::put_commits).
    fn put_content(&self, contents: &[ContentObject]) -> StoreResult<()>;

    fn get_reference(&self, name: &str) -> StoreResult<ReferenceRecord>;

    /// Create a reference if no reference of that name exists.
    fn add_reference(&self, record: &ReferenceRecord) -> StoreResult<()>;

    /// Replace the reference's hash and generation if its stored generation
    /// equals `update.expected`. Fails with `NotFound` if it does not exist.
    ///
    /// Global-state records in the update are written in the same
    /// transaction on transactional backends, and right after the swap
    /// elsewhere.
    fn cas_reference(&self, update: &ReferenceUpdate) -> StoreResult<CasOutcome>;

    /// Remove the reference if its stored generation equals `expected`.
    fn delete_reference(&self, name: &str, expected: GenerationToken) -> StoreResult<CasOutcome>;

    /// All references whose name starts with `prefix`, sorted by name.
    fn list_references(&self, prefix: &str) -> StoreResult<Vec<ReferenceRecord>>;

    /// The key-list snapshot attached to `commit`, if one was written.
    fn get_key_list(&self, commit: &Hash) -> StoreResult<Option<KeyList>>;

    fn put_key_list(&self, list: &KeyList) -> StoreResult<()>;

    fn get_global_state(&self, content_id: &ContentId) -> StoreResult<GlobalState>;

    /// Remove every object and reference of the repository.
    fn erase(&self) -> StoreResult<()>;

    /// Release backend resources. Idempotent.
    fn close(&self) -> StoreResult<()>;

    /// Read a reference, mapping `NotFound` to `None`.
    fn find_reference(&self, name: &str) -> StoreResult<Option<ReferenceRecord>> {
        match self.get_reference(name) {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_model::ReferenceKind;

    #[test]
    fn advance_bumps_generation_by_one() {
        let current = ReferenceRecord::new("main", ReferenceKind::Branch, Hash::NO_ANCESTOR).unwrap();
        let update = ReferenceUpdate::advance(&current, Hash::from_hash([4; 32]));
        assert_eq!(update.expected, GenerationToken(1));
        assert_eq!(update.new_generation, GenerationToken(2));

        let applied = update.applied_to(&current);
        assert_eq!(applied, current.advanced(Hash::from_hash([4; 32])));
    }
}
