//! In-memory adapter for tests and embedding.
//!
//! [`InMemoryAdapter`] keeps every object as encoded bytes behind a single
//! `RwLock`, so it exercises the codec exactly like a persistent backend. It
//! is transactional: batches and reference updates apply under one write
//! lock. Data is lost when the adapter is dropped.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use strata_codec::{decode, encode};
use strata_model::{Commit, ContentObject, GenerationToken, GlobalState, KeyList, ReferenceRecord};
use strata_types::{ContentId, Hash};

use crate::adapter::{Adapter, Capabilities, CasOutcome, ReferenceUpdate};
use crate::error::{Missing, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    commits: HashMap<Hash, Vec<u8>>,
    contents: HashMap<(ContentId, Hash), Vec<u8>>,
    refs: BTreeMap<String, Vec<u8>>,
    key_lists: HashMap<Hash, Vec<u8>>,
    global_state: HashMap<ContentId, Vec<u8>>,
}

/// An in-memory implementation of [`Adapter`].
pub struct InMemoryAdapter {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

impl InMemoryAdapter {
    pub const NAME: &'static str = "memory";

    /// Create a new empty adapter.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored commits.
    pub fn commit_count(&self) -> usize {
        self.read().map(|t| t.commits.len()).unwrap_or_default()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Connection("adapter is closed".into()));
        }
        Ok(())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.ensure_open()?;
        self.tables
            .read()
            .map_err(|e| StoreError::Connection(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.ensure_open()?;
        self.tables
            .write()
            .map_err(|e| StoreError::Connection(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for InMemoryAdapter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactional: true,
        }
    }

    fn get_commit(&self, hash: &Hash) -> StoreResult<Commit> {
        let tables = self.read()?;
        let bytes = tables
            .commits
            .get(hash)
            .ok_or(StoreError::commit_not_found(*hash))?;
        Ok(decode(bytes)?)
    }

    fn put_commits(&self, commits: &[Commit]) -> StoreResult<()> {
        // Encode outside the lock so a bad commit leaves the batch unapplied.
        let encoded = commits
            .iter()
            .map(|c| encode(c).map(|bytes| (c.hash(), bytes)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut tables = self.write()?;
        for (hash, bytes) in encoded {
            tables.commits.entry(hash).or_insert(bytes);
        }
        Ok(())
    }

    fn get_content(&self, content_id: &ContentId, version: &Hash) -> StoreResult<ContentObject> {
        let tables = self.read()?;
        let bytes = tables
            .contents
            .get(&(content_id.clone(), *version))
            .ok_or_else(|| {
                StoreError::NotFound(Missing::Content {
                    content_id: content_id.clone(),
                    version: *version,
                })
            })?;
        Ok(decode(bytes)?)
    }

    fn put_content(&self, contents: &[ContentObject]) -> StoreResult<()> {
        let encoded = contents
            .iter()
            .map(|c| -> StoreResult<_> { Ok(((c.content_id.clone(), c.version()?), encode(c)?)) })
            .collect::<StoreResult<Vec<_>>>()?;
        let mut tables = self.write()?;
        for (id, bytes) in encoded {
            tables.contents.entry(id).or_insert(bytes);
        }
        Ok(())
    }

    fn get_reference(&self, name: &str) -> StoreResult<ReferenceRecord> {
        let tables = self.read()?;
        let bytes = tables
            .refs
            .get(name)
            .ok_or_else(|| StoreError::reference_not_found(name))?;
        Ok(decode(bytes)?)
    }

    fn add_reference(&self, record: &ReferenceRecord) -> StoreResult<()> {
        let bytes = encode(record)?;
        let mut tables = self.write()?;
        if tables.refs.contains_key(&record.name) {
            return Err(StoreError::AlreadyExists(record.name.clone()));
        }
        tables.refs.insert(record.name.clone(), bytes);
        Ok(())
    }

    fn cas_reference(&self, update: &ReferenceUpdate) -> StoreResult<CasOutcome> {
        let states = update
            .global_state
            .iter()
            .map(|s| encode(s).map(|bytes| (s.content_id.clone(), bytes)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables = self.write()?;
        let current: ReferenceRecord = match tables.refs.get(&update.name) {
            Some(bytes) => decode(bytes)?,
            None => return Err(StoreError::reference_not_found(&update.name)),
        };
        if current.generation != update.expected {
            return Ok(CasOutcome::ConflictRejected { current });
        }
        let bytes = encode(&update.applied_to(&current))?;
        tables.refs.insert(update.name.clone(), bytes);
        tables.global_state.extend(states);
        Ok(CasOutcome::Success)
    }

    fn delete_reference(&self, name: &str, expected: GenerationToken) -> StoreResult<CasOutcome> {
        let mut tables = self.write()?;
        let current: ReferenceRecord = match tables.refs.get(name) {
            Some(bytes) => decode(bytes)?,
            None => return Err(StoreError::reference_not_found(name)),
        };
        if current.generation != expected {
            return Ok(CasOutcome::ConflictRejected { current });
        }
        tables.refs.remove(name);
        Ok(CasOutcome::Success)
    }

    fn list_references(&self, prefix: &str) -> StoreResult<Vec<ReferenceRecord>> {
        let tables = self.read()?;
        tables
            .refs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(_, bytes)| decode::<ReferenceRecord>(bytes).map_err(StoreError::from))
            .collect()
    }

    fn get_key_list(&self, commit: &Hash) -> StoreResult<Option<KeyList>> {
        let tables = self.read()?;
        tables
            .key_lists
            .get(commit)
            .map(|bytes| decode::<KeyList>(bytes).map_err(StoreError::from))
            .transpose()
    }

    fn put_key_list(&self, list: &KeyList) -> StoreResult<()> {
        let bytes = encode(list)?;
        let mut tables = self.write()?;
        tables.key_lists.entry(list.commit).or_insert(bytes);
        Ok(())
    }

    fn get_global_state(&self, content_id: &ContentId) -> StoreResult<GlobalState> {
        let tables = self.read()?;
        let bytes = tables
            .global_state
            .get(content_id)
            .ok_or_else(|| StoreError::NotFound(Missing::GlobalState(content_id.clone())))?;
        Ok(decode(bytes)?)
    }

    fn erase(&self) -> StoreResult<()> {
        *self.write()? = Tables::default();
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl fmt::Debug for InMemoryAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryAdapter")
            .field("commit_count", &self.commit_count())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_model::{CommitBuilder, ReferenceKind};
    use strata_types::CommitMeta;

    crate::adapter_conformance_tests!(Box::new(InMemoryAdapter::new()));

    #[test]
    fn is_transactional() {
        assert!(InMemoryAdapter::new().capabilities().transactional);
    }

    #[test]
    fn closed_adapter_rejects_calls() {
        let adapter = InMemoryAdapter::new();
        adapter.close().unwrap();
        assert!(matches!(
            adapter.get_reference("main"),
            Err(StoreError::Connection(_))
        ));
        adapter.close().unwrap();
    }

    #[test]
    fn stores_encoded_bytes() {
        let adapter = InMemoryAdapter::new();
        let commit = CommitBuilder::new(CommitMeta::new("a", "m")).build().unwrap();
        adapter.put_commits(std::slice::from_ref(&commit)).unwrap();
        adapter.put_commits(std::slice::from_ref(&commit)).unwrap();
        assert_eq!(adapter.commit_count(), 1);

        // Corrupt the stored frame and make sure reads surface it.
        adapter
            .tables
            .write()
            .unwrap()
            .commits
            .insert(commit.hash(), vec![1, 2, 3]);
        assert!(matches!(
            adapter.get_commit(&commit.hash()),
            Err(StoreError::CorruptData { .. })
        ));
    }

    #[test]
    fn debug_shows_counts() {
        let adapter = InMemoryAdapter::new();
        adapter
            .add_reference(&ReferenceRecord::new("main", ReferenceKind::Branch, Hash::NO_ANCESTOR).unwrap())
            .unwrap();
        assert!(format!("{adapter:?}").contains("commit_count: 0"));
    }
}
