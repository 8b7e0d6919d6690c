use std::fmt;
use std::path::Path;
use std::sync::RwLock;

use redb::{Database, ReadableTable, TableDefinition};
use strata_codec::{decode, encode};
use strata_model::{Commit, ContentObject, GenerationToken, GlobalState, KeyList, ReferenceRecord};
use strata_store::{
    Adapter, Capabilities, CasOutcome, Missing, ReferenceUpdate, StoreError, StoreResult,
};
use strata_types::{ContentId, Hash};

use crate::config::RedbConfig;

/// Every table maps raw key bytes to an encoded frame.
type Frames = TableDefinition<'static, &'static [u8], &'static [u8]>;

const COMMITS: Frames = TableDefinition::new("commits");
const CONTENTS: Frames = TableDefinition::new("contents");
const REFS: Frames = TableDefinition::new("refs");
const KEY_LISTS: Frames = TableDefinition::new("key_lists");
const GLOBAL_STATE: Frames = TableDefinition::new("global_state");

const TABLES: [Frames; 5] = [COMMITS, CONTENTS, REFS, KEY_LISTS, GLOBAL_STATE];

/// Translate any redb error at the adapter boundary.
fn backend_err(e: impl Into<redb::Error>) -> StoreError {
    match e.into() {
        redb::Error::Corrupted(reason) => StoreError::corrupt("redb file", reason),
        redb::Error::DatabaseAlreadyOpen => {
            StoreError::Connection("database is already open in another process".into())
        }
        e => StoreError::Connection(e.to_string()),
    }
}

fn content_key(content_id: &ContentId, version: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(32 + content_id.as_str().len());
    key.extend_from_slice(version.as_bytes());
    key.extend_from_slice(content_id.as_str().as_bytes());
    key
}

/// redb implementation of [`Adapter`].
///
/// Batches are atomic, and global state commits in the same write
/// transaction as the reference swap it accompanies.
pub struct RedbAdapter {
    db: RwLock<Option<Database>>,
    config: RedbConfig,
}

impl RedbAdapter {
    /// Create or open the database at `config.path` and make sure every table
    /// exists. Fails with `Connection` if the file cannot be opened.
    pub fn open(config: RedbConfig) -> StoreResult<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let db = Database::create(&config.path).map_err(backend_err)?;

        let txn = db.begin_write().map_err(backend_err)?;
        for table in TABLES {
            txn.open_table(table).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;

        tracing::info!(path = %config.path.display(), "opened redb store");
        Ok(Self {
            db: RwLock::new(Some(db)),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self
            .db
            .read()
            .map_err(|e| StoreError::Connection(format!("lock poisoned: {e}")))?;
        let db = guard
            .as_ref()
            .ok_or_else(|| StoreError::Connection("adapter is closed".into()))?;
        f(db)
    }

    fn read_frame(&self, table: Frames, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(backend_err)?;
            let table = txn.open_table(table).map_err(backend_err)?;
            let frame = table
                .get(key)
                .map_err(backend_err)?
                .map(|guard| guard.value().to_vec());
            Ok(frame)
        })
    }

    /// Write frames in one transaction. Existing keys are kept unless
    /// `overwrite` is set.
    fn write_frames(&self, table: Frames, frames: &[(Vec<u8>, Vec<u8>)], overwrite: bool) -> StoreResult<()> {
        if frames.is_empty() {
            return Ok(());
        }
        self.with_db(|db| {
            let txn = db.begin_write().map_err(backend_err)?;
            {
                let mut table = txn.open_table(table).map_err(backend_err)?;
                for (key, frame) in frames {
                    if !overwrite && table.get(key.as_slice()).map_err(backend_err)?.is_some() {
                        continue;
                    }
                    table
                        .insert(key.as_slice(), frame.as_slice())
                        .map_err(backend_err)?;
                }
            }
            txn.commit().map_err(backend_err)
        })
    }

    /// Compare the stored generation of `name` with `expected` and, when they
    /// match, apply `replace` and upsert `states` in the same write
    /// transaction.
    fn swap_reference(
        &self,
        name: &str,
        expected: GenerationToken,
        states: &[(Vec<u8>, Vec<u8>)],
        replace: impl FnOnce(&ReferenceRecord) -> StoreResult<Option<Vec<u8>>>,
    ) -> StoreResult<CasOutcome> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(backend_err)?;
            let outcome = {
                let mut refs = txn.open_table(REFS).map_err(backend_err)?;
                let current: ReferenceRecord = match refs.get(name.as_bytes()).map_err(backend_err)? {
                    Some(frame) => decode(frame.value())?,
                    None => return Err(StoreError::reference_not_found(name)),
                };
                if current.generation != expected {
                    CasOutcome::ConflictRejected { current }
                } else {
                    match replace(&current)? {
                        Some(frame) => {
                            refs.insert(name.as_bytes(), frame.as_slice())
                                .map_err(backend_err)?;
                        }
                        None => {
                            refs.remove(name.as_bytes()).map_err(backend_err)?;
                        }
                    }
                    CasOutcome::Success
                }
            };
            if outcome.is_success() && !states.is_empty() {
                let mut global = txn.open_table(GLOBAL_STATE).map_err(backend_err)?;
                for (key, frame) in states {
                    global
                        .insert(key.as_slice(), frame.as_slice())
                        .map_err(backend_err)?;
                }
            }
            txn.commit().map_err(backend_err)?;
            Ok(outcome)
        })
    }
}

impl Adapter for RedbAdapter {
    fn name(&self) -> &'static str {
        crate::BACKEND
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactional: true,
        }
    }

    fn get_commit(&self, hash: &Hash) -> StoreResult<Commit> {
        let frame = self
            .read_frame(COMMITS, hash.as_bytes())?
            .ok_or_else(|| StoreError::commit_not_found(*hash))?;
        Ok(decode(&frame)?)
    }

    fn put_commits(&self, commits: &[Commit]) -> StoreResult<()> {
        let frames = commits
            .iter()
            .map(|c| encode(c).map(|frame| (c.hash().as_bytes().to_vec(), frame)))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_frames(COMMITS, &frames, false)
    }

    fn get_content(&self, content_id: &ContentId, version: &Hash) -> StoreResult<ContentObject> {
        let frame = self
            .read_frame(CONTENTS, &content_key(content_id, version))?
            .ok_or_else(|| {
                StoreError::NotFound(Missing::Content {
                    content_id: content_id.clone(),
                    version: *version,
                })
            })?;
        Ok(decode(&frame)?)
    }

    fn put_content(&self, contents: &[ContentObject]) -> StoreResult<()> {
        let frames = contents
            .iter()
            .map(|c| -> StoreResult<_> { Ok((content_key(&c.content_id, &c.version()?), encode(c)?)) })
            .collect::<StoreResult<Vec<_>>>()?;
        self.write_frames(CONTENTS, &frames, false)
    }

    fn get_reference(&self, name: &str) -> StoreResult<ReferenceRecord> {
        let frame = self
            .read_frame(REFS, name.as_bytes())?
            .ok_or_else(|| StoreError::reference_not_found(name))?;
        Ok(decode(&frame)?)
    }

    fn add_reference(&self, record: &ReferenceRecord) -> StoreResult<()> {
        let frame = encode(record)?;
        self.with_db(|db| {
            let txn = db.begin_write().map_err(backend_err)?;
            {
                let mut refs = txn.open_table(REFS).map_err(backend_err)?;
                if refs.get(record.name.as_bytes()).map_err(backend_err)?.is_some() {
                    return Err(StoreError::AlreadyExists(record.name.clone()));
                }
                refs.insert(record.name.as_bytes(), frame.as_slice())
                    .map_err(backend_err)?;
            }
            txn.commit().map_err(backend_err)
        })
    }

    fn cas_reference(&self, update: &ReferenceUpdate) -> StoreResult<CasOutcome> {
        let states = update
            .global_state
            .iter()
            .map(|s| encode(s).map(|frame| (s.content_id.as_str().as_bytes().to_vec(), frame)))
            .collect::<Result<Vec<_>, _>>()?;

        self.swap_reference(&update.name, update.expected, &states, |current| {
            Ok(Some(encode(&update.applied_to(current))?))
        })
    }

    fn delete_reference(&self, name: &str, expected: GenerationToken) -> StoreResult<CasOutcome> {
        self.swap_reference(name, expected, &[], |_| Ok(None))
    }

    fn list_references(&self, prefix: &str) -> StoreResult<Vec<ReferenceRecord>> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(backend_err)?;
            let refs = txn.open_table(REFS).map_err(backend_err)?;
            let mut records = Vec::new();
            for entry in refs.range(prefix.as_bytes()..).map_err(backend_err)? {
                let (name, frame) = entry.map_err(backend_err)?;
                if !name.value().starts_with(prefix.as_bytes()) {
                    break;
                }
                records.push(decode::<ReferenceRecord>(frame.value())?);
            }
            Ok(records)
        })
    }

    fn get_key_list(&self, commit: &Hash) -> StoreResult<Option<KeyList>> {
        self.read_frame(KEY_LISTS, commit.as_bytes())?
            .map(|frame| decode::<KeyList>(&frame).map_err(StoreError::from))
            .transpose()
    }

    fn put_key_list(&self, list: &KeyList) -> StoreResult<()> {
        let frames = [(list.commit.as_bytes().to_vec(), encode(list)?)];
        self.write_frames(KEY_LISTS, &frames, false)
    }

    fn get_global_state(&self, content_id: &ContentId) -> StoreResult<GlobalState> {
        let frame = self
            .read_frame(GLOBAL_STATE, content_id.as_str().as_bytes())?
            .ok_or_else(|| StoreError::NotFound(Missing::GlobalState(content_id.clone())))?;
        Ok(decode(&frame)?)
    }

    fn erase(&self) -> StoreResult<()> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(backend_err)?;
            for table in TABLES {
                txn.delete_table(table).map_err(backend_err)?;
                txn.open_table(table).map_err(backend_err)?;
            }
            txn.commit().map_err(backend_err)
        })?;
        tracing::info!(path = %self.config.path.display(), "erased redb store");
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut guard = self
            .db
            .write()
            .map_err(|e| StoreError::Connection(format!("lock poisoned: {e}")))?;
        if guard.take().is_some() {
            tracing::debug!(path = %self.config.path.display(), "closed redb store");
        }
        Ok(())
    }
}

impl fmt::Debug for RedbAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbAdapter")
            .field("path", &self.config.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;
    use strata_model::{CommitBuilder, ReferenceKind};
    use strata_types::{CommitMeta, ContentType};
    use tempfile::TempDir;

    struct TempRedb {
        adapter: RedbAdapter,
        _dir: TempDir,
    }

    impl Deref for TempRedb {
        type Target = RedbAdapter;

        fn deref(&self) -> &RedbAdapter {
            &self.adapter
        }
    }

    fn temp_redb() -> TempRedb {
        let dir = tempfile::tempdir().unwrap();
        let adapter = RedbAdapter::open(RedbConfig::at(dir.path().join("strata.redb"))).unwrap();
        TempRedb { adapter, _dir: dir }
    }

    strata_store::adapter_conformance_tests!(temp_redb());

    #[test]
    fn is_transactional() {
        assert!(temp_redb().capabilities().transactional);
    }

    #[test]
    fn failed_swap_leaves_global_state_untouched() {
        let redb = temp_redb();
        let main = ReferenceRecord::new("main", ReferenceKind::Branch, Hash::NO_ANCESTOR).unwrap();
        redb.add_reference(&main).unwrap();
        let state = GlobalState::new(ContentId::new("seq-1").unwrap(), ContentType::TABLE, b"next=1".to_vec());
        let states = [(state.content_id.as_str().as_bytes().to_vec(), encode(&state).unwrap())];

        let err = redb
            .swap_reference("main", main.generation, &states, |_| {
                Err(StoreError::InvalidArgument("rejected".into()))
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert!(redb.get_global_state(&state.content_id).unwrap_err().is_not_found());
        assert_eq!(redb.get_reference("main").unwrap(), main);

        let outcome = redb
            .swap_reference("main", main.generation, &states, |current| {
                let update = ReferenceUpdate::advance(current, Hash::from_hash([1; 32]));
                Ok(Some(encode(&update.applied_to(current))?))
            })
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(redb.get_global_state(&state.content_id).unwrap(), state);
        assert_eq!(redb.get_reference("main").unwrap().hash, Hash::from_hash([1; 32]));
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/strata.redb");
        let adapter = RedbAdapter::open(RedbConfig::at(&path)).unwrap();
        assert_eq!(adapter.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.redb");
        let commit = CommitBuilder::new(CommitMeta::new("alice", "init")).build().unwrap();
        {
            let adapter = RedbAdapter::open(RedbConfig::at(&path)).unwrap();
            adapter.put_commits(std::slice::from_ref(&commit)).unwrap();
            adapter
                .add_reference(&ReferenceRecord::new("main", ReferenceKind::Branch, commit.hash()).unwrap())
                .unwrap();
            adapter.close().unwrap();
        }
        let adapter = RedbAdapter::open(RedbConfig::at(&path)).unwrap();
        assert_eq!(adapter.get_commit(&commit.hash()).unwrap(), commit);
        assert_eq!(adapter.get_reference("main").unwrap().hash, commit.hash());
    }

    #[test]
    fn closed_adapter_rejects_calls() {
        let redb = temp_redb();
        redb.close().unwrap();
        assert!(matches!(
            redb.get_reference("main"),
            Err(StoreError::Connection(_))
        ));
    }

    #[test]
    fn corrupt_frame_surfaces_corrupt_data() {
        let redb = temp_redb();
        let hash = Hash::from_hash([9; 32]);
        redb.write_frames(COMMITS, &[(hash.as_bytes().to_vec(), vec![0xff, 0x00])], true)
            .unwrap();
        assert!(matches!(
            redb.get_commit(&hash),
            Err(StoreError::CorruptData { .. })
        ));
    }

    #[test]
    fn content_keys_do_not_collide_across_versions() {
        let id = ContentId::new("c1").unwrap();
        let a = content_key(&id, &Hash::from_hash([1; 32]));
        let b = content_key(&id, &Hash::from_hash([2; 32]));
        assert_ne!(a, b);
        assert!(a.ends_with(b"c1"));
    }

    #[test]
    fn factory_reads_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = strata_store::StoreConfig::for_backend(crate::BACKEND).with_setting(
            "path",
            dir.path().join("f.redb").to_string_lossy().into_owned(),
        );
        let adapter = crate::factory(&config).unwrap();
        assert_eq!(adapter.name(), "redb");
        assert!(adapter.capabilities().transactional);
    }
}
