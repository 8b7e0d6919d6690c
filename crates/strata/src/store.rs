use std::path::Path;
use std::sync::Arc;

use strata_merge::MergePolicies;
use strata_model::{ContentObject, GlobalState, KeyEntry, ReferenceKind, ReferenceRecord};
use strata_refs::{CommitLog, CommitRequest, CommitResult, MergeRequest, MergeResult, ReferenceStore};
use strata_store::{
    scan_keys, Adapter, AdapterRegistry, Capabilities, CommitConfig, ScanKeys, ScanOptions, StoreConfig, StoreError,
    StoreResult,
};
use strata_types::{ContentId, ContentKey, Hash};

use crate::registry::builtin_registry;

/// Branch created by [`VersionStore::initialize`].
pub const DEFAULT_BRANCH: &str = "main";

/// A version store on one storage backend.
pub struct VersionStore {
    refs: ReferenceStore,
}

impl VersionStore {
    /// Open the backend named in `config` from the built-in registry.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        Self::open_with(&builtin_registry(), config)
    }

    /// Open the backend named in `config` from `registry`.
    pub fn open_with(registry: &AdapterRegistry, config: &StoreConfig) -> StoreResult<Self> {
        let adapter = registry.open(config)?;
        Ok(Self::from_adapter(adapter, config.commit.clone()))
    }

    /// Read a TOML configuration file and open its backend.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(&StoreConfig::load(path)?)
    }

    pub fn from_adapter(adapter: Arc<dyn Adapter>, config: CommitConfig) -> Self {
        Self {
            refs: ReferenceStore::new(adapter, config),
        }
    }

    /// Replace the policies that decide keys changed concurrently.
    pub fn with_policies(self, policies: MergePolicies) -> Self {
        Self {
            refs: self.refs.with_policies(policies),
        }
    }

    /// Create [`DEFAULT_BRANCH`] with no commits, unless it exists.
    pub fn initialize(&self) -> StoreResult<ReferenceRecord> {
        match self
            .refs
            .create_reference(DEFAULT_BRANCH, ReferenceKind::Branch, Hash::NO_ANCESTOR)
        {
            Err(StoreError::AlreadyExists(_)) => self.refs.get_reference(DEFAULT_BRANCH),
            result => result,
        }
    }

    pub fn references(&self) -> &ReferenceStore {
        &self.refs
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.refs.adapter()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.adapter().capabilities()
    }

    // ---- References ----

    pub fn create_branch(&self, name: &str, target: Hash) -> StoreResult<ReferenceRecord> {
        self.refs.create_reference(name, ReferenceKind::Branch, target)
    }

    pub fn create_tag(&self, name: &str, target: Hash) -> StoreResult<ReferenceRecord> {
        self.refs.create_reference(name, ReferenceKind::Tag, target)
    }

    pub fn get_reference(&self, name: &str) -> StoreResult<ReferenceRecord> {
        self.refs.get_reference(name)
    }

    pub fn list_references(&self, prefix: &str) -> StoreResult<Vec<ReferenceRecord>> {
        self.refs.list_references(prefix)
    }

    pub fn assign_reference(&self, name: &str, expected: Hash, target: Hash) -> StoreResult<ReferenceRecord> {
        self.refs.assign_reference(name, expected, target)
    }

    pub fn delete_reference(&self, name: &str, expected: Hash) -> StoreResult<()> {
        self.refs.delete_reference(name, expected)
    }

    pub fn resolve(&self, name_or_hash: &str) -> StoreResult<Hash> {
        self.refs.resolve(name_or_hash)
    }

    // ---- Commits ----

    pub fn commit(&self, request: CommitRequest) -> StoreResult<CommitResult> {
        self.refs.commit(request)
    }

    pub fn merge(&self, request: MergeRequest) -> StoreResult<MergeResult> {
        self.refs.merge(request)
    }

    pub fn log(&self, from: &str) -> StoreResult<CommitLog<'_>> {
        self.refs.log(from)
    }

    // ---- Contents ----

    /// Live keys at a reference or commit, in key order.
    pub fn keys(&self, at: &str, options: ScanOptions) -> StoreResult<ScanKeys<'_>> {
        Ok(scan_keys(self.adapter(), self.resolve(at)?, options))
    }

    /// The entry for `key` at a reference or commit, if the key is live.
    pub fn entry(&self, at: &str, key: &ContentKey) -> StoreResult<Option<KeyEntry>> {
        let options = ScanOptions {
            prefix: Some(key.clone()),
            ..ScanOptions::default()
        };
        for entry in self.keys(at, options)? {
            let entry = entry?;
            if entry.key == *key {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// The object bound to `key` at a reference or commit.
    pub fn read(&self, at: &str, key: &ContentKey) -> StoreResult<Option<ContentObject>> {
        match self.entry(at, key)? {
            Some(entry) => Ok(Some(self.adapter().get_content(&entry.content_id, &entry.version)?)),
            None => Ok(None),
        }
    }

    pub fn global_state(&self, content_id: &ContentId) -> StoreResult<GlobalState> {
        self.adapter().get_global_state(content_id)
    }

    // ---- Lifecycle ----

    /// Delete everything in the backend. Irreversible.
    pub fn erase(&self) -> StoreResult<()> {
        tracing::warn!(backend = self.adapter().name(), "erasing store");
        self.adapter().erase()
    }

    pub fn close(&self) -> StoreResult<()> {
        self.adapter().close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::{CommitMeta, ContentType};

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    #[test]
    fn initialize_is_idempotent() {
        let store = VersionStore::open(&StoreConfig::default()).unwrap();
        let first = store.initialize().unwrap();
        let again = store.initialize().unwrap();
        assert_eq!(first, again);
        assert!(again.hash.is_no_ancestor());
    }

    #[test]
    fn reads_contents_by_key() {
        let store = VersionStore::open(&StoreConfig::default()).unwrap();
        store.initialize().unwrap();
        let body = b"{\"columns\":[]}".to_vec();
        let table = ContentObject::new(ContentId::generate(), ContentType::TABLE, body.clone());
        store
            .commit(CommitRequest::new("main", CommitMeta::new("t", "add")).put(key("db.t"), table.clone()))
            .unwrap();

        assert_eq!(store.read("main", &key("db.t")).unwrap(), Some(table));
        assert_eq!(store.read("main", &key("db")).unwrap(), None);
        assert_eq!(store.read("main", &key("db.t.child")).unwrap(), None);
        assert!(store.read("missing", &key("db.t")).unwrap_err().is_not_found());
    }

    #[test]
    fn capabilities_come_from_the_backend() {
        let store = VersionStore::open(&StoreConfig::default()).unwrap();
        assert!(store.capabilities().transactional);
        assert_eq!(store.adapter().name(), "memory");
    }
}
