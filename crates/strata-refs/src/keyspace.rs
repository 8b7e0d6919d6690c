//! Content-id rules checked against the parent's key space.

use std::collections::{BTreeMap, HashMap, HashSet};

use strata_model::{Commit, KeyEntry, KeyList, Operation};
use strata_store::{key_space, Adapter, StoreError, StoreResult};
use strata_types::{ContentId, ContentKey, Hash};

/// Materialized key space of one commit.
pub(crate) struct KeySpace {
    entries: BTreeMap<ContentKey, KeyEntry>,
}

impl KeySpace {
    pub(crate) fn load(adapter: &dyn Adapter, commit: Hash) -> StoreResult<Self> {
        let entries = key_space(adapter, commit)?
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect();
        Ok(Self { entries })
    }

    /// Check that `ops` keep content ids stable.
    ///
    /// A `Put` on a live key must carry that key's content id. A `Put` on a
    /// new key must not use an id that stays live at another key; moving an
    /// object means deleting its old key in the same commit.
    pub(crate) fn check(&self, ops: &[Operation]) -> StoreResult<()> {
        let deleted: HashSet<&ContentKey> =
            ops.iter().filter(|op| op.is_delete()).map(Operation::key).collect();
        let live: HashMap<&ContentId, &ContentKey> = self
            .entries
            .values()
            .map(|entry| (&entry.content_id, &entry.key))
            .collect();
        let mut introduced: HashSet<&ContentId> = HashSet::new();

        for op in ops {
            let Operation::Put { key, content_id, .. } = op else {
                continue;
            };
            match self.entries.get(key) {
                Some(existing) if existing.content_id != *content_id => {
                    return Err(StoreError::InvalidArgument(format!(
                        "key {key} holds content id {}, not {content_id}; delete the key before binding a new object",
                        existing.content_id
                    )));
                }
                Some(_) => {}
                None => {
                    if let Some(other) = live.get(content_id).filter(|other| !deleted.contains(*other)) {
                        return Err(StoreError::InvalidArgument(format!(
                            "content id {content_id} is already live at key {other}"
                        )));
                    }
                    if !introduced.insert(content_id) {
                        return Err(StoreError::InvalidArgument(format!(
                            "content id {content_id} is put on more than one key"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Key space after `commit`, as a snapshot attached to it.
    pub(crate) fn apply(mut self, commit: &Commit) -> KeyList {
        for op in commit.operations() {
            match KeyEntry::from_operation(op, commit.hash()) {
                Some(entry) => {
                    self.entries.insert(entry.key.clone(), entry);
                }
                None => {
                    self.entries.remove(op.key());
                }
            }
        }
        KeyList::new(commit.hash(), self.entries.into_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_model::CommitBuilder;
    use strata_store::InMemoryAdapter;
    use strata_types::{CommitMeta, ContentType};

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    fn cid(s: &str) -> ContentId {
        ContentId::new(s).unwrap()
    }

    fn put(k: &str, id: &str) -> Operation {
        Operation::put(key(k), cid(id), ContentType::TABLE, Hash::from_hash([3; 32]))
    }

    fn space_with(ops: Vec<Operation>) -> (InMemoryAdapter, KeySpace) {
        let adapter = InMemoryAdapter::new();
        let commit = CommitBuilder::new(CommitMeta::new("t", "seed"))
            .with_operations(ops)
            .build()
            .unwrap();
        adapter.put_commits(std::slice::from_ref(&commit)).unwrap();
        let space = KeySpace::load(&adapter, commit.hash()).unwrap();
        (adapter, space)
    }

    #[test]
    fn updates_must_keep_the_content_id() {
        let (_adapter, space) = space_with(vec![put("a", "ia")]);
        assert!(space.check(&[put("a", "ia")]).is_ok());
        assert!(matches!(
            space.check(&[put("a", "other")]),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn live_ids_cannot_be_reused_at_new_keys() {
        let (_adapter, space) = space_with(vec![put("a", "ia")]);
        assert!(space.check(&[put("b", "ia")]).is_err());
        // Moving the object is fine.
        assert!(space
            .check(&[Operation::delete(key("a")), put("b", "ia")])
            .is_ok());
    }

    #[test]
    fn one_new_id_per_commit() {
        let (_adapter, space) = space_with(Vec::new());
        assert!(space.check(&[put("x", "new"), put("y", "new")]).is_err());
        assert!(space.check(&[put("x", "n1"), put("y", "n2")]).is_ok());
    }

    #[test]
    fn apply_produces_the_child_key_list() {
        let (adapter, space) = space_with(vec![put("a", "ia"), put("b", "ib")]);
        let parent = adapter.get_commit(&space.entries[&key("a")].commit).unwrap();
        let child = CommitBuilder::new(CommitMeta::new("t", "child"))
            .with_parent(&parent)
            .delete(key("a"))
            .with_operation(put("c", "ic"))
            .build()
            .unwrap();
        let list = space.apply(&child);
        assert_eq!(list.commit, child.hash());
        let keys: Vec<_> = list.entries().iter().map(|e| e.key.to_string()).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(list.get(&key("c")).unwrap().commit, child.hash());
    }
}
