use serde::{Deserialize, Serialize};
use strata_codec::{Canonical, ObjectKind};
use strata_types::{ContentId, ContentKey, ContentType, Hash};

use crate::commit::Operation;

/// A live key in a materialized key space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub key: ContentKey,
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub version: Hash,
    /// Most recent commit that put this key.
    pub commit: Hash,
}

impl KeyEntry {
    /// Entry produced by applying `op` in `commit`. `None` for deletes.
    pub fn from_operation(op: &Operation, commit: Hash) -> Option<Self> {
        match op {
            Operation::Put {
                key,
                content_id,
                content_type,
                version,
            } => Some(Self {
                key: key.clone(),
                content_id: content_id.clone(),
                content_type: *content_type,
                version: *version,
                commit,
            }),
            Operation::Delete { .. } => None,
        }
    }
}

/// Full snapshot of the key space visible at `commit`, sorted by key.
///
/// Persisted every few commits so a key-space scan can stop walking history
/// once it reaches a commit that has one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyList {
    pub commit: Hash,
    entries: Vec<KeyEntry>,
}

impl KeyList {
    /// Build a snapshot; entries are sorted by key. Later duplicates win.
    pub fn new(commit: Hash, entries: impl IntoIterator<Item = KeyEntry>) -> Self {
        let mut entries: Vec<KeyEntry> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries.dedup_by(|later, earlier| {
            if later.key == earlier.key {
                std::mem::swap(later, earlier);
                true
            } else {
                false
            }
        });
        Self { commit, entries }
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn get(&self, key: &ContentKey) -> Option<&KeyEntry> {
        self.entries
            .binary_search_by(|e| e.key.cmp(key))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Canonical for KeyList {
    const KIND: ObjectKind = ObjectKind::KeyList;

    fn validate(&self) -> Result<(), String> {
        for pair in self.entries.windows(2) {
            if pair[0].key >= pair[1].key {
                return Err(format!("entries not strictly ordered at key {}", pair[1].key));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, n: u8) -> KeyEntry {
        KeyEntry {
            key: ContentKey::parse(key).unwrap(),
            content_id: ContentId::new(format!("id-{key}")).unwrap(),
            content_type: ContentType::GENERIC,
            version: Hash::from_hash([n; 32]),
            commit: Hash::from_hash([100 + n; 32]),
        }
    }

    #[test]
    fn new_sorts_and_keeps_last_duplicate() {
        let list = KeyList::new(
            Hash::from_hash([9; 32]),
            vec![entry("b", 1), entry("a", 2), entry("b", 3)],
        );
        let keys: Vec<String> = list.entries().iter().map(|e| e.key.to_string()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(list.get(&ContentKey::parse("b").unwrap()).unwrap().version, Hash::from_hash([3; 32]));
    }

    #[test]
    fn roundtrip() {
        let list = KeyList::new(Hash::from_hash([1; 32]), vec![entry("x.y", 1), entry("x", 2)]);
        let decoded: KeyList = strata_codec::decode(&strata_codec::encode(&list).unwrap()).unwrap();
        assert_eq!(decoded, list);
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn from_operation_skips_deletes() {
        let key = ContentKey::parse("k").unwrap();
        assert!(KeyEntry::from_operation(&Operation::delete(key), Hash::NO_ANCESTOR).is_none());
    }
}
