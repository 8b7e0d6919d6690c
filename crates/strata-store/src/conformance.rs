//! Shared conformance suite for [`Adapter`] implementations.
//!
//! Each public function checks one part of the adapter contract against a
//! fresh, empty adapter and panics on violation. Adapter crates run the whole
//! suite with [`adapter_conformance_tests!`](crate::adapter_conformance_tests),
//! passing an expression that produces a fresh fixture. The fixture must
//! dereference to the adapter (a `Box`, an `Arc`, or a guard type owning a
//! temporary directory).
//!
//! ```ignore
//! mod conformance {
//!     use super::*;
//!     strata_store::adapter_conformance_tests!(Box::new(InMemoryAdapter::new()));
//! }
//! ```

use std::sync::Barrier;

use strata_model::{
    Commit, CommitBuilder, ContentObject, GenerationToken, GlobalState, KeyEntry, KeyList,
    ReferenceKind, ReferenceRecord,
};
use strata_types::{CommitMeta, ContentId, ContentKey, ContentType, Hash};

use crate::adapter::{Adapter, CasOutcome, ReferenceUpdate};
use crate::error::{Missing, StoreError};
use crate::scan::{key_space, scan_keys, ScanOptions};

/// Generate one `#[test]` per conformance case.
#[macro_export]
macro_rules! adapter_conformance_tests {
    ($fixture:expr) => {
        $crate::adapter_conformance_tests!(@cases $fixture;
            commit_roundtrip,
            commit_hash_survives_storage,
            missing_commit_is_not_found,
            put_commits_is_idempotent,
            content_roundtrip,
            missing_content_is_not_found,
            add_reference_rejects_duplicates,
            missing_reference_is_not_found,
            cas_advances_reference,
            cas_with_stale_token_is_rejected,
            cas_is_atomic_under_contention,
            cas_writes_global_state,
            delete_reference_checks_generation,
            list_references_by_prefix,
            key_list_roundtrip,
            scan_keys_materializes_history,
            scan_keys_stops_at_key_list,
            erase_removes_everything,
            close_is_idempotent,
        );
    };
    (@cases $fixture:expr; $($case:ident),* $(,)?) => {
        $(
            #[test]
            fn $case() {
                let fixture = $fixture;
                $crate::conformance::$case(&*fixture);
            }
        )*
    };
}

fn key(s: &str) -> ContentKey {
    ContentKey::parse(s).expect("valid key")
}

fn cid(s: &str) -> ContentId {
    ContentId::new(s).expect("valid content id")
}

fn commit(message: &str, parent: Option<&Commit>, puts: &[(&str, u8)], deletes: &[&str]) -> Commit {
    let mut builder = CommitBuilder::new(CommitMeta::new("conformance", message)).with_head(parent);
    for (k, v) in puts {
        builder = builder.put(key(k), cid(k), ContentType::GENERIC, Hash::from_hash([*v; 32]));
    }
    for k in deletes {
        builder = builder.delete(key(k));
    }
    builder.build().expect("valid commit")
}

fn branch(adapter: &dyn Adapter, name: &str, hash: Hash) -> ReferenceRecord {
    let record = ReferenceRecord::new(name, ReferenceKind::Branch, hash).expect("valid name");
    adapter.add_reference(&record).expect("add reference");
    record
}

pub fn commit_roundtrip(adapter: &dyn Adapter) {
    let c1 = commit("one", None, &[("a", 1)], &[]);
    let c2 = commit("two", Some(&c1), &[("b", 2)], &["a"]);
    adapter.put_commits(&[c1.clone(), c2.clone()]).unwrap();

    let read = adapter.get_commit(&c2.hash()).unwrap();
    assert_eq!(read, c2);
    assert_eq!(read.hash(), c2.hash());
    assert_eq!(read.parents(), &[c1.hash()]);

    let batch = adapter.get_commits(&[c2.hash(), c1.hash()]).unwrap();
    assert_eq!(batch, vec![c2, c1]);
}

/// A stored commit still hashes to its id once read back, merge parents and
/// headers included.
pub fn commit_hash_survives_storage(adapter: &dyn Adapter) {
    let root = commit("root", None, &[("a", 1)], &[]);
    let side = commit("side", Some(&root), &[("b", 2)], &[]);
    let meta = CommitMeta::new("conformance", "merge side into main")
        .with_committer("ci")
        .with_header("ticket", "ST-1")
        .with_header("ticket", "ST-2");
    let merge = CommitBuilder::new(meta)
        .with_parent(&root)
        .with_merge_parent(&side)
        .put(key("b"), cid("b"), ContentType::GENERIC, Hash::from_hash([2; 32]))
        .delete(key("a"))
        .build()
        .expect("valid commit");
    adapter.put_commits(&[root, side.clone(), merge.clone()]).unwrap();

    let read = adapter.get_commit(&merge.hash()).unwrap();
    assert_eq!(read.hash(), merge.hash());
    assert_eq!(strata_codec::hash(&read).unwrap(), merge.hash());
    assert_eq!(read.parents(), merge.parents());
    assert_eq!(read.seq(), side.seq() + 1);
    assert_eq!(read.meta(), merge.meta());

    let batch = adapter.get_commits(&[merge.hash(), side.hash()]).unwrap();
    for (stored, expected) in batch.iter().zip([merge.hash(), side.hash()]) {
        assert_eq!(strata_codec::hash(stored).unwrap(), expected);
    }
}

pub fn missing_commit_is_not_found(adapter: &dyn Adapter) {
    let hash = Hash::from_hash([0x5a; 32]);
    match adapter.get_commit(&hash) {
        Err(StoreError::NotFound(Missing::Commit(h))) => assert_eq!(h, hash),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

pub fn put_commits_is_idempotent(adapter: &dyn Adapter) {
    let c1 = commit("one", None, &[("a", 1)], &[]);
    adapter.put_commits(std::slice::from_ref(&c1)).unwrap();
    adapter.put_commits(std::slice::from_ref(&c1)).unwrap();
    adapter.put_commits(&[]).unwrap();
    assert_eq!(adapter.get_commit(&c1.hash()).unwrap(), c1);
}

pub fn content_roundtrip(adapter: &dyn Adapter) {
    let v1 = ContentObject::new(cid("table-1"), ContentType::TABLE, b"schema v1".to_vec());
    let v2 = ContentObject::new(cid("table-1"), ContentType::TABLE, b"schema v2".to_vec());
    adapter.put_content(&[v1.clone(), v2.clone()]).unwrap();
    adapter.put_content(std::slice::from_ref(&v1)).unwrap();

    assert_eq!(adapter.get_content(&v1.content_id, &v1.version().unwrap()).unwrap(), v1);
    assert_eq!(adapter.get_content(&v2.content_id, &v2.version().unwrap()).unwrap(), v2);
}

pub fn missing_content_is_not_found(adapter: &dyn Adapter) {
    let v1 = ContentObject::new(cid("x"), ContentType::VIEW, b"x".to_vec());
    adapter.put_content(std::slice::from_ref(&v1)).unwrap();
    let err = adapter
        .get_content(&cid("y"), &v1.version().unwrap())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(Missing::Content { .. })), "{err:?}");
    let err = adapter
        .get_content(&cid("x"), &Hash::from_hash([1; 32]))
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
}

pub fn add_reference_rejects_duplicates(adapter: &dyn Adapter) {
    let record = branch(adapter, "main", Hash::NO_ANCESTOR);
    assert_eq!(adapter.get_reference("main").unwrap(), record);
    assert!(matches!(
        adapter.add_reference(&record),
        Err(StoreError::AlreadyExists(name)) if name == "main"
    ));
}

pub fn missing_reference_is_not_found(adapter: &dyn Adapter) {
    assert!(matches!(
        adapter.get_reference("nope"),
        Err(StoreError::NotFound(Missing::Reference(name))) if name == "nope"
    ));
    assert_eq!(adapter.find_reference("nope").unwrap(), None);
    let update = ReferenceUpdate {
        name: "nope".into(),
        expected: GenerationToken::INITIAL,
        new_hash: Hash::from_hash([1; 32]),
        new_generation: GenerationToken(2),
        global_state: Vec::new(),
    };
    assert!(adapter.cas_reference(&update).unwrap_err().is_not_found());
    assert!(adapter
        .delete_reference("nope", GenerationToken::INITIAL)
        .unwrap_err()
        .is_not_found());
}

pub fn cas_advances_reference(adapter: &dyn Adapter) {
    let c1 = commit("one", None, &[("a", 1)], &[]);
    adapter.put_commits(std::slice::from_ref(&c1)).unwrap();
    let main = branch(adapter, "main", Hash::NO_ANCESTOR);

    let update = ReferenceUpdate::advance(&main, c1.hash());
    assert_eq!(adapter.cas_reference(&update).unwrap(), CasOutcome::Success);

    let read = adapter.get_reference("main").unwrap();
    assert_eq!(read.hash, c1.hash());
    assert_eq!(read.generation, GenerationToken(2));
    assert_eq!(read.kind, ReferenceKind::Branch);
}

pub fn cas_with_stale_token_is_rejected(adapter: &dyn Adapter) {
    let main = branch(adapter, "main", Hash::NO_ANCESTOR);
    let first = ReferenceUpdate::advance(&main, Hash::from_hash([1; 32]));
    assert!(adapter.cas_reference(&first).unwrap().is_success());

    let stale = ReferenceUpdate::advance(&main, Hash::from_hash([2; 32]));
    match adapter.cas_reference(&stale).unwrap() {
        CasOutcome::ConflictRejected { current } => {
            assert_eq!(current.hash, Hash::from_hash([1; 32]));
            assert_eq!(current.generation, GenerationToken(2));
        }
        CasOutcome::Success => panic!("stale token must be rejected"),
    }
    assert_eq!(adapter.get_reference("main").unwrap().hash, Hash::from_hash([1; 32]));
}

pub fn cas_is_atomic_under_contention(adapter: &dyn Adapter) {
    const WRITERS: u8 = 8;
    let main = branch(adapter, "main", Hash::NO_ANCESTOR);
    let barrier = Barrier::new(WRITERS as usize);

    let outcomes: Vec<(Hash, CasOutcome)> = std::thread::scope(|s| {
        let handles: Vec<_> = (1..=WRITERS)
            .map(|i| {
                let main = &main;
                let barrier = &barrier;
                s.spawn(move || {
                    let proposed = Hash::from_hash([i; 32]);
                    let update = ReferenceUpdate::advance(main, proposed);
                    barrier.wait();
                    (proposed, adapter.cas_reference(&update).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<Hash> = outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_success())
        .map(|(hash, _)| *hash)
        .collect();
    assert_eq!(winners.len(), 1, "exactly one writer must win: {outcomes:?}");
    let final_ref = adapter.get_reference("main").unwrap();
    assert_eq!(final_ref.hash, winners[0]);
    assert_eq!(final_ref.generation, GenerationToken(2));
}

pub fn cas_writes_global_state(adapter: &dyn Adapter) {
    let main = branch(adapter, "main", Hash::NO_ANCESTOR);
    let state = GlobalState::new(cid("seq-1"), ContentType::TABLE, b"next=7".to_vec());
    assert!(adapter.get_global_state(&state.content_id).unwrap_err().is_not_found());

    let rejected = ReferenceUpdate {
        expected: GenerationToken(9),
        ..ReferenceUpdate::advance(&main, Hash::from_hash([3; 32]))
    }
    .with_global_state([state.clone()]);
    assert!(!adapter.cas_reference(&rejected).unwrap().is_success());
    assert!(adapter.get_global_state(&state.content_id).unwrap_err().is_not_found());

    let update = ReferenceUpdate::advance(&main, Hash::from_hash([3; 32])).with_global_state([state.clone()]);
    assert!(adapter.cas_reference(&update).unwrap().is_success());
    assert_eq!(adapter.get_global_state(&state.content_id).unwrap(), state);
}

pub fn delete_reference_checks_generation(adapter: &dyn Adapter) {
    let main = branch(adapter, "main", Hash::NO_ANCESTOR);
    assert!(adapter
        .cas_reference(&ReferenceUpdate::advance(&main, Hash::from_hash([1; 32])))
        .unwrap()
        .is_success());

    assert!(matches!(
        adapter.delete_reference("main", GenerationToken::INITIAL).unwrap(),
        CasOutcome::ConflictRejected { .. }
    ));
    assert!(adapter.get_reference("main").is_ok());

    assert!(adapter
        .delete_reference("main", GenerationToken(2))
        .unwrap()
        .is_success());
    assert!(adapter.get_reference("main").unwrap_err().is_not_found());
}

pub fn list_references_by_prefix(adapter: &dyn Adapter) {
    for name in ["release/2", "main", "release/1", "feature/x", "releases"] {
        branch(adapter, name, Hash::NO_ANCESTOR);
    }
    let tag = ReferenceRecord::new("release/0", ReferenceKind::Tag, Hash::from_hash([1; 32])).unwrap();
    adapter.add_reference(&tag).unwrap();

    let names = |prefix: &str| -> Vec<String> {
        adapter
            .list_references(prefix)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect()
    };
    assert_eq!(names("release/"), ["release/0", "release/1", "release/2"]);
    assert_eq!(
        names(""),
        ["feature/x", "main", "release/0", "release/1", "release/2", "releases"]
    );
    assert!(names("zzz").is_empty());
    assert_eq!(adapter.list_references("release/0").unwrap()[0], tag);
}

pub fn key_list_roundtrip(adapter: &dyn Adapter) {
    let c1 = commit("one", None, &[("a", 1), ("b.c", 2)], &[]);
    assert_eq!(adapter.get_key_list(&c1.hash()).unwrap(), None);

    let list = KeyList::new(c1.hash(), key_space_of(&c1));
    adapter.put_key_list(&list).unwrap();
    adapter.put_key_list(&list).unwrap();
    assert_eq!(adapter.get_key_list(&c1.hash()).unwrap(), Some(list));
}

fn key_space_of(c: &Commit) -> Vec<KeyEntry> {
    c.operations()
        .iter()
        .filter_map(|op| KeyEntry::from_operation(op, c.hash()))
        .collect()
}

pub fn scan_keys_materializes_history(adapter: &dyn Adapter) {
    let c1 = commit("one", None, &[("a", 1), ("b", 1), ("ns.x", 1)], &[]);
    let c2 = commit("two", Some(&c1), &[("c", 2), ("ns.y", 2)], &["a"]);
    let c3 = commit("three", Some(&c2), &[("b", 3)], &["ns.x"]);
    adapter.put_commits(&[c1, c2, c3.clone()]).unwrap();

    let entries = key_space(adapter, c3.hash()).unwrap();
    let view: Vec<(String, Hash)> = entries.iter().map(|e| (e.key.to_string(), e.version)).collect();
    assert_eq!(
        view,
        vec![
            ("b".to_string(), Hash::from_hash([3; 32])),
            ("c".to_string(), Hash::from_hash([2; 32])),
            ("ns.y".to_string(), Hash::from_hash([2; 32])),
        ]
    );

    let scoped: Vec<String> = scan_keys(adapter, c3.hash(), ScanOptions::default().with_prefix(key("ns")))
        .map(|e| e.unwrap().key.to_string())
        .collect();
    assert_eq!(scoped, ["ns.y"]);
}

pub fn scan_keys_stops_at_key_list(adapter: &dyn Adapter) {
    let c1 = commit("unreachable", None, &[("a", 1)], &[]);
    let c2 = commit("snapshot", Some(&c1), &[("b", 2)], &[]);
    let c3 = commit("tip", Some(&c2), &[("c", 3)], &[]);
    // c1 is never stored; the scan must not need it.
    adapter.put_commits(&[c2.clone(), c3.clone()]).unwrap();
    let mut snapshot = key_space_of(&c1);
    snapshot.extend(key_space_of(&c2));
    adapter.put_key_list(&KeyList::new(c2.hash(), snapshot)).unwrap();

    let keys: Vec<String> = key_space(adapter, c3.hash())
        .unwrap()
        .into_iter()
        .map(|e| e.key.to_string())
        .collect();
    assert_eq!(keys, ["a", "b", "c"]);
}

pub fn erase_removes_everything(adapter: &dyn Adapter) {
    let c1 = commit("one", None, &[("a", 1)], &[]);
    adapter.put_commits(std::slice::from_ref(&c1)).unwrap();
    let main = branch(adapter, "main", Hash::NO_ANCESTOR);
    adapter
        .cas_reference(
            &ReferenceUpdate::advance(&main, c1.hash())
                .with_global_state([GlobalState::new(cid("g"), ContentType::GENERIC, b"s".to_vec())]),
        )
        .unwrap();
    adapter.put_key_list(&KeyList::new(c1.hash(), key_space_of(&c1))).unwrap();

    adapter.erase().unwrap();
    assert!(adapter.get_commit(&c1.hash()).unwrap_err().is_not_found());
    assert!(adapter.get_reference("main").unwrap_err().is_not_found());
    assert!(adapter.list_references("").unwrap().is_empty());
    assert_eq!(adapter.get_key_list(&c1.hash()).unwrap(), None);
    assert!(adapter.get_global_state(&cid("g")).unwrap_err().is_not_found());

    // Still usable after an erase.
    branch(adapter, "main", Hash::NO_ANCESTOR);
}

pub fn close_is_idempotent(adapter: &dyn Adapter) {
    adapter.close().unwrap();
    adapter.close().unwrap();
}

/// Every case by name, for harnesses that cannot use the macro (for example
/// when the backend is only reachable in some environments).
pub const CASES: &[(&str, fn(&dyn Adapter))] = &[
    ("commit_roundtrip", commit_roundtrip),
    ("commit_hash_survives_storage", commit_hash_survives_storage),
    ("missing_commit_is_not_found", missing_commit_is_not_found),
    ("put_commits_is_idempotent", put_commits_is_idempotent),
    ("content_roundtrip", content_roundtrip),
    ("missing_content_is_not_found", missing_content_is_not_found),
    ("add_reference_rejects_duplicates", add_reference_rejects_duplicates),
    ("missing_reference_is_not_found", missing_reference_is_not_found),
    ("cas_advances_reference", cas_advances_reference),
    ("cas_with_stale_token_is_rejected", cas_with_stale_token_is_rejected),
    ("cas_is_atomic_under_contention", cas_is_atomic_under_contention),
    ("cas_writes_global_state", cas_writes_global_state),
    ("delete_reference_checks_generation", delete_reference_checks_generation),
    ("list_references_by_prefix", list_references_by_prefix),
    ("key_list_roundtrip", key_list_roundtrip),
    ("scan_keys_materializes_history", scan_keys_materializes_history),
    ("scan_keys_stops_at_key_list", scan_keys_stops_at_key_list),
    ("erase_removes_everything", erase_removes_everything),
    ("close_is_idempotent", close_is_idempotent),
];
