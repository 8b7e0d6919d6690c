//! End-to-end scenarios run against every embedded backend.

use std::sync::Barrier;

use strata::{
    CommitMeta, CommitRequest, CommitResult, ContentId, ContentKey, ContentObject, ContentType, Hash, MergeRequest,
    StoreConfig, StoreError, StoreResult, VersionStore,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An initialized store; the directory lives as long as the store.
struct Fixture {
    store: VersionStore,
    _dir: Option<TempDir>,
}

fn open(backend: &str) -> Fixture {
    init_tracing();
    let mut config = StoreConfig::for_backend(backend);
    config.commit.retry_backoff_min_ms = 1;
    config.commit.retry_backoff_max_ms = 5;
    config.commit.max_retries = 32;

    let dir = match backend {
        "memory" => None,
        _ => {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join(format!("store.{backend}"));
            config = config.with_setting("path", path.to_string_lossy().into_owned());
            Some(dir)
        }
    };
    let store = VersionStore::open(&config).unwrap();
    store.initialize().unwrap();
    Fixture { store, _dir: dir }
}

const BACKENDS: [&str; 3] = ["memory", "sqlite", "redb"];

fn key(s: &str) -> ContentKey {
    ContentKey::parse(s).unwrap()
}

fn table(id: &ContentId, body: &str) -> ContentObject {
    ContentObject::new(id.clone(), ContentType::TABLE, body.as_bytes().to_vec())
}

fn body_at(store: &VersionStore, at: &str, k: &str) -> Option<String> {
    store
        .read(at, &key(k))
        .unwrap()
        .map(|c| String::from_utf8(c.body).unwrap())
}

/// `main` at C0 with `a -> 1`; returns C0 and the content id of `a`.
fn seed(store: &VersionStore) -> (Hash, ContentId) {
    let id = ContentId::generate();
    let c0 = store
        .commit(CommitRequest::new("main", CommitMeta::new("seed", "C0")).put(key("a"), table(&id, "1")))
        .unwrap();
    (c0.commit.hash(), id)
}

#[test]
fn disjoint_concurrent_commits_both_land() {
    for backend in BACKENDS {
        let Fixture { store, _dir } = open(backend);
        let (c0, a_id) = seed(&store);
        let barrier = Barrier::new(2);

        let (x, y) = std::thread::scope(|s| {
            let x = s.spawn(|| {
                barrier.wait();
                store.commit(
                    CommitRequest::new("main", CommitMeta::new("x", "a=2"))
                        .expecting(c0)
                        .put(key("a"), table(&a_id, "2")),
                )
            });
            let y = s.spawn(|| {
                barrier.wait();
                store.commit(
                    CommitRequest::new("main", CommitMeta::new("y", "b=3"))
                        .expecting(c0)
                        .put(key("b"), table(&ContentId::generate(), "3")),
                )
            });
            (x.join().unwrap(), y.join().unwrap())
        });
        x.unwrap();
        y.unwrap();

        assert_eq!(body_at(&store, "main", "a").as_deref(), Some("2"), "{backend}");
        assert_eq!(body_at(&store, "main", "b").as_deref(), Some("3"), "{backend}");
        // C0 plus the two commits.
        assert_eq!(store.log("main").unwrap().count(), 3, "{backend}");
    }
}

#[test]
fn colliding_concurrent_commits_surface_a_merge_conflict() {
    for backend in BACKENDS {
        let Fixture { store, _dir } = open(backend);
        let (c0, a_id) = seed(&store);
        let barrier = Barrier::new(2);

        let results: Vec<StoreResult<CommitResult>> = std::thread::scope(|s| {
            let writers: Vec<_> = ["2", "9"]
                .into_iter()
                .map(|value| {
                    let (store, barrier, a_id) = (&store, &barrier, &a_id);
                    s.spawn(move || {
                        barrier.wait();
                        store.commit(
                            CommitRequest::new("main", CommitMeta::new("w", format!("a={value}")))
                                .expecting(c0)
                                .put(key("a"), table(a_id, value)),
                        )
                    })
                })
                .collect();
            writers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "{backend}");
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(
            matches!(loser, StoreError::MergeConflict { keys } if keys == &vec![key("a")]),
            "{backend}: {loser}"
        );

        let winner_body = winners[0].commit.meta().message.trim_start_matches("a=").to_string();
        assert_eq!(body_at(&store, "main", "a"), Some(winner_body), "{backend}");
        assert_eq!(store.log("main").unwrap().count(), 2, "{backend}");
    }
}

#[test]
fn unknown_commits_are_not_found() {
    for backend in BACKENDS {
        let Fixture { store, _dir } = open(backend);
        let err = store.adapter().get_commit(&Hash::from_hash([0xab; 32])).unwrap_err();
        assert!(err.is_not_found(), "{backend}: {err}");
    }
}

#[test]
fn many_writers_lose_nothing() {
    const WRITERS: usize = 6;
    for backend in BACKENDS {
        let Fixture { store, _dir } = open(backend);
        let barrier = Barrier::new(WRITERS);

        std::thread::scope(|s| {
            for i in 0..WRITERS {
                let (store, barrier) = (&store, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    store
                        .commit(
                            CommitRequest::new("main", CommitMeta::new("w", format!("k{i}")))
                                .put(key(&format!("k{i}")), table(&ContentId::generate(), "v")),
                        )
                        .unwrap();
                });
            }
        });

        let keys: Vec<String> = store
            .keys("main", Default::default())
            .unwrap()
            .map(|e| e.unwrap().key.to_string())
            .collect();
        let expected: Vec<String> = (0..WRITERS).map(|i| format!("k{i}")).collect();
        assert_eq!(keys, expected, "{backend}");
    }
}

#[test]
fn branches_merge_back() {
    for backend in BACKENDS {
        let Fixture { store, _dir } = open(backend);
        let (c0, a_id) = seed(&store);
        store.create_branch("feature", c0).unwrap();

        store
            .commit(
                CommitRequest::new("feature", CommitMeta::new("f", "a=2")).put(key("a"), table(&a_id, "2")),
            )
            .unwrap();
        store
            .commit(
                CommitRequest::new("main", CommitMeta::new("m", "b=1"))
                    .put(key("b"), table(&ContentId::generate(), "1")),
            )
            .unwrap();

        let source = store.resolve("feature").unwrap();
        let dry = store
            .merge(MergeRequest::new(source, "main", CommitMeta::new("m", "merge")).dry_run())
            .unwrap();
        assert!(!dry.applied);
        assert_eq!(dry.plan.operations.len(), 1);

        let merged = store
            .merge(MergeRequest::new(source, "main", CommitMeta::new("m", "merge feature")))
            .unwrap();
        let commit = merged.commit.unwrap();
        assert!(commit.is_merge(), "{backend}");
        assert_eq!(body_at(&store, "main", "a").as_deref(), Some("2"));
        assert_eq!(body_at(&store, "main", "b").as_deref(), Some("1"));
    }
}

#[test]
fn tags_pin_history() {
    for backend in BACKENDS {
        let Fixture { store, _dir } = open(backend);
        let (c0, a_id) = seed(&store);
        store.create_tag("v1", c0).unwrap();
        store
            .commit(CommitRequest::new("main", CommitMeta::new("m", "a=2")).put(key("a"), table(&a_id, "2")))
            .unwrap();

        assert_eq!(body_at(&store, "v1", "a").as_deref(), Some("1"));
        assert_eq!(body_at(&store, "main", "a").as_deref(), Some("2"));
        assert_eq!(body_at(&store, &c0.to_hex(), "a").as_deref(), Some("1"));
        assert!(matches!(
            store.commit(CommitRequest::new("v1", CommitMeta::new("m", "no")).delete(key("a"))),
            Err(StoreError::InvalidArgument(_))
        ));
    }
}

#[test]
fn opens_from_a_config_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("store.db");
    let config = dir.path().join("strata.toml");
    std::fs::write(
        &config,
        format!(
            "backend = \"sqlite\"\n\n[commit]\nkey_list_distance = 2\n\n[settings]\npath = {:?}\npool_size = 2\n",
            db.to_string_lossy()
        ),
    )
    .unwrap();

    let store = VersionStore::load(&config).unwrap();
    assert_eq!(store.adapter().name(), "sqlite");
    store.initialize().unwrap();
    let (_, a_id) = seed(&store);
    let second = store
        .commit(CommitRequest::new("main", CommitMeta::new("m", "a=2")).put(key("a"), table(&a_id, "2")))
        .unwrap();
    assert!(store.adapter().get_key_list(&second.commit.hash()).unwrap().is_some());
    store.close().unwrap();
    assert!(db.exists());
}
