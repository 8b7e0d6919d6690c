//! Key-space materialization.
//!
//! [`scan_keys`] reconstructs the keys visible at a commit by walking
//! first-parent links newest-first and applying each delta: the first
//! decision seen for a key (put or delete) wins. The walk ends at a root
//! commit or at the first commit that has a persisted [`KeyList`], whichever
//! comes first.
//!
//! The scan is lazy: nothing is read until the first call to `next()`. Each
//! ancestor-commit boundary checks the caller's [`Cancellation`] and
//! deadline. A [`ResumeToken`] taken after any yielded entry restarts the
//! scan just past that entry.
//!
//! [`KeyList`]: strata_model::KeyList

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_model::KeyEntry;
use strata_types::{ContentKey, Hash};

use crate::adapter::Adapter;
use crate::error::{StoreError, StoreResult};

/// Cooperative cancellation flag shared between a caller and a running scan.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Position of a scan: the commit being scanned and the last key yielded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeToken {
    pub commit: Hash,
    pub after: ContentKey,
}

/// Options for [`scan_keys`].
#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    /// Only keys under this prefix (segment-wise) are produced.
    pub prefix: Option<ContentKey>,
    /// Only keys strictly greater than this one are produced.
    pub after: Option<ContentKey>,
    pub cancellation: Option<Cancellation>,
    pub deadline: Option<Instant>,
}

impl ScanOptions {
    pub fn with_prefix(mut self, prefix: ContentKey) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    fn admits(&self, key: &ContentKey) -> bool {
        if let Some(prefix) = &self.prefix {
            if !key.starts_with(prefix) {
                return false;
            }
        }
        match &self.after {
            Some(after) => key > after,
            None => true,
        }
    }
}

/// Start a scan of the key space visible at `commit`.
///
/// Scanning [`Hash::NO_ANCESTOR`] yields nothing.
pub fn scan_keys(adapter: &dyn Adapter, commit: Hash, options: ScanOptions) -> ScanKeys<'_> {
    ScanKeys {
        adapter,
        commit,
        options,
        state: ScanState::Walking(Walk {
            next: commit,
            depth: 0,
            decided: BTreeMap::new(),
        }),
        started: Instant::now(),
        last_key: None,
    }
}

/// Collect the complete key space at `commit`, sorted by key.
pub fn key_space(adapter: &dyn Adapter, commit: Hash) -> StoreResult<Vec<KeyEntry>> {
    scan_keys(adapter, commit, ScanOptions::default()).collect()
}

struct Walk {
    next: Hash,
    depth: usize,
    decided: BTreeMap<ContentKey, Option<KeyEntry>>,
}

enum ScanState {
    Walking(Walk),
    Yielding(std::collections::btree_map::IntoIter<ContentKey, Option<KeyEntry>>),
    Done,
}

/// Lazy iterator over the live keys at a commit, in key order.
///
/// After an error the iterator is exhausted.
pub struct ScanKeys<'a> {
    adapter: &'a dyn Adapter,
    commit: Hash,
    options: ScanOptions,
    state: ScanState,
    started: Instant,
    last_key: Option<ContentKey>,
}

impl<'a> ScanKeys<'a> {
    /// Continue a scan from a token taken earlier.
    pub fn resume(adapter: &'a dyn Adapter, token: ResumeToken, mut options: ScanOptions) -> Self {
        options.after = Some(token.after);
        scan_keys(adapter, token.commit, options)
    }

    /// The commit whose key space is being scanned.
    pub fn commit(&self) -> Hash {
        self.commit
    }

    /// Token positioned after the last yielded entry, if any was yielded.
    pub fn resume_token(&self) -> Option<ResumeToken> {
        self.last_key.clone().map(|after| ResumeToken {
            commit: self.commit,
            after,
        })
    }

    fn check_interrupt(&self) -> StoreResult<()> {
        if let Some(cancellation) = &self.options.cancellation {
            if cancellation.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
        }
        if let Some(deadline) = self.options.deadline {
            if Instant::now() >= deadline {
                return Err(StoreError::Timeout {
                    operation: "scan_keys".into(),
                    after: self.started.elapsed(),
                });
            }
        }
        Ok(())
    }

    /// Apply one ancestor. Returns `false` once the key space is complete.
    fn step(&self, walk: &mut Walk) -> StoreResult<bool> {
        if walk.next.is_no_ancestor() {
            return Ok(false);
        }

        if let Some(list) = self.adapter.get_key_list(&walk.next)? {
            tracing::debug!(
                commit = %self.commit.short_hex(),
                snapshot = %walk.next.short_hex(),
                depth = walk.depth,
                "scan reached key list"
            );
            for entry in list.entries() {
                self.decide(walk, entry.key.clone(), Some(entry.clone()));
            }
            return Ok(false);
        }

        let commit = self.adapter.get_commit(&walk.next)?;
        for op in commit.operations() {
            self.decide(walk, op.key().clone(), KeyEntry::from_operation(op, commit.hash()));
        }
        walk.next = commit.parent();
        walk.depth += 1;
        Ok(true)
    }

    fn decide(&self, walk: &mut Walk, key: ContentKey, entry: Option<KeyEntry>) {
        if self.options.admits(&key) {
            walk.decided.entry(key).or_insert(entry);
        }
    }
}

impl Iterator for ScanKeys<'_> {
    type Item = StoreResult<KeyEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, ScanState::Done) {
                ScanState::Walking(mut walk) => {
                    if let Err(e) = self.check_interrupt() {
                        return Some(Err(e));
                    }
                    match self.step(&mut walk) {
                        Ok(true) => self.state = ScanState::Walking(walk),
                        Ok(false) => self.state = ScanState::Yielding(walk.decided.into_iter()),
                        Err(e) => return Some(Err(e)),
                    }
                }
                ScanState::Yielding(mut entries) => {
                    let entry = entries.by_ref().find_map(|(_, entry)| entry)?;
                    self.last_key = Some(entry.key.clone());
                    self.state = ScanState::Yielding(entries);
                    return Some(Ok(entry));
                }
                ScanState::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryAdapter;
    use chrono::{TimeZone, Utc};
    use strata_model::{Commit, CommitBuilder, KeyList};
    use strata_types::{CommitMeta, ContentId, ContentType};

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    fn meta(message: &str) -> CommitMeta {
        CommitMeta::new("scan", message).with_time(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
    }

    fn version(n: u8) -> Hash {
        Hash::from_hash([n; 32])
    }

    /// Builds `a=1, b=1` then `c=2, a deleted` then `b=3`.
    fn history(adapter: &InMemoryAdapter) -> Vec<Commit> {
        let c1 = CommitBuilder::new(meta("c1"))
            .put(key("a"), ContentId::new("A").unwrap(), ContentType::TABLE, version(1))
            .put(key("b"), ContentId::new("B").unwrap(), ContentType::TABLE, version(1))
            .build()
            .unwrap();
        let c2 = CommitBuilder::new(meta("c2"))
            .with_parent(&c1)
            .put(key("c"), ContentId::new("C").unwrap(), ContentType::VIEW, version(2))
            .delete(key("a"))
            .build()
            .unwrap();
        let c3 = CommitBuilder::new(meta("c3"))
            .with_parent(&c2)
            .put(key("b"), ContentId::new("B").unwrap(), ContentType::TABLE, version(3))
            .build()
            .unwrap();
        let commits = vec![c1, c2, c3];
        adapter.put_commits(&commits).unwrap();
        commits
    }

    fn keys_of(entries: &[KeyEntry]) -> Vec<String> {
        entries.iter().map(|e| e.key.to_string()).collect()
    }

    #[test]
    fn no_ancestor_scans_empty() {
        let adapter = InMemoryAdapter::new();
        assert!(key_space(&adapter, Hash::NO_ANCESTOR).unwrap().is_empty());
    }

    #[test]
    fn newest_decision_wins() {
        let adapter = InMemoryAdapter::new();
        let commits = history(&adapter);
        let entries = key_space(&adapter, commits[2].hash()).unwrap();
        assert_eq!(keys_of(&entries), ["b", "c"]);
        assert_eq!(entries[0].version, version(3));
        assert_eq!(entries[0].commit, commits[2].hash());
        assert_eq!(entries[1].commit, commits[1].hash());

        let at_first = key_space(&adapter, commits[0].hash()).unwrap();
        assert_eq!(keys_of(&at_first), ["a", "b"]);
    }

    #[test]
    fn prefix_filters_segment_wise() {
        let adapter = InMemoryAdapter::new();
        let c = CommitBuilder::new(meta("p"))
            .put(key("db.t1"), ContentId::new("1").unwrap(), ContentType::TABLE, version(1))
            .put(key("db.t2"), ContentId::new("2").unwrap(), ContentType::TABLE, version(1))
            .put(key("dbx.t3"), ContentId::new("3").unwrap(), ContentType::TABLE, version(1))
            .build()
            .unwrap();
        adapter.put_commits(std::slice::from_ref(&c)).unwrap();

        let entries: Vec<KeyEntry> = scan_keys(&adapter, c.hash(), ScanOptions::default().with_prefix(key("db")))
            .collect::<StoreResult<_>>()
            .unwrap();
        assert_eq!(keys_of(&entries), ["db.t1", "db.t2"]);
    }

    #[test]
    fn key_list_short_circuits_the_walk() {
        let adapter = InMemoryAdapter::new();
        let c1 = CommitBuilder::new(meta("never stored"))
            .put(key("old"), ContentId::new("O").unwrap(), ContentType::GENERIC, version(1))
            .build()
            .unwrap();
        let c2 = CommitBuilder::new(meta("snapshot")).with_parent(&c1).build().unwrap();
        let c3 = CommitBuilder::new(meta("tip"))
            .with_parent(&c2)
            .put(key("new"), ContentId::new("N").unwrap(), ContentType::GENERIC, version(2))
            .build()
            .unwrap();
        // c1 is deliberately absent: reaching it would fail with NotFound.
        adapter.put_commits(&[c2.clone(), c3.clone()]).unwrap();
        let snapshot = KeyList::new(
            c2.hash(),
            vec![KeyEntry {
                key: key("old"),
                content_id: ContentId::new("O").unwrap(),
                content_type: ContentType::GENERIC,
                version: version(1),
                commit: c1.hash(),
            }],
        );
        adapter.put_key_list(&snapshot).unwrap();

        let entries = key_space(&adapter, c3.hash()).unwrap();
        assert_eq!(keys_of(&entries), ["new", "old"]);
    }

    #[test]
    fn missing_ancestor_surfaces_not_found() {
        let adapter = InMemoryAdapter::new();
        let orphan_parent = CommitBuilder::new(meta("gone")).build().unwrap();
        let c = CommitBuilder::new(meta("child")).with_parent(&orphan_parent).build().unwrap();
        adapter.put_commits(std::slice::from_ref(&c)).unwrap();

        let mut scan = scan_keys(&adapter, c.hash(), ScanOptions::default());
        assert!(matches!(scan.next(), Some(Err(StoreError::NotFound(_)))));
        assert!(scan.next().is_none());
    }

    #[test]
    fn cancellation_stops_at_commit_boundary() {
        let adapter = InMemoryAdapter::new();
        let commits = history(&adapter);
        let cancel = Cancellation::new();
        let mut scan = scan_keys(
            &adapter,
            commits[2].hash(),
            ScanOptions::default().with_cancellation(cancel.clone()),
        );
        cancel.cancel();
        assert!(matches!(scan.next(), Some(Err(StoreError::Cancelled))));
        assert!(scan.next().is_none());
    }

    #[test]
    fn expired_deadline_times_out() {
        let adapter = InMemoryAdapter::new();
        let commits = history(&adapter);
        let past = Instant::now() - Duration::from_millis(1);
        let mut scan = scan_keys(&adapter, commits[2].hash(), ScanOptions::default().with_deadline(past));
        assert!(matches!(
            scan.next(),
            Some(Err(StoreError::Timeout { ref operation, .. })) if operation == "scan_keys"
        ));
    }

    #[test]
    fn resume_token_continues_after_last_key() {
        let adapter = InMemoryAdapter::new();
        let mut builder = CommitBuilder::new(meta("many"));
        for name in ["k1", "k2", "k3", "k4"] {
            builder = builder.put(key(name), ContentId::new(name).unwrap(), ContentType::GENERIC, version(1));
        }
        let c = builder.build().unwrap();
        adapter.put_commits(std::slice::from_ref(&c)).unwrap();

        let mut scan = scan_keys(&adapter, c.hash(), ScanOptions::default());
        assert!(scan.resume_token().is_none());
        let first: Vec<KeyEntry> = scan.by_ref().take(2).collect::<StoreResult<_>>().unwrap();
        assert_eq!(keys_of(&first), ["k1", "k2"]);
        let token = scan.resume_token().unwrap();
        assert_eq!(token.after, key("k2"));

        let rest: Vec<KeyEntry> = ScanKeys::resume(&adapter, token, ScanOptions::default())
            .collect::<StoreResult<_>>()
            .unwrap();
        assert_eq!(keys_of(&rest), ["k3", "k4"]);
    }
}
