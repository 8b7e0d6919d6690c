use strata_model::Commit;
use strata_store::{Adapter, StoreResult};
use strata_types::Hash;

/// First-parent history, newest first.
///
/// Stops after the root commit, or after yielding the first read error.
pub struct CommitLog<'a> {
    adapter: &'a dyn Adapter,
    next: Hash,
}

impl<'a> CommitLog<'a> {
    pub fn new(adapter: &'a dyn Adapter, start: Hash) -> Self {
        Self { adapter, next: start }
    }
}

impl Iterator for CommitLog<'_> {
    type Item = StoreResult<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_no_ancestor() {
            return None;
        }
        match self.adapter.get_commit(&self.next) {
            Ok(commit) => {
                self.next = commit.parent();
                Some(Ok(commit))
            }
            Err(e) => {
                self.next = Hash::NO_ANCESTOR;
                Some(Err(e))
            }
        }
    }
}
