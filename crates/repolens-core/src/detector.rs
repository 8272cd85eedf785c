//! Change detection between the persisted sync state and a fresh fetch
//!
//! Classification is a pure function over the two snapshot lists: no I/O,
//! no side effects. A fetch failure must be handled by the caller before
//! this module is involved; an empty fetched list here always means the
//! provider reported success with zero repositories.

use std::collections::BTreeSet;

use crate::snapshot::RepositorySnapshot;
use crate::state::SyncState;

/// Disjoint classification of every repository seen across the previous
/// state and a fresh fetch.
///
/// `added` and `modified` carry the freshly fetched snapshots (the data that
/// will be persisted); `unchanged` and `removed` carry identifiers only.
#[derive(Debug, Clone, Default)]
pub struct ChangeReport {
    /// Identifiers present in both lists with no newer timestamp
    pub unchanged: Vec<String>,
    /// Snapshots not present in the previous state
    pub added: Vec<RepositorySnapshot>,
    /// Snapshots present in both lists with a strictly newer timestamp
    pub modified: Vec<RepositorySnapshot>,
    /// Identifiers present in the previous state but absent from the fetch
    pub removed: Vec<String>,
}

impl ChangeReport {
    /// Check if any changes were detected.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.removed.is_empty()
    }

    /// Total number of changed repositories.
    pub fn total_changes(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Snapshots that need (re-)indexing: added and modified.
    pub fn to_index(&self) -> impl Iterator<Item = &RepositorySnapshot> {
        self.added.iter().chain(self.modified.iter())
    }
}

/// Diff a freshly fetched snapshot list against the last persisted state.
///
/// A repository is `modified` iff its identifier exists in both sets and the
/// new `pushed_at` is strictly newer than the stored one. Equal or older
/// timestamps classify as `unchanged` even if other fields differ - the
/// timestamp is the only signal of genuine upstream change, and re-embedding
/// on anything weaker would defeat the cost-avoidance goal.
pub fn detect_changes(previous: &SyncState, fetched: &[RepositorySnapshot]) -> ChangeReport {
    let mut report = ChangeReport::default();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for snapshot in fetched {
        seen.insert(snapshot.id.as_str());

        match previous.get(&snapshot.id) {
            None => report.added.push(snapshot.clone()),
            Some(entry) => {
                if snapshot.pushed_at > entry.snapshot.pushed_at {
                    report.modified.push(snapshot.clone());
                } else {
                    report.unchanged.push(snapshot.id.clone());
                }
            }
        }
    }

    for id in previous.repos.keys() {
        if !seen.contains(id.as_str()) {
            report.removed.push(id.clone());
        }
    }

    report
}
