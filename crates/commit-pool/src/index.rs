//! In-memory index of single commits, keyed by height

use crate::types::{CommitKey, CommitSort, Height, SingleCommit};
use std::collections::{BTreeMap, HashSet};

/// An ordered container of single commits.
///
/// Commits are grouped per height; within a height, insertion order is
/// preserved. A `(height, validator_address)` pair appears at most once.
#[derive(Clone, Debug, Default)]
pub struct CommitIndex {
    by_height: BTreeMap<Height, Vec<SingleCommit>>,
    keys: HashSet<CommitKey>,
}

impl CommitIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a commit. A duplicate `(height, validator_address)` is a
    /// no-op; returns whether the commit was inserted.
    pub fn add(&mut self, commit: SingleCommit) -> bool {
        if !self.keys.insert(commit.key()) {
            return false;
        }
        self.by_height.entry(commit.height).or_default().push(commit);
        true
    }

    /// True if a commit with the same `(height, validator_address)` is present
    pub fn exists(&self, commit: &SingleCommit) -> bool {
        self.keys.contains(&commit.key())
    }

    /// Remove one commit by its uniqueness key; returns whether it was present
    pub fn delete_single(&mut self, commit: &SingleCommit) -> bool {
        if !self.keys.remove(&commit.key()) {
            return false;
        }
        if let Some(commits) = self.by_height.get_mut(&commit.height) {
            commits.retain(|c| c.validator_address != commit.validator_address);
            if commits.is_empty() {
                self.by_height.remove(&commit.height);
            }
        }
        true
    }

    /// Remove every commit at the given height
    pub fn delete_by_height(&mut self, height: Height) {
        if let Some(commits) = self.by_height.remove(&height) {
            for commit in &commits {
                self.keys.remove(&commit.key());
            }
        }
    }

    /// Remove every commit at or below the given height; returns how many
    /// were removed
    pub fn delete_at_or_below(&mut self, height: Height) -> usize {
        let kept = match height.checked_add(1) {
            Some(cutoff) => self.by_height.split_off(&cutoff),
            None => BTreeMap::new(),
        };
        let removed = std::mem::replace(&mut self.by_height, kept);
        let mut count = 0;
        for commits in removed.values() {
            for commit in commits {
                self.keys.remove(&commit.key());
                count += 1;
            }
        }
        count
    }

    /// All commits at a height, in insertion order
    pub fn get_by_height(&self, height: Height) -> Vec<SingleCommit> {
        self.by_height.get(&height).cloned().unwrap_or_default()
    }

    /// All commits ordered by height; within a height, insertion order
    pub fn all(&self, sort: CommitSort) -> Vec<SingleCommit> {
        match sort {
            CommitSort::Asc => self
                .by_height
                .values()
                .flat_map(|commits| commits.iter().cloned())
                .collect(),
            CommitSort::Dsc => self
                .by_height
                .values()
                .rev()
                .flat_map(|commits| commits.iter().cloned())
                .collect(),
        }
    }

    /// Heights currently present, ascending
    pub fn heights(&self) -> Vec<Height> {
        self.by_height.keys().copied().collect()
    }

    /// Number of commits stored
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// True if the index holds no commits
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
