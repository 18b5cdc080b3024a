//! Branch table: fork points, heads, and ancestry resolution.
//!
//! Branches form a tree rooted at the trunk. A fork records only
//! `(parent, fork_revision)` — no data is copied; visibility below the fork
//! point defers to the parent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use tkb_types::{BranchId, Revision};

use crate::error::StoreError;

/// One branch: its parent and the revision it was forked at.
///
/// The trunk has no parent and fork revision [`Revision::INITIAL`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub id: BranchId,
    pub parent: Option<BranchId>,
    pub fork_revision: Revision,
}

/// Mutable branch state: records, heads, and the next free branch id.
#[derive(Debug)]
pub(crate) struct BranchTable {
    branches: HashMap<BranchId, BranchRecord>,
    heads: HashMap<BranchId, Revision>,
    next_branch: u64,
}

impl BranchTable {
    /// A fresh table containing only the trunk.
    pub fn new() -> Self {
        let trunk = BranchRecord {
            id: BranchId::TRUNK,
            parent: None,
            fork_revision: Revision::INITIAL,
        };
        let mut branches = HashMap::new();
        branches.insert(BranchId::TRUNK, trunk);
        let mut heads = HashMap::new();
        heads.insert(BranchId::TRUNK, Revision::INITIAL);
        Self {
            branches,
            heads,
            next_branch: 1,
        }
    }

    pub fn record(&self, branch: BranchId) -> Result<&BranchRecord, StoreError> {
        self.branches
            .get(&branch)
            .ok_or(StoreError::UnknownBranch(branch))
    }

    pub fn head(&self, branch: BranchId) -> Result<Revision, StoreError> {
        self.heads
            .get(&branch)
            .copied()
            .ok_or(StoreError::UnknownBranch(branch))
    }

    /// Fork a new branch off `parent` at `at`, allocating the next branch id.
    ///
    /// The new branch's head starts at the fork revision; its first own
    /// commit continues the numbering from there.
    pub fn fork(&mut self, parent: BranchId, at: Revision) -> Result<BranchId, StoreError> {
        let branch = BranchId::new(self.next_branch);
        self.register_fork(branch, parent, at)?;
        Ok(branch)
    }

    /// Record a fork with a fixed branch id, as found in a replayed stream.
    pub fn register_fork(
        &mut self,
        branch: BranchId,
        parent: BranchId,
        at: Revision,
    ) -> Result<(), StoreError> {
        if self.branches.contains_key(&branch) {
            return Err(StoreError::BranchExists(branch));
        }
        let parent_head = self.head(parent)?;
        if at > parent_head {
            return Err(StoreError::ForkBeyondHead {
                parent,
                requested: at,
                head: parent_head,
            });
        }

        self.branches.insert(
            branch,
            BranchRecord {
                id: branch,
                parent: Some(parent),
                fork_revision: at,
            },
        );
        self.heads.insert(branch, at);
        self.next_branch = self.next_branch.max(branch.as_u64() + 1);
        Ok(())
    }

    /// Move a branch head forward. Revisions must be strictly increasing;
    /// anything else is an internal-consistency error.
    pub fn advance_head(&mut self, branch: BranchId, revision: Revision) -> Result<(), StoreError> {
        let head = self.head(branch)?;
        if revision <= head {
            return Err(StoreError::RevisionOutOfOrder {
                branch,
                head,
                found: revision,
            });
        }
        self.heads.insert(branch, revision);
        Ok(())
    }

    /// The visibility chain for a branch: the branch itself (uncapped),
    /// then each ancestor capped at the running minimum of fork revisions.
    pub fn ancestry(&self, branch: BranchId) -> Result<Vec<(BranchId, Option<Revision>)>, StoreError> {
        let mut chain = Vec::new();
        let mut cursor = self.record(branch)?;
        let mut cap: Option<Revision> = None;

        loop {
            chain.push((cursor.id, cap));
            match cursor.parent {
                None => break,
                Some(parent) => {
                    cap = Some(match cap {
                        None => cursor.fork_revision,
                        Some(existing) => existing.min(cursor.fork_revision),
                    });
                    cursor = self.record(parent)?;
                }
            }
        }
        Ok(chain)
    }

    /// All known branches, trunk first.
    pub fn all(&self) -> Vec<BranchRecord> {
        let mut records: Vec<BranchRecord> = self.branches.values().cloned().collect();
        records.sort_by_key(|record| record.id);
        records
    }
}
