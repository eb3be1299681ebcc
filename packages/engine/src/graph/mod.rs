//! Change sets and commits, and the two DAGs connecting them.

mod change_set;
mod commit;
mod traversal;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use change_set::{ChangeSet, ChangeSetEdge, ChangeSetElement, CreateChangeSetOptions};
pub use commit::{Commit, CommitEdge, CreateCommitOptions};
pub use traversal::{CommitFilter, TraversalOptions};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitGraph {
    change_sets: BTreeMap<String, ChangeSet>,
    change_set_edges: BTreeSet<ChangeSetEdge>,
    commits: BTreeMap<String, Commit>,
    commit_edges: BTreeSet<CommitEdge>,
}

impl CommitGraph {
    pub fn change_sets(&self) -> impl Iterator<Item = &ChangeSet> {
        self.change_sets.values()
    }

    pub fn change_set_edges(&self) -> impl Iterator<Item = &ChangeSetEdge> {
        self.change_set_edges.iter()
    }

    pub fn commits(&self) -> impl Iterator<Item = &Commit> {
        self.commits.values()
    }

    pub fn commit_edges(&self) -> impl Iterator<Item = &CommitEdge> {
        self.commit_edges.iter()
    }
}
