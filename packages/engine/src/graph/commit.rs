use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::CommitGraph;
use crate::errors;
use crate::LixError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub change_set_id: String,
    pub parent_commit_ids: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitEdge {
    pub parent_id: String,
    pub child_id: String,
}

#[derive(Debug, Clone)]
pub struct CreateCommitOptions {
    pub id: String,
    pub change_set_id: String,
    pub parent_commit_ids: Vec<String>,
    pub created_at: String,
}

impl CommitGraph {
    pub fn commit(&self, id: &str) -> Option<&Commit> {
        self.commits.get(id)
    }

    pub fn require_commit(&self, id: &str) -> Result<&Commit, LixError> {
        self.commit(id)
            .ok_or_else(|| errors::commit_not_found_error(id))
    }

    /// Creates a commit over `change_set_id`, sealing the change set and
    /// adding one commit edge per parent.
    pub fn create_commit(&mut self, options: CreateCommitOptions) -> Result<Commit, LixError> {
        if self.commits.contains_key(&options.id) {
            return Err(errors::primary_key_violation_error(
                "commit",
                &format!("(id = {})", options.id),
            ));
        }
        if !self.change_sets.contains_key(&options.change_set_id) {
            return Err(errors::foreign_key_violation_error(
                "commit",
                "change_set_id",
                &options.change_set_id,
            ));
        }
        let mut seen = BTreeSet::new();
        for parent_id in &options.parent_commit_ids {
            if *parent_id == options.id {
                return Err(errors::self_reference_error("commit_edge", parent_id));
            }
            if !self.commits.contains_key(parent_id) {
                return Err(errors::foreign_key_violation_error(
                    "commit_edge",
                    "parent_id",
                    parent_id,
                ));
            }
            if !seen.insert(parent_id.as_str()) {
                return Err(errors::primary_key_violation_error(
                    "commit_edge",
                    &format!("(parent_id = {parent_id}, child_id = {})", options.id),
                ));
            }
        }

        self.seal_change_set(&options.change_set_id)?;
        for parent_id in &options.parent_commit_ids {
            self.commit_edges.insert(CommitEdge {
                parent_id: parent_id.clone(),
                child_id: options.id.clone(),
            });
        }
        let commit = Commit {
            id: options.id,
            change_set_id: options.change_set_id,
            parent_commit_ids: options.parent_commit_ids,
            created_at: options.created_at,
        };
        self.commits.insert(commit.id.clone(), commit.clone());
        Ok(commit)
    }

    pub fn commit_parents(&self, commit_id: &str) -> &[String] {
        self.commits
            .get(commit_id)
            .map(|commit| commit.parent_commit_ids.as_slice())
            .unwrap_or_default()
    }

    pub fn commit_children(&self, commit_id: &str) -> Vec<String> {
        self.commit_edges
            .iter()
            .filter(|edge| edge.parent_id == commit_id)
            .map(|edge| edge.child_id.clone())
            .collect()
    }
}
