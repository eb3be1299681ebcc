use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::CommitGraph;
use crate::LixError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalOptions {
    /// Maximum number of edges to follow. `None` is unbounded.
    pub depth: Option<usize>,
    pub include_self: bool,
}

impl TraversalOptions {
    pub fn including_self() -> Self {
        Self {
            depth: None,
            include_self: true,
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// Reachability predicate over commits. `And` intersects its members, so
/// "commits between A and B" is
/// `And([IsDescendantOf(A), IsAncestorOf(B)])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitFilter {
    IsDescendantOf(String, TraversalOptions),
    IsAncestorOf(String, TraversalOptions),
    And(Vec<CommitFilter>),
}

impl CommitFilter {
    pub fn resolve(&self, graph: &CommitGraph) -> Result<BTreeSet<String>, LixError> {
        match self {
            Self::IsDescendantOf(commit_id, options) => graph.is_descendant_of(commit_id, *options),
            Self::IsAncestorOf(commit_id, options) => graph.is_ancestor_of(commit_id, *options),
            Self::And(filters) => {
                let mut filters = filters.iter();
                let Some(first) = filters.next() else {
                    return Ok(graph.commits().map(|commit| commit.id.clone()).collect());
                };
                let mut result = first.resolve(graph)?;
                for filter in filters {
                    let next = filter.resolve(graph)?;
                    result.retain(|id| next.contains(id));
                }
                Ok(result)
            }
        }
    }

    pub fn matches(&self, graph: &CommitGraph, commit_id: &str) -> Result<bool, LixError> {
        Ok(self.resolve(graph)?.contains(commit_id))
    }
}

impl CommitGraph {
    /// Commits that descend from `commit_id` (follow commit edges to children).
    pub fn is_descendant_of(
        &self,
        commit_id: &str,
        options: TraversalOptions,
    ) -> Result<BTreeSet<String>, LixError> {
        self.require_commit(commit_id)?;
        Ok(breadth_first(commit_id, options, |id| self.commit_children(id)))
    }

    /// Commits that `commit_id` descends from (follow parents).
    pub fn is_ancestor_of(
        &self,
        commit_id: &str,
        options: TraversalOptions,
    ) -> Result<BTreeSet<String>, LixError> {
        self.require_commit(commit_id)?;
        Ok(breadth_first(commit_id, options, |id| {
            self.commit_parents(id).to_vec()
        }))
    }

    /// Commits on some path from `from` to `to`, both ends included.
    pub fn commits_between(&self, from: &str, to: &str) -> Result<BTreeSet<String>, LixError> {
        CommitFilter::And(vec![
            CommitFilter::IsDescendantOf(from.to_string(), TraversalOptions::including_self()),
            CommitFilter::IsAncestorOf(to.to_string(), TraversalOptions::including_self()),
        ])
        .resolve(self)
    }

    pub fn change_set_descendants(
        &self,
        change_set_id: &str,
        options: TraversalOptions,
    ) -> Result<BTreeSet<String>, LixError> {
        self.require_change_set(change_set_id)?;
        Ok(breadth_first(change_set_id, options, |id| {
            self.change_set_children(id)
        }))
    }

    pub fn change_set_ancestors(
        &self,
        change_set_id: &str,
        options: TraversalOptions,
    ) -> Result<BTreeSet<String>, LixError> {
        self.require_change_set(change_set_id)?;
        Ok(breadth_first(change_set_id, options, |id| {
            self.change_set_parents(id)
        }))
    }

    /// Minimal distance from `tip` to each of its ancestors (tip included at
    /// depth 0).
    pub fn commit_depths(&self, tip: &str) -> Result<BTreeMap<String, usize>, LixError> {
        self.require_commit(tip)?;
        let mut depths = BTreeMap::new();
        let mut queue = VecDeque::new();
        depths.insert(tip.to_string(), 0usize);
        queue.push_back(tip.to_string());
        while let Some(id) = queue.pop_front() {
            let depth = depths[&id];
            for parent in self.commit_parents(&id) {
                if !depths.contains_key(parent) {
                    depths.insert(parent.clone(), depth + 1);
                    queue.push_back(parent.clone());
                }
            }
        }
        Ok(depths)
    }

    /// Nearest common ancestor of two commits by summed distance; ties go to
    /// the smaller id so the result is stable.
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, LixError> {
        let from_a = self.commit_depths(a)?;
        let from_b = self.commit_depths(b)?;
        Ok(from_a
            .iter()
            .filter_map(|(id, depth_a)| from_b.get(id).map(|depth_b| (depth_a + depth_b, id)))
            .min()
            .map(|(_, id)| id.clone()))
    }
}

fn breadth_first(
    start: &str,
    options: TraversalOptions,
    next: impl Fn(&str) -> Vec<String>,
) -> BTreeSet<String> {
    let mut visited = BTreeSet::new();
    let mut result = BTreeSet::new();
    let mut queue = VecDeque::new();
    visited.insert(start.to_string());
    queue.push_back((start.to_string(), 0usize));
    if options.include_self {
        result.insert(start.to_string());
    }

    while let Some((id, depth)) = queue.pop_front() {
        if options.depth.is_some_and(|limit| depth >= limit) {
            continue;
        }
        for neighbour in next(&id) {
            if visited.insert(neighbour.clone()) {
                result.insert(neighbour.clone());
                queue.push_back((neighbour, depth + 1));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{CommitFilter, TraversalOptions};
    use crate::change::ChangeStore;
    use crate::graph::{CommitGraph, CreateChangeSetOptions, CreateCommitOptions};

    /// c0 <- c1 <- c2 <- c4 (merge) and c0 <- c3 <- c4
    fn diamond() -> CommitGraph {
        let changes = ChangeStore::default();
        let mut graph = CommitGraph::default();
        let commits: [(&str, &[&str]); 5] = [
            ("c0", &[]),
            ("c1", &["c0"]),
            ("c2", &["c1"]),
            ("c3", &["c0"]),
            ("c4", &["c2", "c3"]),
        ];
        for (id, parents) in commits {
            let change_set_id = format!("cs_{id}");
            graph
                .create_change_set(
                    &changes,
                    CreateChangeSetOptions {
                        id: change_set_id.clone(),
                        ..Default::default()
                    },
                )
                .expect("change set");
            graph
                .create_commit(CreateCommitOptions {
                    id: id.to_string(),
                    change_set_id,
                    parent_commit_ids: parents.iter().map(|p| p.to_string()).collect(),
                    created_at: String::new(),
                })
                .expect("commit");
        }
        graph
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn ancestors_respect_depth_and_include_self() {
        let graph = diamond();

        assert_eq!(
            graph
                .is_ancestor_of("c4", TraversalOptions::default())
                .expect("ancestors"),
            set(&["c0", "c1", "c2", "c3"])
        );
        assert_eq!(
            graph
                .is_ancestor_of("c4", TraversalOptions::including_self().with_depth(1))
                .expect("ancestors"),
            set(&["c2", "c3", "c4"])
        );
    }

    #[test]
    fn descendants_follow_children() {
        let graph = diamond();
        assert_eq!(
            graph
                .is_descendant_of("c1", TraversalOptions::default())
                .expect("descendants"),
            set(&["c2", "c4"])
        );
    }

    #[test]
    fn filters_compose_by_intersection() {
        let graph = diamond();
        assert_eq!(graph.commits_between("c1", "c4").expect("between"), set(&["c1", "c2", "c4"]));

        let filter = CommitFilter::And(vec![
            CommitFilter::IsDescendantOf("c0".to_string(), TraversalOptions::default()),
            CommitFilter::IsAncestorOf("c2".to_string(), TraversalOptions::including_self()),
        ]);
        assert!(filter.matches(&graph, "c1").expect("matches"));
        assert!(!filter.matches(&graph, "c3").expect("matches"));
    }

    #[test]
    fn depths_are_minimal_and_merge_base_is_nearest() {
        let graph = diamond();
        let depths = graph.commit_depths("c4").expect("depths");
        assert_eq!(depths["c0"], 2);
        assert_eq!(depths["c1"], 2);

        assert_eq!(graph.merge_base("c2", "c3").expect("base").as_deref(), Some("c0"));
        assert_eq!(graph.merge_base("c4", "c2").expect("base").as_deref(), Some("c2"));
    }

    #[test]
    fn unknown_commit_is_reported() {
        let graph = diamond();
        assert!(graph
            .is_ancestor_of("nope", TraversalOptions::default())
            .is_err());
    }
}
