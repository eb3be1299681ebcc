use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::traversal::TraversalOptions;
use super::CommitGraph;
use crate::change::{ChangeStore, EntityKey};
use crate::errors;
use crate::LixError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetElement {
    pub change_set_id: String,
    pub change_id: String,
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
}

impl ChangeSetElement {
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(&self.schema_key, &self.entity_id, &self.file_id)
    }
}

/// A group of changes. Elements are unique per entity; adding a second change
/// for the same entity replaces the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ChangeSetRecord", into = "ChangeSetRecord")]
pub struct ChangeSet {
    pub id: String,
    pub immutable_elements: bool,
    elements: BTreeMap<EntityKey, ChangeSetElement>,
}

impl ChangeSet {
    pub fn elements(&self) -> impl Iterator<Item = &ChangeSetElement> {
        self.elements.values()
    }

    pub fn element(&self, key: &EntityKey) -> Option<&ChangeSetElement> {
        self.elements.get(key)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct ChangeSetRecord {
    id: String,
    immutable_elements: bool,
    elements: Vec<ChangeSetElement>,
}

impl From<ChangeSetRecord> for ChangeSet {
    fn from(record: ChangeSetRecord) -> Self {
        Self {
            id: record.id,
            immutable_elements: record.immutable_elements,
            elements: record
                .elements
                .into_iter()
                .map(|element| (element.entity_key(), element))
                .collect(),
        }
    }
}

impl From<ChangeSet> for ChangeSetRecord {
    fn from(change_set: ChangeSet) -> Self {
        Self {
            id: change_set.id,
            immutable_elements: change_set.immutable_elements,
            elements: change_set.elements.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeSetEdge {
    pub parent_id: String,
    pub child_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct CreateChangeSetOptions {
    pub id: String,
    pub change_ids: Vec<String>,
    pub parent_ids: Vec<String>,
    pub immutable_elements: bool,
}

impl CommitGraph {
    pub fn change_set(&self, id: &str) -> Option<&ChangeSet> {
        self.change_sets.get(id)
    }

    pub fn require_change_set(&self, id: &str) -> Result<&ChangeSet, LixError> {
        self.change_set(id)
            .ok_or_else(|| errors::change_set_not_found_error(id))
    }

    /// Creates a change set and the edges to its parents. A change set with
    /// parents must be immutable because edges only connect sealed sets.
    pub fn create_change_set(
        &mut self,
        changes: &ChangeStore,
        options: CreateChangeSetOptions,
    ) -> Result<String, LixError> {
        if self.change_sets.contains_key(&options.id) {
            return Err(errors::primary_key_violation_error(
                "change_set",
                &format!("(id = {})", options.id),
            ));
        }
        let mut seen_parents = BTreeSet::new();
        for parent_id in &options.parent_ids {
            if *parent_id == options.id {
                return Err(errors::self_reference_error("change_set_edge", parent_id));
            }
            let parent = self.change_sets.get(parent_id).ok_or_else(|| {
                errors::foreign_key_violation_error("change_set_edge", "parent_id", parent_id)
            })?;
            if !parent.immutable_elements || !options.immutable_elements {
                return Err(errors::mutable_change_set_edge_error(parent_id, &options.id));
            }
            if !seen_parents.insert(parent_id.as_str()) {
                return Err(errors::primary_key_violation_error(
                    "change_set_edge",
                    &format!("(parent_id = {parent_id}, child_id = {})", options.id),
                ));
            }
        }
        let elements = build_elements(changes, &options.id, &options.change_ids)?;

        self.change_sets.insert(
            options.id.clone(),
            ChangeSet {
                id: options.id.clone(),
                immutable_elements: options.immutable_elements,
                elements,
            },
        );
        for parent_id in options.parent_ids {
            self.change_set_edges.insert(ChangeSetEdge {
                parent_id,
                child_id: options.id.clone(),
            });
        }
        Ok(options.id)
    }

    /// Adds elements to a mutable change set; a later change for the same
    /// entity replaces the earlier element.
    pub fn add_change_set_elements(
        &mut self,
        changes: &ChangeStore,
        change_set_id: &str,
        change_ids: &[String],
    ) -> Result<(), LixError> {
        let change_set = self.require_change_set(change_set_id)?;
        if change_set.immutable_elements {
            return Err(errors::immutable_change_set_error(change_set_id));
        }
        let elements = build_elements(changes, change_set_id, change_ids)?;
        if let Some(change_set) = self.change_sets.get_mut(change_set_id) {
            change_set.elements.extend(elements);
        }
        Ok(())
    }

    pub fn seal_change_set(&mut self, change_set_id: &str) -> Result<(), LixError> {
        let change_set = self
            .change_sets
            .get_mut(change_set_id)
            .ok_or_else(|| errors::change_set_not_found_error(change_set_id))?;
        change_set.immutable_elements = true;
        Ok(())
    }

    pub fn create_change_set_edge(&mut self, parent_id: &str, child_id: &str) -> Result<(), LixError> {
        let parent = self.change_sets.get(parent_id).ok_or_else(|| {
            errors::foreign_key_violation_error("change_set_edge", "parent_id", parent_id)
        })?;
        let child = self.change_sets.get(child_id).ok_or_else(|| {
            errors::foreign_key_violation_error("change_set_edge", "child_id", child_id)
        })?;
        if parent_id == child_id {
            return Err(errors::self_reference_error("change_set_edge", parent_id));
        }
        if !parent.immutable_elements || !child.immutable_elements {
            return Err(errors::mutable_change_set_edge_error(parent_id, child_id));
        }
        let edge = ChangeSetEdge {
            parent_id: parent_id.to_string(),
            child_id: child_id.to_string(),
        };
        if self.change_set_edges.contains(&edge) {
            return Err(errors::primary_key_violation_error(
                "change_set_edge",
                &format!("(parent_id = {parent_id}, child_id = {child_id})"),
            ));
        }
        let reachable_from_child =
            self.change_set_descendants(child_id, TraversalOptions::default())?;
        if reachable_from_child.contains(parent_id) {
            return Err(errors::graph_cycle_error("change_set_edge", parent_id, child_id));
        }
        self.change_set_edges.insert(edge);
        Ok(())
    }

    pub fn change_set_parents(&self, change_set_id: &str) -> Vec<String> {
        self.change_set_edges
            .iter()
            .filter(|edge| edge.child_id == change_set_id)
            .map(|edge| edge.parent_id.clone())
            .collect()
    }

    pub fn change_set_children(&self, change_set_id: &str) -> Vec<String> {
        self.change_set_edges
            .iter()
            .filter(|edge| edge.parent_id == change_set_id)
            .map(|edge| edge.child_id.clone())
            .collect()
    }
}

fn build_elements(
    changes: &ChangeStore,
    change_set_id: &str,
    change_ids: &[String],
) -> Result<BTreeMap<EntityKey, ChangeSetElement>, LixError> {
    let mut elements = BTreeMap::new();
    for change_id in change_ids {
        let change = changes.get(change_id).ok_or_else(|| {
            errors::foreign_key_violation_error("change_set_element", "change_id", change_id)
        })?;
        elements.insert(
            change.entity_key(),
            ChangeSetElement {
                change_set_id: change_set_id.to_string(),
                change_id: change.id.clone(),
                entity_id: change.entity_id.clone(),
                schema_key: change.schema_key.clone(),
                file_id: change.file_id.clone(),
            },
        );
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::CreateChangeSetOptions;
    use crate::change::ChangeStore;
    use crate::errors::ErrorCode;
    use crate::graph::CommitGraph;

    fn sealed(id: &str, parents: &[&str]) -> CreateChangeSetOptions {
        CreateChangeSetOptions {
            id: id.to_string(),
            change_ids: Vec::new(),
            parent_ids: parents.iter().map(|p| p.to_string()).collect(),
            immutable_elements: true,
        }
    }

    #[test]
    fn edge_requires_both_change_sets_immutable() {
        let changes = ChangeStore::default();
        let mut graph = CommitGraph::default();
        graph.create_change_set(&changes, sealed("a", &[])).expect("a");
        graph
            .create_change_set(
                &changes,
                CreateChangeSetOptions {
                    id: "b".to_string(),
                    ..Default::default()
                },
            )
            .expect("b");

        let err = graph
            .create_change_set_edge("a", "b")
            .expect_err("b is mutable");
        assert!(err.is(ErrorCode::MutableChangeSetEdge));

        graph.seal_change_set("b").expect("seal");
        graph.create_change_set_edge("a", "b").expect("edge after sealing");
        assert_eq!(graph.change_set_parents("b"), vec!["a".to_string()]);
    }

    #[test]
    fn edge_rejects_self_reference_missing_nodes_and_duplicates() {
        let changes = ChangeStore::default();
        let mut graph = CommitGraph::default();
        graph.create_change_set(&changes, sealed("a", &[])).expect("a");
        graph.create_change_set(&changes, sealed("b", &["a"])).expect("b");

        let self_edge = graph.create_change_set_edge("a", "a").expect_err("self edge");
        assert!(self_edge.is(ErrorCode::SelfReference));

        let dangling = graph
            .create_change_set_edge("a", "missing")
            .expect_err("missing child");
        assert!(dangling.is(ErrorCode::ForeignKeyViolation));

        let duplicate = graph.create_change_set_edge("a", "b").expect_err("duplicate");
        assert!(duplicate.is(ErrorCode::PrimaryKeyViolation));
    }

    #[test]
    fn edge_rejects_cycles() {
        let changes = ChangeStore::default();
        let mut graph = CommitGraph::default();
        graph.create_change_set(&changes, sealed("a", &[])).expect("a");
        graph.create_change_set(&changes, sealed("b", &["a"])).expect("b");
        graph.create_change_set(&changes, sealed("c", &["b"])).expect("c");

        let err = graph.create_change_set_edge("c", "a").expect_err("cycle");
        assert!(err.is(ErrorCode::GraphCycle));
    }

    #[test]
    fn sealed_change_set_rejects_new_elements() {
        let changes = ChangeStore::default();
        let mut graph = CommitGraph::default();
        graph.create_change_set(&changes, sealed("a", &[])).expect("a");

        let err = graph
            .add_change_set_elements(&changes, "a", &[])
            .expect_err("sealed");
        assert!(err.is(ErrorCode::ImmutableChangeSet));
    }
}
