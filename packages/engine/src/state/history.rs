use std::collections::BTreeSet;

use crate::change::{Change, ChangeStore, EntityKey};
use crate::graph::CommitGraph;
use crate::LixError;

/// One change to an entity as seen from some commit.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub change: Change,
    pub commit_id: String,
    /// Distance from the commit the history was taken at.
    pub depth: usize,
}

/// Changes to `key` reachable from `tip_commit_id`, nearest commit first.
/// A change reused by several commits is listed once, at its nearest commit.
pub fn state_history(
    graph: &CommitGraph,
    changes: &ChangeStore,
    tip_commit_id: &str,
    key: &EntityKey,
) -> Result<Vec<HistoryEntry>, LixError> {
    let mut commits: Vec<(usize, String)> = graph
        .commit_depths(tip_commit_id)?
        .into_iter()
        .map(|(commit_id, depth)| (depth, commit_id))
        .collect();
    commits.sort();

    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();
    for (depth, commit_id) in commits {
        let commit = graph.require_commit(&commit_id)?;
        let Some(element) = graph
            .change_set(&commit.change_set_id)
            .and_then(|change_set| change_set.element(key))
        else {
            continue;
        };
        if !seen.insert(element.change_id.clone()) {
            continue;
        }
        entries.push(HistoryEntry {
            change: changes.require(&element.change_id)?.clone(),
            commit_id,
            depth,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::state_history;
    use crate::change::{Change, ChangeStore, EntityKey};
    use crate::graph::{CommitGraph, CreateChangeSetOptions, CreateCommitOptions};
    use crate::schema::SchemaRegistry;

    #[test]
    fn history_lists_nearest_first_without_duplicates() {
        let mut registry = SchemaRegistry::default();
        registry
            .register(json!({
                "x-lix-key": "note",
                "x-lix-version": "1.0",
                "type": "object",
                "properties": { "body": { "type": "string" } }
            }))
            .expect("schema");
        let mut changes = ChangeStore::default();
        let mut graph = CommitGraph::default();

        let steps: [(&str, Option<&str>, &[&str], &[&str]); 3] = [
            ("c0", Some("first"), &[], &["ch_c0"]),
            ("c1", Some("second"), &["c0"], &["ch_c1"]),
            ("c2", None, &["c1"], &["ch_c0"]),
        ];
        for (commit_id, body, parents, change_ids) in steps {
            if let Some(body) = body {
                changes
                    .append(
                        &registry,
                        vec![Change {
                            id: format!("ch_{commit_id}"),
                            entity_id: "n".to_string(),
                            schema_key: "note".to_string(),
                            schema_version: "1.0".to_string(),
                            file_id: "f".to_string(),
                            plugin_key: "p".to_string(),
                            snapshot_content: Some(json!({ "body": body })),
                            created_at: format!("t_{commit_id}"),
                        }],
                    )
                    .expect("append");
            }
            let change_set_id = format!("cs_{commit_id}");
            graph
                .create_change_set(
                    &changes,
                    CreateChangeSetOptions {
                        id: change_set_id.clone(),
                        change_ids: change_ids.iter().map(|id| id.to_string()).collect(),
                        ..Default::default()
                    },
                )
                .expect("change set");
            graph
                .create_commit(CreateCommitOptions {
                    id: commit_id.to_string(),
                    change_set_id,
                    parent_commit_ids: parents.iter().map(|id| id.to_string()).collect(),
                    created_at: String::new(),
                })
                .expect("commit");
        }

        let history = state_history(&graph, &changes, "c2", &EntityKey::new("note", "n", "f"))
            .expect("history");
        let listed: Vec<_> = history
            .iter()
            .map(|entry| (entry.commit_id.as_str(), entry.change.id.as_str()))
            .collect();
        assert_eq!(listed, vec![("c2", "ch_c0"), ("c1", "ch_c1")]);
    }
}
