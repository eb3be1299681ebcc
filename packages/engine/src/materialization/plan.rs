use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::change::{Change, ChangeStore, EntityKey};
use crate::graph::CommitGraph;
use crate::materialization::types::{
    MaterializationPlan, MaterializationRequest, MaterializationWarning, MaterializationWrite,
    MaterializationWriteOp,
};
use crate::state::{StateCacheRow, StateFilter};
use crate::version::{Version, VersionStore};
use crate::LixError;

/// The change that decides an entity's state at some commit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VisibleWinner<'a> {
    pub depth: usize,
    pub commit_id: &'a str,
    pub change: &'a Change,
}

impl VisibleWinner<'_> {
    /// Nearer commits win; within one depth the newer change, then the
    /// larger id.
    fn beats(&self, other: &VisibleWinner<'_>) -> bool {
        let order = self
            .depth
            .cmp(&other.depth)
            .then_with(|| other.change.created_at.cmp(&self.change.created_at))
            .then_with(|| other.change.id.cmp(&self.change.id));
        order == Ordering::Less
    }
}

/// Latest visible change per entity reachable from `tip_commit_id`, deletes
/// included.
pub(crate) fn latest_visible_state<'a>(
    graph: &'a CommitGraph,
    changes: &'a ChangeStore,
    tip_commit_id: &str,
    filter: &StateFilter,
    warnings: &mut Vec<MaterializationWarning>,
) -> Result<BTreeMap<EntityKey, VisibleWinner<'a>>, LixError> {
    let depths = graph.commit_depths(tip_commit_id)?;
    let mut winners: BTreeMap<EntityKey, VisibleWinner<'a>> = BTreeMap::new();

    for (commit_id, depth) in depths {
        let Some(commit) = graph.commit(&commit_id) else {
            continue;
        };
        let Some(change_set) = graph.change_set(&commit.change_set_id) else {
            warnings.push(MaterializationWarning {
                code: "missing_change_set".to_string(),
                message: format!(
                    "commit '{}' references missing change set '{}'",
                    commit.id, commit.change_set_id
                ),
            });
            continue;
        };
        for element in change_set.elements() {
            if !element_matches(filter, &element.entity_id, &element.schema_key, &element.file_id) {
                continue;
            }
            let Some(change) = changes.get(&element.change_id) else {
                warnings.push(MaterializationWarning {
                    code: "missing_change".to_string(),
                    message: format!(
                        "change set '{}' references missing change '{}'",
                        change_set.id, element.change_id
                    ),
                });
                continue;
            };
            let candidate = VisibleWinner {
                depth,
                commit_id: commit.id.as_str(),
                change,
            };
            let key = change.entity_key();
            let replace = winners
                .get(&key)
                .map_or(true, |current| candidate.beats(current));
            if replace {
                winners.insert(key, candidate);
            }
        }
    }
    Ok(winners)
}

fn element_matches(filter: &StateFilter, entity_id: &str, schema_key: &str, file_id: &str) -> bool {
    filter.entity_id.as_deref().map_or(true, |v| v == entity_id)
        && filter.schema_key.as_deref().map_or(true, |v| v == schema_key)
        && filter.file_id.as_deref().map_or(true, |v| v == file_id)
}

pub(crate) fn materialization_plan(
    graph: &CommitGraph,
    changes: &ChangeStore,
    versions: &VersionStore,
    req: &MaterializationRequest,
) -> Result<MaterializationPlan, LixError> {
    let target_versions = resolve_target_versions(versions, req)?;
    let mut warnings = Vec::new();
    let mut writes = Vec::new();

    for version_id in &target_versions {
        let version = versions.require(version_id)?;
        writes.extend(build_version_writes(
            graph,
            changes,
            version,
            &req.filter,
            &mut warnings,
        )?);
    }

    Ok(MaterializationPlan {
        versions: target_versions,
        filter: req.filter.clone(),
        writes,
        warnings,
    })
}

fn resolve_target_versions(
    versions: &VersionStore,
    req: &MaterializationRequest,
) -> Result<BTreeSet<String>, LixError> {
    match req.filter.version_id.as_deref() {
        None => Ok(versions.iter().map(|version| version.id.clone()).collect()),
        Some(version_id) if req.include_ancestors => Ok(versions
            .inheritance_chain(version_id)?
            .into_iter()
            .map(|version| version.id.clone())
            .collect()),
        Some(version_id) => {
            versions.require(version_id)?;
            Ok(BTreeSet::from([version_id.to_string()]))
        }
    }
}

/// Direct rows of one version: one row per winning change, tombstones only
/// where the version inherits from another version.
fn build_version_writes(
    graph: &CommitGraph,
    changes: &ChangeStore,
    version: &Version,
    filter: &StateFilter,
    warnings: &mut Vec<MaterializationWarning>,
) -> Result<Vec<MaterializationWrite>, LixError> {
    let inherits = version.inherits_from_version_id.is_some();
    let winners = latest_visible_state(graph, changes, &version.commit_id, filter, warnings)?;

    let mut writes = Vec::with_capacity(winners.len());
    for winner in winners.values() {
        let op = if winner.change.is_delete() {
            if !inherits {
                continue;
            }
            MaterializationWriteOp::Tombstone
        } else {
            MaterializationWriteOp::Upsert
        };
        writes.push(MaterializationWrite {
            op,
            row: StateCacheRow::from_change(winner.change, &version.id, winner.commit_id),
        });
    }
    Ok(writes)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{latest_visible_state, materialization_plan};
    use crate::change::{Change, ChangeStore, EntityKey};
    use crate::graph::{CommitGraph, CreateChangeSetOptions, CreateCommitOptions};
    use crate::materialization::{MaterializationRequest, MaterializationWriteOp};
    use crate::schema::SchemaRegistry;
    use crate::state::StateFilter;
    use crate::version::{Version, VersionStore};

    struct Fixture {
        changes: ChangeStore,
        graph: CommitGraph,
        registry: SchemaRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = SchemaRegistry::default();
            registry
                .register(json!({
                    "x-lix-key": "line",
                    "x-lix-version": "1.0",
                    "type": "object",
                    "properties": { "text": { "type": "string" } }
                }))
                .expect("schema");
            Self {
                changes: ChangeStore::default(),
                graph: CommitGraph::default(),
                registry,
            }
        }

        fn commit(&mut self, id: &str, parents: &[&str], lines: &[(&str, &str, Option<&str>)]) {
            let mut ids = Vec::new();
            for (change_id, entity_id, text) in lines {
                self.changes
                    .append(
                        &self.registry,
                        vec![Change {
                            id: change_id.to_string(),
                            entity_id: entity_id.to_string(),
                            schema_key: "line".to_string(),
                            schema_version: "1.0".to_string(),
                            file_id: "f".to_string(),
                            plugin_key: "p".to_string(),
                            snapshot_content: text.map(|t| json!({ "text": t })),
                            created_at: format!("2024-01-01T00:00:00.{change_id}Z"),
                        }],
                    )
                    .expect("append");
                ids.push(change_id.to_string());
            }
            let change_set_id = format!("cs_{id}");
            self.graph
                .create_change_set(
                    &self.changes,
                    CreateChangeSetOptions {
                        id: change_set_id.clone(),
                        change_ids: ids,
                        ..Default::default()
                    },
                )
                .expect("change set");
            self.graph
                .create_commit(CreateCommitOptions {
                    id: id.to_string(),
                    change_set_id,
                    parent_commit_ids: parents.iter().map(|p| p.to_string()).collect(),
                    created_at: String::new(),
                })
                .expect("commit");
        }
    }

    #[test]
    fn nearest_commit_wins() {
        let mut fixture = Fixture::new();
        fixture.commit("c0", &[], &[("100", "l0", Some("a")), ("101", "l1", Some("b"))]);
        fixture.commit("c1", &["c0"], &[("102", "l0", Some("a2"))]);

        let mut warnings = Vec::new();
        let winners = latest_visible_state(
            &fixture.graph,
            &fixture.changes,
            "c1",
            &StateFilter::default(),
            &mut warnings,
        )
        .expect("winners");

        let l0 = &winners[&EntityKey::new("line", "l0", "f")];
        assert_eq!(l0.change.id, "102");
        assert_eq!(l0.commit_id, "c1");
        assert_eq!(winners[&EntityKey::new("line", "l1", "f")].depth, 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn merge_branches_at_equal_depth_prefer_newer_change() {
        let mut fixture = Fixture::new();
        fixture.commit("c0", &[], &[("100", "l0", Some("base"))]);
        fixture.commit("a", &["c0"], &[("200", "l0", Some("left"))]);
        fixture.commit("b", &["c0"], &[("300", "l0", Some("right"))]);
        fixture.commit("m", &["a", "b"], &[]);

        let mut warnings = Vec::new();
        let winners = latest_visible_state(
            &fixture.graph,
            &fixture.changes,
            "m",
            &StateFilter::default(),
            &mut warnings,
        )
        .expect("winners");
        assert_eq!(winners[&EntityKey::new("line", "l0", "f")].change.id, "300");
    }

    #[test]
    fn deletes_become_tombstones_only_in_inheriting_versions() {
        let mut fixture = Fixture::new();
        fixture.commit("c0", &[], &[("100", "l0", Some("a"))]);
        fixture.commit("c1", &["c0"], &[("101", "l0", None)]);

        let mut versions = VersionStore::default();
        versions.insert(Version::new("global", "global", "c1", None)).expect("global");
        versions
            .insert(Version::new("main", "main", "c1", Some("global")))
            .expect("main");

        let plan = materialization_plan(
            &fixture.graph,
            &fixture.changes,
            &versions,
            &MaterializationRequest::full(),
        )
        .expect("plan");

        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].op, MaterializationWriteOp::Tombstone);
        assert_eq!(plan.writes[0].row.version_id, "main");
        assert!(plan.writes[0].row.is_tombstone);
    }

    #[test]
    fn version_filter_includes_ancestors() {
        let mut fixture = Fixture::new();
        fixture.commit("c0", &[], &[]);
        let mut versions = VersionStore::default();
        versions.insert(Version::new("global", "global", "c0", None)).expect("global");
        versions
            .insert(Version::new("main", "main", "c0", Some("global")))
            .expect("main");
        versions
            .insert(Version::new("other", "other", "c0", Some("global")))
            .expect("other");

        let plan = materialization_plan(
            &fixture.graph,
            &fixture.changes,
            &versions,
            &MaterializationRequest::for_filter(StateFilter::version("main")),
        )
        .expect("plan");
        let targets: Vec<_> = plan.versions.iter().map(String::as_str).collect();
        assert_eq!(targets, vec!["global", "main"]);
    }
}
