//! Three-way merge of one version into another.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument, warn};

use crate::change::EntityKey;
use crate::commit::{generate_derived_commit, DerivedCommitArgs};
use crate::errors;
use crate::materialization::{
    latest_visible_state, populate_state_cache, MaterializationRequest,
};
use crate::session::Session;
use crate::state::StateFilter;
use crate::transaction::Transaction;
use crate::LixError;

/// An entity both versions changed, differently, since their merge base.
/// Merges resolve it in favour of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedConflict {
    pub key: EntityKey,
    pub base_change_id: Option<String>,
    pub source_change_id: String,
    pub target_change_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merge commit; `None` when both tips already agree.
    pub commit_id: Option<String>,
    pub merge_base_commit_id: Option<String>,
    /// Source changes that now decide an entity in the target.
    pub taken_change_ids: Vec<String>,
    pub conflicts: Vec<DetectedConflict>,
}

impl<'a> Transaction<'a> {
    #[instrument(skip(self))]
    pub fn merge_version(
        &mut self,
        source_version_id: &str,
        target_version_id: &str,
    ) -> Result<MergeOutcome, LixError> {
        if source_version_id == target_version_id {
            return Err(errors::invalid_parameter_error(
                "a version cannot be merged into itself",
            ));
        }
        self.flush_pending()?;
        let store = &mut *self.store;
        let source_tip = store.versions.require(source_version_id)?.commit_id.clone();
        let target_tip = store.versions.require(target_version_id)?.commit_id.clone();
        let merge_base = store.graph.merge_base(&source_tip, &target_tip)?;
        if merge_base.as_deref() == Some(source_tip.as_str()) {
            debug!("source already merged");
            return Ok(MergeOutcome {
                merge_base_commit_id: merge_base,
                ..MergeOutcome::default()
            });
        }

        let mut warnings = Vec::new();
        let filter = StateFilter::default();
        let winners_at = |tip: &str, warnings: &mut Vec<_>| {
            latest_visible_state(&store.graph, &store.changes, tip, &filter, warnings).map(
                |winners| {
                    winners
                        .into_iter()
                        .map(|(key, winner)| (key, winner.change.id.clone()))
                        .collect::<BTreeMap<EntityKey, String>>()
                },
            )
        };
        let base = match &merge_base {
            Some(base_tip) => winners_at(base_tip, &mut warnings)?,
            None => BTreeMap::new(),
        };
        let source = winners_at(&source_tip, &mut warnings)?;
        let target = winners_at(&target_tip, &mut warnings)?;
        for warning in &warnings {
            warn!(code = %warning.code, "{}", warning.message);
        }

        let keys: BTreeSet<&EntityKey> = source.keys().chain(target.keys()).collect();
        let mut merged_change_ids = Vec::new();
        let mut taken_change_ids = Vec::new();
        let mut conflicts = Vec::new();
        for key in keys {
            let source_change = source.get(key);
            let target_change = target.get(key);
            if source_change == target_change {
                continue;
            }
            let base_change = base.get(key);
            let source_changed = source_change != base_change;
            let target_changed = target_change != base_change;

            let chosen = match (source_change, target_change) {
                (Some(source_change), Some(target_change)) if source_changed && target_changed => {
                    conflicts.push(DetectedConflict {
                        key: key.clone(),
                        base_change_id: base_change.cloned(),
                        source_change_id: source_change.clone(),
                        target_change_id: target_change.clone(),
                    });
                    taken_change_ids.push(source_change.clone());
                    source_change
                }
                (Some(source_change), _) if source_changed => {
                    taken_change_ids.push(source_change.clone());
                    source_change
                }
                (_, Some(target_change)) => target_change,
                (Some(source_change), None) => {
                    taken_change_ids.push(source_change.clone());
                    source_change
                }
                (None, None) => continue,
            };
            merged_change_ids.push(chosen.clone());
        }

        if merged_change_ids.is_empty() {
            debug!("tips already agree");
            return Ok(MergeOutcome {
                merge_base_commit_id: merge_base,
                ..MergeOutcome::default()
            });
        }

        let commit = generate_derived_commit(
            &mut store.graph,
            &store.changes,
            &mut store.functions,
            DerivedCommitArgs {
                change_ids: merged_change_ids,
                parent_commit_ids: vec![target_tip, source_tip],
            },
        )?;
        store.versions.set_commit(target_version_id, &commit.id)?;
        populate_state_cache(
            &mut store.cache,
            &store.graph,
            &store.changes,
            &store.versions,
            &MaterializationRequest {
                filter: StateFilter::version(target_version_id),
                include_ancestors: false,
            },
        )?;
        debug!(
            commit_id = %commit.id,
            taken = taken_change_ids.len(),
            conflicts = conflicts.len(),
            "merged version"
        );

        Ok(MergeOutcome {
            commit_id: Some(commit.id),
            merge_base_commit_id: merge_base,
            taken_change_ids,
            conflicts,
        })
    }
}

impl Session {
    pub fn merge_version(
        &mut self,
        source_version_id: &str,
        target_version_id: &str,
    ) -> Result<MergeOutcome, LixError> {
        self.transaction(|tx| tx.merge_version(source_version_id, target_version_id))
    }
}
