//! Checkout: moves a version to the state of another commit by writing the
//! difference as a new commit on top of the version's tip.

use std::collections::BTreeMap;

use tracing::{debug, instrument, warn};

use crate::change::{Change, EntityKey};
use crate::commit::{generate_derived_commit, DerivedCommitArgs};
use crate::functions::LixFunctionProvider;
use crate::materialization::latest_visible_state;
use crate::session::Session;
use crate::state::{update_state_cache, StateCacheRow, StateFilter};
use crate::version::resolve_state;
use crate::transaction::Transaction;
use crate::LixError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// The derived commit; `None` when the version already matched.
    pub commit_id: Option<String>,
    /// Existing changes reused for added, updated or restored entities.
    pub reused_change_ids: Vec<String>,
    /// Delete changes written for entities the target does not have.
    pub delete_change_ids: Vec<String>,
}

impl TransitionOutcome {
    pub fn is_noop(&self) -> bool {
        self.commit_id.is_none()
    }
}

impl<'a> Transaction<'a> {
    /// Transitions the active version to `to_commit_id`.
    pub fn transition(&mut self, to_commit_id: &str) -> Result<TransitionOutcome, LixError> {
        let version_id = self.active_version_id().to_string();
        self.transition_version(&version_id, to_commit_id)
    }

    #[instrument(skip(self))]
    pub fn transition_version(
        &mut self,
        version_id: &str,
        to_commit_id: &str,
    ) -> Result<TransitionOutcome, LixError> {
        self.flush_pending()?;
        let store = &mut *self.store;
        let from_commit_id = store.versions.require(version_id)?.commit_id.clone();
        store.graph.require_commit(to_commit_id)?;

        let version_filter = StateFilter::version(version_id);
        let current: BTreeMap<EntityKey, &StateCacheRow> = store
            .cache
            .rows(&version_filter)
            .map(|row| (EntityKey::new(&row.schema_key, &row.entity_id, &row.file_id), row))
            .collect();

        // What the version sees through its parent when it has no direct row.
        let parent_id = store.versions.require(version_id)?.inherits_from_version_id.clone();
        let inherited: BTreeMap<EntityKey, String> = match parent_id.as_deref() {
            Some(parent_id) => {
                resolve_state(&store.cache, &store.versions, parent_id, &StateFilter::default())?
                    .into_iter()
                    .map(|row| {
                        (
                            EntityKey::new(&row.schema_key, &row.entity_id, &row.file_id),
                            row.change_id,
                        )
                    })
                    .collect()
            }
            None => BTreeMap::new(),
        };

        let mut warnings = Vec::new();
        let target: BTreeMap<EntityKey, Change> = latest_visible_state(
            &store.graph,
            &store.changes,
            to_commit_id,
            &StateFilter::default(),
            &mut warnings,
        )?
        .into_iter()
        .map(|(key, winner)| (key, winner.change.clone()))
        .collect();
        for warning in &warnings {
            warn!(code = %warning.code, "{}", warning.message);
        }

        let mut delta: Vec<Change> = Vec::new();
        for (key, change) in &target {
            let row = current.get(key);
            let needed = if change.is_delete() {
                // A delete at the target only matters while the entity is
                // visible here, directly or through the parent.
                match row {
                    Some(row) => !row.is_tombstone,
                    None => inherited.contains_key(key),
                }
            } else {
                row.map_or(true, |row| row.change_id != change.id)
            };
            if needed {
                delta.push(change.clone());
            }
        }

        let mut deletes = Vec::new();
        for (key, row) in &current {
            if target.contains_key(key) {
                continue;
            }
            match inherited.get(key) {
                // The target has no direct row, so the parent's row shows
                // through. Pinning the parent's change clears a tombstone or an
                // override that would otherwise hide it.
                Some(change_id) => {
                    if row.is_tombstone || row.change_id != *change_id {
                        delta.push(store.changes.require(change_id)?.clone());
                    }
                }
                None if row.is_tombstone => {}
                None => deletes.push(Change {
                    id: store.functions.uuid_v7(),
                    entity_id: key.entity_id.clone(),
                    schema_key: key.schema_key.clone(),
                    schema_version: row.schema_version.clone(),
                    file_id: key.file_id.clone(),
                    plugin_key: row.plugin_key.clone(),
                    snapshot_content: None,
                    created_at: store.functions.timestamp(),
                }),
            }
        }
        let reused_change_ids: Vec<String> = delta.iter().map(|change| change.id.clone()).collect();
        let delete_change_ids: Vec<String> =
            deletes.iter().map(|change| change.id.clone()).collect();

        if delta.is_empty() && deletes.is_empty() {
            debug!(version_id, to_commit_id, "version already matches target");
            return Ok(TransitionOutcome::default());
        }

        store.changes.append(&store.schemas, deletes.clone())?;
        delta.extend(deletes);

        let commit = generate_derived_commit(
            &mut store.graph,
            &store.changes,
            &mut store.functions,
            DerivedCommitArgs {
                change_ids: delta.iter().map(|change| change.id.clone()).collect(),
                parent_commit_ids: vec![from_commit_id],
            },
        )?;
        store.versions.set_commit(version_id, &commit.id)?;
        update_state_cache(
            &mut store.cache,
            &store.versions,
            &delta,
            &commit.id,
            version_id,
        )?;
        debug!(
            version_id,
            commit_id = %commit.id,
            reused = reused_change_ids.len(),
            deleted = delete_change_ids.len(),
            "transitioned version"
        );

        Ok(TransitionOutcome {
            commit_id: Some(commit.id),
            reused_change_ids,
            delete_change_ids,
        })
    }
}

impl Session {
    pub fn transition(&mut self, to_commit_id: &str) -> Result<TransitionOutcome, LixError> {
        self.transaction(|tx| tx.transition(to_commit_id))
    }

    pub fn transition_version(
        &mut self,
        version_id: &str,
        to_commit_id: &str,
    ) -> Result<TransitionOutcome, LixError> {
        self.transaction(|tx| tx.transition_version(version_id, to_commit_id))
    }
}
