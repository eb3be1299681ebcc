use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use crate::builtin_schema::KEY_VALUE_SCHEMA_KEY;
use crate::change::{Change, NewChange};
use crate::commit::{generate_commit, open_pending_commit, PendingCommit};
use crate::deterministic_mode::{DeterministicSettings, DETERMINISTIC_MODE_KEY};
use crate::engine::Engine;
use crate::functions::LixFunctionProvider;
use crate::key_value::{key_value_change, read_key_value};
use crate::graph::{Commit, CreateChangeSetOptions, CreateCommitOptions};
use crate::materialization::{populate_state_cache, MaterializationReport, MaterializationRequest};
use crate::schema::SchemaKey;
use crate::state::{update_state_cache, StateCacheRow, StateFilter};
use crate::store::Store;
use crate::version::{resolve_state, Version, GLOBAL_VERSION_ID};
use crate::LixError;

/// An open write transaction. Obtained from [`Engine::transaction`] or a
/// [`crate::Session`]; operations nested inside one another share it.
pub struct Transaction<'a> {
    engine: &'a Engine,
    pub(crate) store: &'a mut Store,
    active_version_id: String,
    pending: Vec<PendingCommit>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(engine: &'a Engine, store: &'a mut Store, active_version_id: String) -> Self {
        Self {
            engine,
            store,
            active_version_id,
            pending: Vec::new(),
        }
    }

    pub(crate) fn engine(&self) -> &'a Engine {
        self.engine
    }

    pub fn store(&self) -> &Store {
        &*self.store
    }

    pub fn active_version_id(&self) -> &str {
        &self.active_version_id
    }

    pub(crate) fn set_active_version_id(&mut self, version_id: String) {
        self.active_version_id = version_id;
    }

    pub fn active_version(&self) -> Result<&Version, LixError> {
        self.store.versions.require(&self.active_version_id)
    }

    pub fn uuid_v7(&mut self) -> String {
        self.store.functions.uuid_v7()
    }

    pub fn timestamp(&mut self) -> String {
        self.store.functions.timestamp()
    }

    pub fn register_schema(&mut self, value: JsonValue) -> Result<SchemaKey, LixError> {
        self.store.schemas.register(value)
    }

    /// Records a change in the active version.
    pub fn record_change(&mut self, change: NewChange) -> Result<Change, LixError> {
        let version_id = self.active_version_id.clone();
        self.record_change_in_version(&version_id, change)
    }

    /// The single write path: appends the change, adds it to the version's
    /// pending change set and applies it to the state cache.
    pub fn record_change_in_version(
        &mut self,
        version_id: &str,
        change: NewChange,
    ) -> Result<Change, LixError> {
        self.store.versions.require(version_id)?;
        let id = self.store.functions.uuid_v7();
        let created_at = self.store.functions.timestamp();
        let change = change.into_change(id, created_at);
        self.store
            .changes
            .append(&self.store.schemas, vec![change.clone()])?;

        let pending = self.pending_commit(version_id)?;
        self.store.graph.add_change_set_elements(
            &self.store.changes,
            &pending.change_set_id,
            std::slice::from_ref(&change.id),
        )?;
        update_state_cache(
            &mut self.store.cache,
            &self.store.versions,
            std::slice::from_ref(&change),
            &pending.commit_id,
            version_id,
        )?;
        self.apply_runtime_setting(version_id, &change);
        Ok(change)
    }

    fn pending_commit(&mut self, version_id: &str) -> Result<PendingCommit, LixError> {
        if let Some(pending) = self
            .pending
            .iter()
            .find(|pending| pending.version_id == version_id)
        {
            return Ok(pending.clone());
        }
        let pending = open_pending_commit(
            &mut self.store.graph,
            &self.store.changes,
            &mut self.store.functions,
            version_id,
        )?;
        debug!(version_id, change_set_id = %pending.change_set_id, "opened pending change set");
        self.pending.push(pending.clone());
        Ok(pending)
    }

    fn apply_runtime_setting(&mut self, version_id: &str, change: &Change) {
        if version_id != GLOBAL_VERSION_ID
            || change.schema_key != KEY_VALUE_SCHEMA_KEY
            || change.entity_id != DETERMINISTIC_MODE_KEY
        {
            return;
        }
        let settings = change
            .snapshot_content
            .as_ref()
            .and_then(|snapshot| snapshot.get("value"))
            .map(DeterministicSettings::from_mode_value)
            .unwrap_or_default();
        self.store.functions.set_settings(settings);
    }

    /// Commits every pending change set, in the order they were opened.
    pub(crate) fn flush_pending(&mut self) -> Result<Vec<Commit>, LixError> {
        let mut commits = Vec::with_capacity(self.pending.len());
        for pending in std::mem::take(&mut self.pending) {
            commits.push(generate_commit(
                &mut self.store.graph,
                &mut self.store.versions,
                &mut self.store.functions,
                pending,
            )?);
        }
        Ok(commits)
    }

    /// Commits pending work and hands back the final active version pointer.
    pub(crate) fn finish(mut self) -> Result<String, LixError> {
        self.flush_pending()?;
        Ok(self.active_version_id)
    }

    /// Appends fully formed changes without touching versions or the cache.
    pub fn append_changes(&mut self, changes: Vec<Change>) -> Result<Vec<String>, LixError> {
        self.store.changes.append(&self.store.schemas, changes)
    }

    pub fn create_change_set(&mut self, options: CreateChangeSetOptions) -> Result<String, LixError> {
        self.store
            .graph
            .create_change_set(&self.store.changes, options)
    }

    pub fn add_change_set_elements(
        &mut self,
        change_set_id: &str,
        change_ids: &[String],
    ) -> Result<(), LixError> {
        self.store
            .graph
            .add_change_set_elements(&self.store.changes, change_set_id, change_ids)
    }

    pub fn create_change_set_edge(&mut self, parent_id: &str, child_id: &str) -> Result<(), LixError> {
        self.store.graph.create_change_set_edge(parent_id, child_id)
    }

    /// Creates a commit with a generated id and timestamp.
    pub fn create_commit(
        &mut self,
        change_set_id: &str,
        parent_commit_ids: Vec<String>,
    ) -> Result<Commit, LixError> {
        let id = self.store.functions.uuid_v7();
        let created_at = self.store.functions.timestamp();
        self.store.graph.create_commit(CreateCommitOptions {
            id,
            change_set_id: change_set_id.to_string(),
            parent_commit_ids,
            created_at,
        })
    }

    /// Visible state of `version_id` (active version when unset in the
    /// filter).
    pub fn resolve_state(&self, filter: &StateFilter) -> Result<Vec<StateCacheRow>, LixError> {
        let version_id = filter
            .version_id
            .as_deref()
            .unwrap_or(&self.active_version_id);
        resolve_state(&self.store.cache, &self.store.versions, version_id, filter)
    }

    #[instrument(skip_all)]
    pub fn populate_state_cache(
        &mut self,
        req: &MaterializationRequest,
    ) -> Result<MaterializationReport, LixError> {
        self.flush_pending()?;
        let store = &mut *self.store;
        populate_state_cache(
            &mut store.cache,
            &store.graph,
            &store.changes,
            &store.versions,
            req,
        )
    }

    /// Writes `key` into the global version.
    pub fn set_key_value(&mut self, key: &str, value: JsonValue) -> Result<Change, LixError> {
        self.record_change_in_version(GLOBAL_VERSION_ID, key_value_change(key, value))
    }

    pub fn get_key_value(&self, key: &str) -> Result<Option<JsonValue>, LixError> {
        read_key_value(&*self.store, key)
    }
}
