use serde_json::Value as JsonValue;

use crate::change::{Change, EntityKey, NewChange};
use crate::engine::Engine;
use crate::key_value::read_key_value;
use crate::materialization::{MaterializationReport, MaterializationRequest};
use crate::state::{state_history, HistoryEntry, StateCacheRow, StateFilter};
use crate::transaction::Transaction;
use crate::version::{resolve_state, Version};
use crate::LixError;

/// A handle with its own active version pointer. Sessions on the same engine
/// share the store but not the pointer.
#[derive(Debug, Clone)]
pub struct Session {
    engine: Engine,
    active_version_id: String,
}

impl Session {
    pub(crate) fn new(engine: Engine, active_version_id: String) -> Self {
        Self {
            engine,
            active_version_id,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn active_version_id(&self) -> &str {
        &self.active_version_id
    }

    pub(crate) fn set_active_version_id(&mut self, version_id: String) {
        self.active_version_id = version_id;
    }

    pub fn active_version(&self) -> Result<Version, LixError> {
        self.engine
            .read(|store| store.versions.require(&self.active_version_id).cloned())
    }

    /// Runs `f` in one transaction on this session's version. A version
    /// switch made inside `f` sticks once the transaction commits.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, LixError>,
    ) -> Result<T, LixError> {
        let (value, pointer) = self
            .engine
            .transaction_with_pointer(&self.active_version_id, f)?;
        self.active_version_id = pointer;
        Ok(value)
    }

    pub fn record_change(&mut self, change: NewChange) -> Result<Change, LixError> {
        self.transaction(|tx| tx.record_change(change))
    }

    /// Visible state; the filter's version defaults to the active version.
    pub fn resolve_state(&self, filter: &StateFilter) -> Result<Vec<StateCacheRow>, LixError> {
        let version_id = filter
            .version_id
            .as_deref()
            .unwrap_or(&self.active_version_id);
        self.engine
            .read(|store| resolve_state(&store.cache, &store.versions, version_id, filter))
    }

    pub fn populate_state_cache(
        &mut self,
        req: &MaterializationRequest,
    ) -> Result<MaterializationReport, LixError> {
        self.transaction(|tx| tx.populate_state_cache(req))
    }

    pub fn set_key_value(&mut self, key: &str, value: JsonValue) -> Result<Change, LixError> {
        self.transaction(|tx| tx.set_key_value(key, value))
    }

    pub fn get_key_value(&self, key: &str) -> Result<Option<JsonValue>, LixError> {
        self.engine.read(|store| read_key_value(store, key))
    }

    /// Changes to one entity along the active version's ancestry, nearest
    /// commit first.
    pub fn state_history(
        &self,
        entity_id: &str,
        schema_key: &str,
        file_id: &str,
    ) -> Result<Vec<HistoryEntry>, LixError> {
        let key = EntityKey::new(schema_key, entity_id, file_id);
        self.engine.read(|store| {
            let version = store.versions.require(&self.active_version_id)?;
            state_history(&store.graph, &store.changes, &version.commit_id, &key)
        })
    }
}
