//! Materialized per-schema state and its incremental maintenance.

mod cache;
mod history;
mod update;

pub use cache::{state_cache_table_name, CacheTable, StateCache, StateCacheRow};
pub use history::{state_history, HistoryEntry};
pub(crate) use update::update_state_cache;

/// Optional equality filters shared by cache reads, repopulation and the
/// resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFilter {
    pub version_id: Option<String>,
    pub entity_id: Option<String>,
    pub schema_key: Option<String>,
    pub file_id: Option<String>,
}

impl StateFilter {
    pub fn version(version_id: impl Into<String>) -> Self {
        Self {
            version_id: Some(version_id.into()),
            ..Self::default()
        }
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_schema(mut self, schema_key: impl Into<String>) -> Self {
        self.schema_key = Some(schema_key.into());
        self
    }

    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Same entity constraints, pinned to another version.
    pub(crate) fn for_version(&self, version_id: &str) -> Self {
        Self {
            version_id: Some(version_id.to_string()),
            ..self.clone()
        }
    }
}
