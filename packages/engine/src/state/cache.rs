use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::StateFilter;
use crate::change::Change;

const STATE_CACHE_TABLE_PREFIX: &str = "state_cache_";

/// Physical table name for a schema key: lower-case alphanumerics, every
/// other character replaced with `_`.
pub fn state_cache_table_name(schema_key: &str) -> String {
    let sanitized: String = schema_key
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{STATE_CACHE_TABLE_PREFIX}{sanitized}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCacheRow {
    pub entity_id: String,
    pub schema_key: String,
    pub file_id: String,
    pub version_id: String,
    pub plugin_key: String,
    pub snapshot_content: Option<JsonValue>,
    pub schema_version: String,
    pub created_at: String,
    pub updated_at: String,
    pub inherited_from_version_id: Option<String>,
    pub is_tombstone: bool,
    pub change_id: String,
    pub commit_id: String,
}

impl StateCacheRow {
    pub(crate) fn from_change(change: &Change, version_id: &str, commit_id: &str) -> Self {
        Self {
            entity_id: change.entity_id.clone(),
            schema_key: change.schema_key.clone(),
            file_id: change.file_id.clone(),
            version_id: version_id.to_string(),
            plugin_key: change.plugin_key.clone(),
            snapshot_content: change.snapshot_content.clone(),
            schema_version: change.schema_version.clone(),
            created_at: change.created_at.clone(),
            updated_at: change.created_at.clone(),
            inherited_from_version_id: None,
            is_tombstone: change.snapshot_content.is_none(),
            change_id: change.id.clone(),
            commit_id: commit_id.to_string(),
        }
    }

    fn key(&self) -> CacheRowKey {
        CacheRowKey {
            entity_id: self.entity_id.clone(),
            file_id: self.file_id.clone(),
            version_id: self.version_id.clone(),
        }
    }

    pub(crate) fn matches(&self, filter: &StateFilter) -> bool {
        filter.version_id.as_deref().map_or(true, |v| v == self.version_id)
            && filter.entity_id.as_deref().map_or(true, |v| v == self.entity_id)
            && filter.schema_key.as_deref().map_or(true, |v| v == self.schema_key)
            && filter.file_id.as_deref().map_or(true, |v| v == self.file_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheRowKey {
    entity_id: String,
    file_id: String,
    version_id: String,
}

/// One per-schema table, primary key `(entity_id, file_id, version_id)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<StateCacheRow>", into = "Vec<StateCacheRow>")]
pub struct CacheTable {
    rows: BTreeMap<CacheRowKey, StateCacheRow>,
}

impl From<Vec<StateCacheRow>> for CacheTable {
    fn from(rows: Vec<StateCacheRow>) -> Self {
        Self {
            rows: rows.into_iter().map(|row| (row.key(), row)).collect(),
        }
    }
}

impl From<CacheTable> for Vec<StateCacheRow> {
    fn from(table: CacheTable) -> Self {
        table.rows.into_values().collect()
    }
}

impl CacheTable {
    pub fn rows(&self) -> impl Iterator<Item = &StateCacheRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-schema cache tables created lazily on first write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateCache {
    tables: BTreeMap<String, CacheTable>,
    #[serde(skip)]
    write_count: u64,
}

impl StateCache {
    pub fn upsert(&mut self, row: StateCacheRow) {
        self.write_count += 1;
        self.tables
            .entry(row.schema_key.clone())
            .or_default()
            .rows
            .insert(row.key(), row);
    }

    pub fn remove(
        &mut self,
        schema_key: &str,
        entity_id: &str,
        file_id: &str,
        version_id: &str,
    ) -> Option<StateCacheRow> {
        let table = self.tables.get_mut(schema_key)?;
        let removed = table.rows.remove(&CacheRowKey {
            entity_id: entity_id.to_string(),
            file_id: file_id.to_string(),
            version_id: version_id.to_string(),
        });
        if removed.is_some() {
            self.write_count += 1;
        }
        removed
    }

    pub fn get(
        &self,
        schema_key: &str,
        entity_id: &str,
        file_id: &str,
        version_id: &str,
    ) -> Option<&StateCacheRow> {
        self.tables.get(schema_key)?.rows.get(&CacheRowKey {
            entity_id: entity_id.to_string(),
            file_id: file_id.to_string(),
            version_id: version_id.to_string(),
        })
    }

    /// Rows matching every set field of `filter`, including tombstones.
    pub fn rows<'a>(&'a self, filter: &'a StateFilter) -> impl Iterator<Item = &'a StateCacheRow> + 'a {
        self.tables
            .iter()
            .filter(move |(schema_key, _)| {
                filter
                    .schema_key
                    .as_deref()
                    .map_or(true, |wanted| wanted == schema_key.as_str())
            })
            .flat_map(|(_, table)| table.rows.values())
            .filter(move |row| row.matches(filter))
    }

    /// Deletes matching rows and returns how many were removed.
    pub fn clear(&mut self, filter: &StateFilter) -> usize {
        let mut removed = 0;
        for (schema_key, table) in self.tables.iter_mut() {
            if filter
                .schema_key
                .as_deref()
                .is_some_and(|wanted| wanted != schema_key)
            {
                continue;
            }
            let before = table.rows.len();
            table.rows.retain(|_, row| !row.matches(filter));
            removed += before - table.rows.len();
        }
        self.write_count += removed as u64;
        removed
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &CacheTable)> {
        self.tables
            .iter()
            .map(|(schema_key, table)| (schema_key.as_str(), table))
    }

    /// Number of row writes (inserts, overwrites and deletes) since the cache
    /// was created or loaded.
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// All rows ordered by table then primary key, for equality checks
    /// between two caches.
    pub fn snapshot(&self) -> Vec<StateCacheRow> {
        self.tables
            .values()
            .flat_map(|table| table.rows.values().cloned())
            .collect()
    }
}
