use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::builtin_schema::LIX_OWN_PLUGIN_KEY;

/// An atomic entity mutation. `snapshot_content == None` is a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub entity_id: String,
    pub schema_key: String,
    pub schema_version: String,
    pub file_id: String,
    pub plugin_key: String,
    pub snapshot_content: Option<JsonValue>,
    pub created_at: String,
}

impl Change {
    pub fn is_delete(&self) -> bool {
        self.snapshot_content.is_none()
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(&self.schema_key, &self.entity_id, &self.file_id)
    }
}

/// A change before the write path assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChange {
    pub entity_id: String,
    pub schema_key: String,
    pub schema_version: String,
    pub file_id: String,
    pub plugin_key: String,
    pub snapshot_content: Option<JsonValue>,
}

impl NewChange {
    pub fn upsert(
        entity_id: impl Into<String>,
        schema_key: impl Into<String>,
        schema_version: impl Into<String>,
        file_id: impl Into<String>,
        snapshot_content: JsonValue,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            schema_key: schema_key.into(),
            schema_version: schema_version.into(),
            file_id: file_id.into(),
            plugin_key: LIX_OWN_PLUGIN_KEY.to_string(),
            snapshot_content: Some(snapshot_content),
        }
    }

    pub fn delete(
        entity_id: impl Into<String>,
        schema_key: impl Into<String>,
        schema_version: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            schema_key: schema_key.into(),
            schema_version: schema_version.into(),
            file_id: file_id.into(),
            plugin_key: LIX_OWN_PLUGIN_KEY.to_string(),
            snapshot_content: None,
        }
    }

    pub fn with_plugin_key(mut self, plugin_key: impl Into<String>) -> Self {
        self.plugin_key = plugin_key.into();
        self
    }

    pub(crate) fn into_change(self, id: String, created_at: String) -> Change {
        Change {
            id,
            entity_id: self.entity_id,
            schema_key: self.schema_key,
            schema_version: self.schema_version,
            file_id: self.file_id,
            plugin_key: self.plugin_key,
            snapshot_content: self.snapshot_content,
            created_at,
        }
    }
}

/// Identity of an entity across versions: `(schema_key, entity_id, file_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub schema_key: String,
    pub entity_id: String,
    pub file_id: String,
}

impl EntityKey {
    pub fn new(schema_key: &str, entity_id: &str, file_id: &str) -> Self {
        Self {
            schema_key: schema_key.to_string(),
            entity_id: entity_id.to_string(),
            file_id: file_id.to_string(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.schema_key, self.entity_id, self.file_id)
    }
}
