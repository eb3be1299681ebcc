use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::errors;
use crate::LixError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaKey {
    pub schema_key: String,
    pub schema_version: String,
}

impl SchemaKey {
    pub fn new(schema_key: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            schema_key: schema_key.into(),
            schema_version: schema_version.into(),
        }
    }

    pub fn entity_id(&self) -> String {
        format!("{}~{}", self.schema_key, self.schema_version)
    }

    /// `(major, minor)` for `"MAJOR.MINOR"` versions.
    pub fn version_number(&self) -> Option<(u64, u64)> {
        parse_schema_version(&self.schema_version)
    }

    /// Reads `x-lix-key` / `x-lix-version` from a schema document.
    pub fn from_definition(value: &JsonValue) -> Result<Self, LixError> {
        let schema_key = value
            .get("x-lix-key")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| errors::schema_definition_invalid_error("x-lix-key must be a string"))?;
        let schema_version = value
            .get("x-lix-version")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                errors::schema_definition_invalid_error("x-lix-version must be a string")
            })?;
        Ok(Self::new(schema_key, schema_version))
    }
}

pub(crate) fn parse_schema_version(version: &str) -> Option<(u64, u64)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
