use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::change::Change;

/// A file handed to a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginFile {
    pub id: String,
    pub path: String,
    pub data: Vec<u8>,
}

/// An entity change reported by a plugin, before the write path assigns id
/// and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedChange {
    pub entity_id: String,
    pub schema_key: String,
    pub schema_version: String,
    pub snapshot_content: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PluginError {
    pub message: String,
}

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeRequest {
    pub file_id: String,
    pub path: String,
    pub before: Option<Vec<u8>>,
    pub after: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFailure {
    pub plugin_key: String,
    pub file_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileChangeReport {
    pub changes: Vec<Change>,
    pub failures: Vec<PluginFailure>,
}
