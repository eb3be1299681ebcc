//! File plugins: they turn file bytes into entity changes and back.

mod detect;
mod matching;
mod types;

use std::sync::Arc;

pub use types::{
    DetectedChange, FileChangeReport, FileChangeRequest, PluginError, PluginFailure, PluginFile,
};

use crate::state::StateCacheRow;
use matching::{glob_matches_path, select_best_glob_match};

pub trait Plugin: Send + Sync {
    /// Stored as `plugin_key` on every change the plugin detects.
    fn key(&self) -> &str;

    /// Files this plugin handles, as a shell glob over the file path.
    fn detect_changes_glob(&self) -> &str;

    fn detect_changes(
        &self,
        before: Option<&PluginFile>,
        after: Option<&PluginFile>,
    ) -> Result<Vec<DetectedChange>, PluginError>;

    /// Renders a file from the plugin's entities.
    fn apply_changes(
        &self,
        file: &PluginFile,
        changes: &[StateCacheRow],
    ) -> Result<Vec<u8>, PluginError> {
        let _ = (file, changes);
        Err(PluginError::new(format!(
            "plugin `{}` does not support apply_changes",
            self.key()
        )))
    }
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|plugin| plugin.key()))
            .finish()
    }
}

impl PluginRegistry {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Every plugin whose glob matches `path`, in registration order.
    pub fn matching(&self, path: &str) -> Vec<&Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .filter(|plugin| glob_matches_path(plugin.detect_changes_glob(), path))
            .collect()
    }

    /// The plugin with the most specific glob matching `path`.
    pub fn best_match(&self, path: &str) -> Option<&Arc<dyn Plugin>> {
        select_best_glob_match(path, &self.plugins, |plugin| plugin.detect_changes_glob())
    }
}
