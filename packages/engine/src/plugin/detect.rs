use tracing::{instrument, warn};

use super::{DetectedChange, FileChangeReport, FileChangeRequest, PluginFailure, PluginFile};
use crate::change::NewChange;
use crate::errors;
use crate::session::Session;
use crate::state::StateFilter;
use crate::transaction::Transaction;
use crate::LixError;

impl<'a> Transaction<'a> {
    /// Runs every plugin matching the file path and records what they detect
    /// in the active version. A failing plugin is reported and skipped; the
    /// others still run.
    #[instrument(skip_all, fields(file_id = %request.file_id, path = %request.path))]
    pub fn detect_file_changes(
        &mut self,
        request: &FileChangeRequest,
    ) -> Result<FileChangeReport, LixError> {
        let plugins = self.engine().plugins().matching(&request.path);
        let to_file = |data: &Vec<u8>| PluginFile {
            id: request.file_id.clone(),
            path: request.path.clone(),
            data: data.clone(),
        };
        let before = request.before.as_ref().map(to_file);
        let after = request.after.as_ref().map(to_file);

        let mut report = FileChangeReport::default();
        for plugin in plugins {
            let detected = plugin
                .detect_changes(before.as_ref(), after.as_ref())
                .map_err(|error| error.message)
                .and_then(|detected| {
                    self.validate_detected(&detected)
                        .map(|()| detected)
                        .map_err(|error| error.to_string())
                });
            let detected = match detected {
                Ok(detected) => detected,
                Err(message) => {
                    warn!(plugin_key = plugin.key(), %message, "plugin failed to detect changes");
                    report.failures.push(PluginFailure {
                        plugin_key: plugin.key().to_string(),
                        file_id: request.file_id.clone(),
                        message,
                    });
                    continue;
                }
            };
            for change in detected {
                report.changes.push(self.record_change(NewChange {
                    entity_id: change.entity_id,
                    schema_key: change.schema_key,
                    schema_version: change.schema_version,
                    file_id: request.file_id.clone(),
                    plugin_key: plugin.key().to_string(),
                    snapshot_content: change.snapshot_content,
                })?);
            }
        }
        Ok(report)
    }

    fn validate_detected(&self, detected: &[DetectedChange]) -> Result<(), LixError> {
        let schemas = &self.store().schemas;
        for change in detected {
            schemas.require(&change.schema_key, &change.schema_version)?;
            if let Some(snapshot) = &change.snapshot_content {
                schemas.validate_snapshot(&change.schema_key, &change.schema_version, snapshot)?;
            }
        }
        Ok(())
    }
}

impl Session {
    pub fn detect_file_changes(
        &mut self,
        request: &FileChangeRequest,
    ) -> Result<FileChangeReport, LixError> {
        self.transaction(|tx| tx.detect_file_changes(request))
    }

    /// Asks the best matching plugin to render the file from its entities in
    /// the active version. `None` when no plugin handles the path.
    pub fn render_file(&self, file_id: &str, path: &str) -> Result<Option<Vec<u8>>, LixError> {
        let Some(plugin) = self.engine().plugins().best_match(path) else {
            return Ok(None);
        };
        let rows: Vec<_> = self
            .resolve_state(&StateFilter::default().with_file(file_id))?
            .into_iter()
            .filter(|row| row.plugin_key == plugin.key())
            .collect();
        let file = PluginFile {
            id: file_id.to_string(),
            path: path.to_string(),
            data: Vec::new(),
        };
        plugin
            .apply_changes(&file, &rows)
            .map(Some)
            .map_err(|error| errors::plugin_failure_error(plugin.key(), &error.message))
    }
}
