use serde_json::Value as JsonValue;
use std::sync::Arc;

use tracing::info;

use crate::deterministic_mode::{DeterministicSettings, DETERMINISTIC_MODE_KEY};
use crate::engine::Engine;
use crate::init::init_store;
use crate::key_value::key_value_change;
use crate::plugin::{Plugin, PluginRegistry};
use crate::version::GLOBAL_VERSION_ID;
use crate::LixError;

#[derive(Debug, Clone, PartialEq)]
pub struct BootKeyValue {
    pub key: String,
    pub value: JsonValue,
    /// Version to write into; the global version when unset.
    pub version_id: Option<String>,
}

impl BootKeyValue {
    pub fn new(key: impl Into<String>, value: JsonValue) -> Self {
        Self {
            key: key.into(),
            value,
            version_id: None,
        }
    }
}

#[derive(Default)]
pub struct BootArgs {
    pub key_values: Vec<BootKeyValue>,
    pub plugins: Vec<Arc<dyn Plugin>>,
    /// Name of the version new sessions start on.
    pub active_version_name: Option<String>,
}

impl BootArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_value(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.key_values.push(BootKeyValue::new(key, value));
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }
}

/// Creates a new in-memory lix.
pub fn boot(args: BootArgs) -> Result<Engine, LixError> {
    let settings = infer_boot_deterministic_settings(&args.key_values).unwrap_or_default();
    let store = init_store(settings, args.active_version_name.as_deref())?;
    let engine = Engine::from_store(store, PluginRegistry::new(args.plugins));

    if !args.key_values.is_empty() {
        engine.transaction(GLOBAL_VERSION_ID, |tx| {
            for key_value in &args.key_values {
                let version_id = key_value.version_id.as_deref().unwrap_or(GLOBAL_VERSION_ID);
                tx.record_change_in_version(
                    version_id,
                    key_value_change(&key_value.key, key_value.value.clone()),
                )?;
            }
            Ok(())
        })?;
    }
    info!(
        deterministic = settings.enabled,
        key_values = args.key_values.len(),
        "booted lix"
    );
    Ok(engine)
}

/// The last global `lix_deterministic_mode` entry decides the settings the
/// store starts with.
pub(crate) fn infer_boot_deterministic_settings(
    key_values: &[BootKeyValue],
) -> Option<DeterministicSettings> {
    key_values.iter().rev().find_map(|key_value| {
        if key_value.key != DETERMINISTIC_MODE_KEY {
            return None;
        }
        if key_value
            .version_id
            .as_deref()
            .is_some_and(|version| version != GLOBAL_VERSION_ID)
        {
            return None;
        }
        let settings = DeterministicSettings::from_mode_value(&key_value.value);
        settings.enabled.then_some(settings)
    })
}
