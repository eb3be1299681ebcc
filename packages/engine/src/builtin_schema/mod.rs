use serde_json::Value as JsonValue;
use std::sync::OnceLock;

use crate::LixError;

pub(crate) const KEY_VALUE_SCHEMA_KEY: &str = "lix_key_value";
pub(crate) const KEY_VALUE_SCHEMA_VERSION: &str = "1.0";
pub(crate) const KEY_VALUE_FILE_ID: &str = "lix";
pub(crate) const LIX_OWN_PLUGIN_KEY: &str = "lix_own_entity";

const LIX_KEY_VALUE_SCHEMA_JSON: &str = include_str!("lix_key_value.json");

static LIX_KEY_VALUE_SCHEMA: OnceLock<Result<JsonValue, LixError>> = OnceLock::new();

/// Schemas registered in every new store.
pub(crate) fn builtin_schemas() -> Result<Vec<JsonValue>, LixError> {
    let key_value = LIX_KEY_VALUE_SCHEMA
        .get_or_init(|| parse_builtin_schema("lix_key_value.json", LIX_KEY_VALUE_SCHEMA_JSON));
    Ok(vec![key_value.clone()?])
}

fn parse_builtin_schema(name: &str, raw: &str) -> Result<JsonValue, LixError> {
    serde_json::from_str(raw).map_err(|err| {
        crate::errors::schema_definition_invalid_error(&format!(
            "builtin schema {name} is not valid JSON: {err}"
        ))
    })
}
