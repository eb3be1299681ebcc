//! The `lix_key_value` entity, stored in the global version.

use serde_json::{json, Value as JsonValue};

use crate::builtin_schema::{KEY_VALUE_FILE_ID, KEY_VALUE_SCHEMA_KEY, KEY_VALUE_SCHEMA_VERSION};
use crate::change::NewChange;
use crate::state::StateFilter;
use crate::store::Store;
use crate::version::{resolve_state, GLOBAL_VERSION_ID};
use crate::LixError;

pub(crate) fn key_value_change(key: &str, value: JsonValue) -> NewChange {
    NewChange::upsert(
        key,
        KEY_VALUE_SCHEMA_KEY,
        KEY_VALUE_SCHEMA_VERSION,
        KEY_VALUE_FILE_ID,
        json!({ "key": key, "value": value }),
    )
}

pub(crate) fn read_key_value(store: &Store, key: &str) -> Result<Option<JsonValue>, LixError> {
    let rows = resolve_state(
        &store.cache,
        &store.versions,
        GLOBAL_VERSION_ID,
        &StateFilter::version(GLOBAL_VERSION_ID)
            .with_schema(KEY_VALUE_SCHEMA_KEY)
            .with_entity(key)
            .with_file(KEY_VALUE_FILE_ID),
    )?;
    Ok(rows.into_iter().next().and_then(|row| {
        row.snapshot_content
            .and_then(|mut snapshot| snapshot.get_mut("value").map(JsonValue::take))
    }))
}
