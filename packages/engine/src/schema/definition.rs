use jsonschema::JSONSchema;
use serde_json::{json, Value as JsonValue};
use std::sync::OnceLock;

use crate::errors;
use crate::LixError;

static LIX_SCHEMA_DEFINITION: OnceLock<JsonValue> = OnceLock::new();
static LIX_SCHEMA_VALIDATOR: OnceLock<Result<JSONSchema, LixError>> = OnceLock::new();

/// Meta schema every stored schema document must satisfy.
pub fn lix_schema_definition() -> &'static JsonValue {
    LIX_SCHEMA_DEFINITION.get_or_init(|| {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "required": ["x-lix-key", "x-lix-version", "type", "properties"],
            "properties": {
                "x-lix-key": {
                    "type": "string",
                    "pattern": "^[A-Za-z_][A-Za-z0-9_]*$"
                },
                "x-lix-version": {
                    "type": "string",
                    "pattern": "^[0-9]+\\.[0-9]+$"
                },
                "x-lix-primary-key": {
                    "type": "array",
                    "minItems": 1,
                    "items": { "type": "string", "format": "json-pointer" }
                },
                "type": { "const": "object" },
                "properties": { "type": "object" }
            }
        })
    })
}

pub fn validate_lix_schema_definition(schema: &JsonValue) -> Result<(), LixError> {
    let validator = lix_schema_validator()?;
    if let Err(errors) = validator.validate(schema) {
        let details = format_validation_errors(errors);
        return Err(errors::schema_definition_invalid_error(&details));
    }

    assert_primary_key_pointers(schema)
}

/// Validates `data` against an already compiled stored schema.
pub(crate) fn validate_against(
    schema_key: &str,
    validator: &JSONSchema,
    data: &JsonValue,
) -> Result<(), LixError> {
    if let Err(errors) = validator.validate(data) {
        let details = format_validation_errors(errors);
        return Err(errors::snapshot_validation_error(schema_key, &details));
    }
    Ok(())
}

fn lix_schema_validator() -> Result<&'static JSONSchema, LixError> {
    let result = LIX_SCHEMA_VALIDATOR.get_or_init(|| compile_schema(lix_schema_definition()));
    match result {
        Ok(schema) => Ok(schema),
        Err(err) => Err(err.clone()),
    }
}

pub(crate) fn compile_schema(schema: &JsonValue) -> Result<JSONSchema, LixError> {
    let mut options = JSONSchema::options();
    options.with_meta_schemas();
    options.with_format("json-pointer", is_json_pointer);

    options.compile(schema).map_err(|err| {
        errors::schema_definition_invalid_error(&format!("failed to compile schema: {err}"))
    })
}

fn is_json_pointer(value: &str) -> bool {
    parse_json_pointer(value).is_some()
}

pub(crate) fn parse_json_pointer(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    rest.split('/').map(unescape_pointer_segment).collect()
}

fn unescape_pointer_segment(segment: &str) -> Option<String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(ch) = chars.next() {
        if ch != '~' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return None,
        }
    }
    Some(out)
}

fn assert_primary_key_pointers(schema: &JsonValue) -> Result<(), LixError> {
    for pointer in primary_key_pointers(schema) {
        let valid = parse_json_pointer(pointer)
            .is_some_and(|segments| !segments.is_empty() && schema_has_property(schema, &segments));
        if !valid {
            return Err(errors::schema_definition_invalid_error(&format!(
                "x-lix-primary-key references missing property \"{pointer}\"."
            )));
        }
    }
    Ok(())
}

pub(crate) fn primary_key_pointers(schema: &JsonValue) -> Vec<&str> {
    schema
        .get("x-lix-primary-key")
        .and_then(JsonValue::as_array)
        .map(|pointers| pointers.iter().filter_map(JsonValue::as_str).collect())
        .unwrap_or_default()
}

fn schema_has_property(schema: &JsonValue, segments: &[String]) -> bool {
    let mut node = schema;
    for segment in segments {
        match node
            .get("properties")
            .and_then(JsonValue::as_object)
            .and_then(|properties| properties.get(segment))
        {
            Some(next) => node = next,
            None => return false,
        }
    }
    true
}

/// Derives an entity id from the primary key pointers, joining composite keys
/// with `~`. Returns `None` when the schema has no primary key or a component
/// is missing from the snapshot.
pub fn derive_entity_id(schema: &JsonValue, snapshot: &JsonValue) -> Option<String> {
    let pointers = primary_key_pointers(schema);
    if pointers.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(pointers.len());
    for pointer in pointers {
        let value = snapshot.pointer(pointer)?;
        match value {
            JsonValue::Null => return None,
            JsonValue::String(text) => parts.push(text.clone()),
            other => parts.push(other.to_string()),
        }
    }
    Some(parts.join("~"))
}

fn format_validation_errors<'a>(
    errors: impl Iterator<Item = jsonschema::ValidationError<'a>>,
) -> String {
    let mut parts = Vec::new();
    for error in errors {
        let path = error.instance_path.to_string();
        let message = error.to_string();
        if path.is_empty() {
            parts.push(message);
        } else {
            parts.push(format!("{path} {message}"));
        }
    }
    if parts.is_empty() {
        "Unknown validation error".to_string()
    } else {
        parts.join("; ")
    }
}
