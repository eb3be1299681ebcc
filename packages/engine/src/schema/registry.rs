use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

use super::definition::{compile_schema, validate_against, validate_lix_schema_definition};
use super::key::{parse_schema_version, SchemaKey};
use crate::errors;
use crate::LixError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSchema {
    pub key: String,
    pub version: String,
    pub value: JsonValue,
}

impl StoredSchema {
    pub fn schema_key(&self) -> SchemaKey {
        SchemaKey::new(&self.key, &self.version)
    }

    /// Top-level property names in declaration order.
    pub fn property_names(&self) -> Vec<String> {
        self.value
            .get("properties")
            .and_then(JsonValue::as_object)
            .map(|properties| properties.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct CompiledSchema(Arc<JSONSchema>);

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CompiledSchema")
    }
}

/// Stored schemas keyed by `(key, version)`. Entries are immutable once
/// inserted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, BTreeMap<String, StoredSchema>>,
    #[serde(skip)]
    validators: BTreeMap<SchemaKey, CompiledSchema>,
}

impl SchemaRegistry {
    /// Registers a schema document, taking key and version from its
    /// `x-lix-key` / `x-lix-version` fields.
    pub fn register(&mut self, value: JsonValue) -> Result<SchemaKey, LixError> {
        validate_lix_schema_definition(&value)?;
        let key = SchemaKey::from_definition(&value)?;
        if self.get(&key.schema_key, &key.schema_version).is_some() {
            return Err(errors::schema_already_exists_error(
                &key.schema_key,
                &key.schema_version,
            ));
        }
        let validator = compile_schema(&value)?;
        self.validators
            .insert(key.clone(), CompiledSchema(Arc::new(validator)));
        self.schemas.entry(key.schema_key.clone()).or_default().insert(
            key.schema_version.clone(),
            StoredSchema {
                key: key.schema_key.clone(),
                version: key.schema_version.clone(),
                value,
            },
        );
        Ok(key)
    }

    /// Registers a stored-schema row whose key and version columns must agree
    /// with the document.
    pub fn register_row(
        &mut self,
        key: &str,
        version: &str,
        value: JsonValue,
    ) -> Result<SchemaKey, LixError> {
        let declared = SchemaKey::from_definition(&value)?;
        if declared.schema_key != key || declared.schema_version != version {
            return Err(errors::schema_mismatch_error(&format!(
                "stored_schema row ({key}, {version}) does not match its document ({}, {})",
                declared.schema_key, declared.schema_version
            )));
        }
        self.register(value)
    }

    pub fn get(&self, key: &str, version: &str) -> Option<&StoredSchema> {
        self.schemas.get(key).and_then(|versions| versions.get(version))
    }

    pub fn require(&self, key: &str, version: &str) -> Result<&StoredSchema, LixError> {
        self.get(key, version)
            .ok_or_else(|| errors::schema_not_found_error(key, version))
    }

    /// Highest registered version of `key` by `(major, minor)`.
    pub fn latest(&self, key: &str) -> Option<&StoredSchema> {
        self.schemas.get(key)?.values().max_by_key(|schema| {
            parse_schema_version(&schema.version).unwrap_or((0, 0))
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.schemas.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredSchema> {
        self.schemas.values().flat_map(|versions| versions.values())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn validate_snapshot(
        &self,
        key: &str,
        version: &str,
        snapshot: &JsonValue,
    ) -> Result<(), LixError> {
        let schema_key = SchemaKey::new(key, version);
        match self.validators.get(&schema_key) {
            Some(CompiledSchema(validator)) => validate_against(key, validator, snapshot),
            None => {
                let stored = self.require(key, version)?;
                let validator = compile_schema(&stored.value)?;
                validate_against(key, &validator, snapshot)
            }
        }
    }

    /// Recompiles validators after deserialization.
    pub fn rebuild_validators(&mut self) -> Result<(), LixError> {
        let mut validators = BTreeMap::new();
        for schema in self.iter() {
            let validator = compile_schema(&schema.value)?;
            validators.insert(schema.schema_key(), CompiledSchema(Arc::new(validator)));
        }
        self.validators = validators;
        Ok(())
    }

    /// Stable hash over every registered `(key, version)` pair and its
    /// document.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for schema in self.iter() {
            hasher.update(schema.key.as_bytes());
            hasher.update(&[0]);
            hasher.update(schema.version.as_bytes());
            hasher.update(&[0]);
            hasher.update(schema.value.to_string().as_bytes());
            hasher.update(&[0xff]);
        }
        hasher.digest()
    }
}
