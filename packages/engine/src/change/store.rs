use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::types::{Change, EntityKey};
use crate::errors;
use crate::schema::SchemaRegistry;
use crate::LixError;

/// Append-only change log. Rows are never mutated or removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeStore {
    changes: Vec<Change>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ChangeStore {
    /// Validates every change before appending any of them.
    pub fn append(
        &mut self,
        schemas: &SchemaRegistry,
        changes: Vec<Change>,
    ) -> Result<Vec<String>, LixError> {
        let mut batch_ids = HashSet::new();
        for change in &changes {
            schemas.require(&change.schema_key, &change.schema_version)?;
            if let Some(snapshot) = &change.snapshot_content {
                schemas.validate_snapshot(&change.schema_key, &change.schema_version, snapshot)?;
            }
            if self.index.contains_key(&change.id) || !batch_ids.insert(&change.id) {
                return Err(errors::primary_key_violation_error(
                    "change",
                    &format!("(id = {})", change.id),
                ));
            }
        }

        let mut ids = Vec::with_capacity(changes.len());
        for change in changes {
            ids.push(change.id.clone());
            self.index.insert(change.id.clone(), self.changes.len());
            self.changes.push(change);
        }
        Ok(ids)
    }

    pub fn get(&self, id: &str) -> Option<&Change> {
        self.index.get(id).map(|position| &self.changes[*position])
    }

    pub fn require(&self, id: &str) -> Result<&Change, LixError> {
        self.get(id)
            .ok_or_else(|| errors::change_not_found_error(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changes for one entity in append order.
    pub fn for_entity<'a>(&'a self, key: &'a EntityKey) -> impl Iterator<Item = &'a Change> + 'a {
        self.changes.iter().filter(move |change| {
            change.entity_id == key.entity_id
                && change.schema_key == key.schema_key
                && change.file_id == key.file_id
        })
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .changes
            .iter()
            .enumerate()
            .map(|(position, change)| (change.id.clone(), position))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ChangeStore;
    use crate::change::{Change, EntityKey};
    use crate::errors::ErrorCode;
    use crate::schema::SchemaRegistry;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::default();
        registry
            .register(json!({
                "x-lix-key": "line",
                "x-lix-version": "1.0",
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }))
            .expect("register schema");
        registry
    }

    fn change(id: &str, entity_id: &str, version: &str, text: Option<&str>) -> Change {
        Change {
            id: id.to_string(),
            entity_id: entity_id.to_string(),
            schema_key: "line".to_string(),
            schema_version: version.to_string(),
            file_id: "f".to_string(),
            plugin_key: "test".to_string(),
            snapshot_content: text.map(|text| json!({ "text": text })),
            created_at: "1970-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn append_rejects_unknown_schema_version_atomically() {
        let registry = registry();
        let mut store = ChangeStore::default();

        let err = store
            .append(
                &registry,
                vec![change("c0", "l0", "1.0", Some("a")), change("c1", "l1", "2.0", Some("b"))],
            )
            .expect_err("unknown schema version");

        assert!(err.is(ErrorCode::SchemaNotFound));
        assert!(store.is_empty());
    }

    #[test]
    fn append_rejects_duplicate_ids() {
        let registry = registry();
        let mut store = ChangeStore::default();
        store
            .append(&registry, vec![change("c0", "l0", "1.0", Some("a"))])
            .expect("first append");

        let err = store
            .append(&registry, vec![change("c0", "l0", "1.0", None)])
            .expect_err("duplicate id");
        assert!(err.is(ErrorCode::PrimaryKeyViolation));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn deletes_skip_snapshot_validation_and_keep_order() {
        let registry = registry();
        let mut store = ChangeStore::default();
        store
            .append(
                &registry,
                vec![
                    change("c0", "l0", "1.0", Some("a")),
                    change("c1", "l1", "1.0", Some("b")),
                    change("c2", "l0", "1.0", None),
                ],
            )
            .expect("append");

        let key = EntityKey::new("line", "l0", "f");
        let ids: Vec<_> = store.for_entity(&key).map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c2"]);
        assert!(store.require("c2").expect("change").is_delete());
    }
}
