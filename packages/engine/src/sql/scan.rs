//! Reads a view's rows out of the store.

use serde_json::json;

use super::catalog::{EntityView, ViewDefinition, ViewKind, LIXCOL_COLUMNS};
use crate::state::{StateCacheRow, StateFilter};
use crate::store::Store;
use crate::version::{resolve_all_versions, resolve_state};
use crate::{LixError, Value};

/// A view row. Rows of state and entity views keep the resolved state row so
/// writes can address the entity behind them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScannedRow {
    pub values: Vec<Value>,
    pub state: Option<StateCacheRow>,
}

impl ScannedRow {
    fn plain(values: Vec<Value>) -> Self {
        Self {
            values,
            state: None,
        }
    }
}

pub(crate) fn scan_view(
    store: &Store,
    active_version_id: &str,
    view: &ViewDefinition,
) -> Result<Vec<ScannedRow>, LixError> {
    let rows = match &view.kind {
        ViewKind::State => state_rows(resolve_state(
            &store.cache,
            &store.versions,
            active_version_id,
            &StateFilter::default(),
        )?),
        ViewKind::StateByVersion => state_rows(resolve_all_versions(
            &store.cache,
            &store.versions,
            &StateFilter::default(),
        )?),
        ViewKind::StateCache => store
            .cache
            .rows(&StateFilter::default())
            .map(|row| {
                let mut values = state_values(row);
                values.push(Value::boolean(row.is_tombstone));
                ScannedRow::plain(values)
            })
            .collect(),
        ViewKind::Change => store
            .changes
            .iter()
            .map(|change| {
                ScannedRow::plain(vec![
                    Value::text(&change.id),
                    Value::text(&change.entity_id),
                    Value::text(&change.schema_key),
                    Value::text(&change.schema_version),
                    Value::text(&change.file_id),
                    Value::text(&change.plugin_key),
                    json_text(change.snapshot_content.as_ref()),
                    Value::text(&change.created_at),
                ])
            })
            .collect(),
        ViewKind::ChangeSet => store
            .graph
            .change_sets()
            .map(|change_set| {
                ScannedRow::plain(vec![
                    Value::text(&change_set.id),
                    Value::boolean(change_set.immutable_elements),
                ])
            })
            .collect(),
        ViewKind::ChangeSetElement => store
            .graph
            .change_sets()
            .flat_map(|change_set| change_set.elements())
            .map(|element| {
                ScannedRow::plain(vec![
                    Value::text(&element.change_set_id),
                    Value::text(&element.change_id),
                    Value::text(&element.entity_id),
                    Value::text(&element.schema_key),
                    Value::text(&element.file_id),
                ])
            })
            .collect(),
        ViewKind::ChangeSetEdge => store
            .graph
            .change_set_edges()
            .map(|edge| {
                ScannedRow::plain(vec![Value::text(&edge.parent_id), Value::text(&edge.child_id)])
            })
            .collect(),
        ViewKind::Commit => store
            .graph
            .commits()
            .map(|commit| {
                ScannedRow::plain(vec![
                    Value::text(&commit.id),
                    Value::text(&commit.change_set_id),
                    Value::text(json!(commit.parent_commit_ids).to_string()),
                    Value::text(&commit.created_at),
                ])
            })
            .collect(),
        ViewKind::CommitEdge => store
            .graph
            .commit_edges()
            .map(|edge| {
                ScannedRow::plain(vec![Value::text(&edge.parent_id), Value::text(&edge.child_id)])
            })
            .collect(),
        ViewKind::Version => store
            .versions
            .iter()
            .map(|version| {
                ScannedRow::plain(vec![
                    Value::text(&version.id),
                    Value::text(&version.name),
                    Value::text(&version.commit_id),
                    Value::optional_text(version.inherits_from_version_id.as_deref()),
                ])
            })
            .collect(),
        ViewKind::ActiveVersion => vec![ScannedRow::plain(vec![Value::text(active_version_id)])],
        ViewKind::StoredSchema => store
            .schemas
            .iter()
            .map(|schema| {
                ScannedRow::plain(vec![
                    Value::text(&schema.key),
                    Value::text(&schema.version),
                    Value::Text(schema.value.to_string()),
                ])
            })
            .collect(),
        ViewKind::Entity(entity) => {
            let filter = StateFilter::default().with_schema(&entity.schema_key);
            let rows = if entity.by_version {
                resolve_all_versions(&store.cache, &store.versions, &filter)?
            } else {
                resolve_state(&store.cache, &store.versions, active_version_id, &filter)?
            };
            rows.into_iter()
                .map(|row| ScannedRow {
                    values: entity_values(entity, &row),
                    state: Some(row),
                })
                .collect()
        }
    };
    Ok(rows)
}

fn state_rows(rows: Vec<StateCacheRow>) -> Vec<ScannedRow> {
    rows.into_iter()
        .map(|row| ScannedRow {
            values: state_values(&row),
            state: Some(row),
        })
        .collect()
}

/// Values in the order of the state view's columns.
fn state_values(row: &StateCacheRow) -> Vec<Value> {
    vec![
        Value::text(&row.entity_id),
        Value::text(&row.schema_key),
        Value::text(&row.file_id),
        Value::text(&row.version_id),
        Value::text(&row.plugin_key),
        json_text(row.snapshot_content.as_ref()),
        Value::text(&row.schema_version),
        Value::text(&row.created_at),
        Value::text(&row.updated_at),
        Value::optional_text(row.inherited_from_version_id.as_deref()),
        Value::text(&row.change_id),
        Value::text(&row.commit_id),
    ]
}

fn entity_values(entity: &EntityView, row: &StateCacheRow) -> Vec<Value> {
    let mut values: Vec<Value> = entity
        .properties
        .iter()
        .map(|property| {
            row.snapshot_content
                .as_ref()
                .and_then(|snapshot| snapshot.get(property))
                .map(Value::from_json)
                .unwrap_or(Value::Null)
        })
        .collect();
    for (_, column) in LIXCOL_COLUMNS {
        let value = match *column {
            "entity_id" => Value::text(&row.entity_id),
            "schema_key" => Value::text(&row.schema_key),
            "file_id" => Value::text(&row.file_id),
            "version_id" if entity.by_version => Value::text(&row.version_id),
            "version_id" => continue,
            "plugin_key" => Value::text(&row.plugin_key),
            "schema_version" => Value::text(&row.schema_version),
            "created_at" => Value::text(&row.created_at),
            "updated_at" => Value::text(&row.updated_at),
            "inherited_from_version_id" => {
                Value::optional_text(row.inherited_from_version_id.as_deref())
            }
            "change_id" => Value::text(&row.change_id),
            "commit_id" => Value::text(&row.commit_id),
            _ => Value::Null,
        };
        values.push(value);
    }
    values
}

fn json_text(value: Option<&serde_json::Value>) -> Value {
    value.map_or(Value::Null, |json| Value::Text(json.to_string()))
}
