use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Value as JsonValue};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::{debug, instrument};

use super::catalog::{EntityView, ViewDefinition, ViewKind};
use super::classify::{classify_statements, StatementKind};
use super::eval::{eval_predicate, eval_scalar, order_values, RowContext};
use super::lower::lower_statement;
use super::params::PlaceholderState;
use super::plan::{
    Assignment, DeletePlan, InsertPlan, OrderKey, Predicate, Projection, ScalarExpr, SelectPlan,
    StatementPlan, UpdatePlan,
};
use super::preprocess::{preprocess, PreprocessOutput};
use super::scan::{scan_view, ScannedRow};
use crate::builtin_schema::{KEY_VALUE_FILE_ID, LIX_OWN_PLUGIN_KEY};
use crate::change::NewChange;
use crate::errors;
use crate::schema::{derive_entity_id, SchemaKey};
use crate::session::Session;
use crate::state::StateCacheRow;
use crate::transaction::Transaction;
use crate::{LixError, QueryResult, Value};

impl<'a> Transaction<'a> {
    /// Runs a script of SELECT/INSERT/UPDATE/DELETE statements against the
    /// views and returns the result of the last one.
    #[instrument(skip(self, params), fields(active_version_id = %self.active_version_id()))]
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, LixError> {
        let classified = classify_statements(sql)?;
        if let Some(other) = classified
            .iter()
            .find(|statement| statement.kind == StatementKind::Other)
        {
            return Err(errors::unsupported_statement_error(&format!(
                "`{}` is not supported; only SELECT, INSERT, UPDATE and DELETE on views are",
                other.sql
            )));
        }

        let mut state = PlaceholderState::new();
        let mut result = QueryResult::default();
        for statement in classified {
            let parsed = Parser::parse_sql(&GenericDialect {}, &statement.sql)
                .map_err(|error| errors::sql_parse_error(&error.to_string()))?;
            for parsed in &parsed {
                let plan = lower_statement(parsed, params, &mut state)?;
                result = self.execute_plan(plan)?;
            }
        }
        Ok(result)
    }

    pub fn execute_plan(&mut self, plan: StatementPlan) -> Result<QueryResult, LixError> {
        match plan {
            StatementPlan::Select(select) => self.execute_select(&select),
            StatementPlan::Insert(insert) => self.execute_insert(insert),
            StatementPlan::Update(update) => self.execute_update(&update),
            StatementPlan::Delete(delete) => self.execute_delete(&delete),
        }
    }

    fn view(&self, name: &str) -> Result<ViewDefinition, LixError> {
        let catalog = self.engine().catalog(&self.store.schemas)?;
        catalog.require(name).cloned()
    }

    fn execute_select(&self, plan: &SelectPlan) -> Result<QueryResult, LixError> {
        let (columns, rows) = match &plan.view {
            Some(name) => {
                let view = self.view(name)?;
                let rows = scan_view(&*self.store, self.active_version_id(), &view)?;
                (view.columns, rows)
            }
            None => (Vec::new(), vec![ScannedRow {
                values: Vec::new(),
                state: None,
            }]),
        };
        let mut rows = filter_rows(&columns, rows, plan.filter.as_ref())?;

        if plan
            .projection
            .iter()
            .any(|projection| matches!(projection, Projection::CountStar { .. }))
        {
            return count_rows(&plan.projection, rows.len());
        }

        if !plan.order_by.is_empty() {
            let keys = resolve_order_keys(&plan.order_by, &plan.projection, &columns);
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                let context = RowContext::new(&columns, &row.values);
                let mut sort_values = Vec::with_capacity(keys.len());
                for key in &keys {
                    sort_values.push(eval_scalar(&key.expr, context)?);
                }
                keyed.push((sort_values, row));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(&keys, a, b));
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }

        let rows: Vec<ScannedRow> = rows
            .into_iter()
            .skip(plan.offset)
            .take(plan.limit.unwrap_or(usize::MAX))
            .collect();

        let mut result_columns = Vec::new();
        for projection in &plan.projection {
            match projection {
                Projection::Wildcard => result_columns.extend(columns.iter().cloned()),
                Projection::Expr { name, .. } | Projection::CountStar { name } => {
                    result_columns.push(name.clone())
                }
            }
        }
        let mut result_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let context = RowContext::new(&columns, &row.values);
            let mut values = Vec::with_capacity(result_columns.len());
            for projection in &plan.projection {
                match projection {
                    Projection::Wildcard => values.extend(row.values.iter().cloned()),
                    Projection::Expr { expr, .. } => values.push(eval_scalar(expr, context)?),
                    Projection::CountStar { .. } => values.push(Value::Null),
                }
            }
            result_rows.push(values);
        }

        Ok(QueryResult {
            columns: result_columns,
            rows: result_rows,
            rows_affected: 0,
        })
    }

    fn execute_insert(&mut self, plan: InsertPlan) -> Result<QueryResult, LixError> {
        let view = self.view(&plan.view)?;
        if !view.writes.insert {
            return Err(errors::read_only_view_write_error(&view.name, "INSERT"));
        }
        for column in &plan.columns {
            if view.column_index(column).is_none() {
                return Err(errors::invalid_parameter_error(&format!(
                    "`{}` has no column `{column}`",
                    view.name
                )));
            }
        }

        let count = plan.rows.len();
        for values in plan.rows {
            let row: BTreeMap<String, Value> = plan
                .columns
                .iter()
                .map(|column| column.to_ascii_lowercase())
                .zip(values)
                .collect();
            match &view.kind {
                ViewKind::State | ViewKind::StateByVersion => {
                    self.insert_state_row(&view.kind, row)?;
                }
                ViewKind::Entity(entity) => self.insert_entity_row(entity, row)?,
                ViewKind::StoredSchema => {
                    let value = parse_json_column(row.get("value"), "value")?
                        .ok_or_else(|| errors::invalid_parameter_error("`value` is required"))?;
                    let declared = SchemaKey::from_definition(&value)?;
                    let key = optional_text(&row, "key")?.unwrap_or(declared.schema_key);
                    let version =
                        optional_text(&row, "version")?.unwrap_or(declared.schema_version);
                    self.store.schemas.register_row(&key, &version, value)?;
                }
                ViewKind::ChangeSetEdge => {
                    let parent_id = required_text(&row, "parent_id")?;
                    let child_id = required_text(&row, "child_id")?;
                    self.create_change_set_edge(&parent_id, &child_id)?;
                }
                _ => return Err(errors::read_only_view_write_error(&view.name, "INSERT")),
            }
        }
        debug!(view = %view.name, rows = count, "inserted rows");
        Ok(QueryResult::affected(count))
    }

    fn insert_state_row(
        &mut self,
        kind: &ViewKind,
        row: BTreeMap<String, Value>,
    ) -> Result<(), LixError> {
        let version_id = match (kind, optional_text(&row, "version_id")?) {
            (ViewKind::State, Some(_)) => {
                return Err(errors::invalid_parameter_error(
                    "`state` writes go to the active version; use `state_by_version` to pick one",
                ))
            }
            (ViewKind::StateByVersion, Some(version_id)) => version_id,
            _ => self.active_version_id().to_string(),
        };
        let schema_key = required_text(&row, "schema_key")?;
        let schema_version = match optional_text(&row, "schema_version")? {
            Some(version) => version,
            None => self
                .store
                .schemas
                .latest(&schema_key)
                .map(|schema| schema.version.clone())
                .ok_or_else(|| errors::schema_not_found_error(&schema_key, "latest"))?,
        };
        let snapshot = parse_json_column(row.get("snapshot_content"), "snapshot_content")?
            .ok_or_else(|| {
                errors::invalid_parameter_error(
                    "`snapshot_content` is required; delete rows with DELETE",
                )
            })?;
        let change = NewChange::upsert(
            required_text(&row, "entity_id")?,
            schema_key,
            schema_version,
            required_text(&row, "file_id")?,
            snapshot,
        )
        .with_plugin_key(
            optional_text(&row, "plugin_key")?.unwrap_or_else(|| LIX_OWN_PLUGIN_KEY.to_string()),
        );
        self.record_change_in_version(&version_id, change)?;
        Ok(())
    }

    fn insert_entity_row(
        &mut self,
        entity: &EntityView,
        row: BTreeMap<String, Value>,
    ) -> Result<(), LixError> {
        let mut snapshot = JsonMap::new();
        for property in &entity.properties {
            let Some(value) = row.get(&property.to_ascii_lowercase()) else {
                continue;
            };
            if let Some(json) = property_json(entity, property, value)? {
                snapshot.insert(property.clone(), json);
            }
        }
        let snapshot = JsonValue::Object(snapshot);

        let entity_id = match optional_text(&row, "lixcol_entity_id")? {
            Some(entity_id) => entity_id,
            None => derive_entity_id(&entity.schema, &snapshot).ok_or_else(|| {
                errors::invalid_parameter_error(&format!(
                    "`{}` rows need `lixcol_entity_id` or a complete primary key",
                    entity.schema_key
                ))
            })?,
        };
        let version_id = match optional_text(&row, "lixcol_version_id")? {
            Some(version_id) if entity.by_version => version_id,
            _ => self.active_version_id().to_string(),
        };
        let file_id = optional_text(&row, "lixcol_file_id")?
            .unwrap_or_else(|| KEY_VALUE_FILE_ID.to_string());
        let plugin_key = optional_text(&row, "lixcol_plugin_key")?
            .unwrap_or_else(|| LIX_OWN_PLUGIN_KEY.to_string());

        let change = NewChange::upsert(
            entity_id,
            &entity.schema_key,
            &entity.schema_version,
            file_id,
            snapshot,
        )
        .with_plugin_key(plugin_key);
        self.record_change_in_version(&version_id, change)?;
        Ok(())
    }

    fn execute_update(&mut self, plan: &UpdatePlan) -> Result<QueryResult, LixError> {
        let view = self.view(&plan.view)?;
        if !view.writes.update {
            return Err(errors::read_only_view_write_error(&view.name, "UPDATE"));
        }
        let rows = filter_rows(
            &view.columns,
            scan_view(&*self.store, self.active_version_id(), &view)?,
            plan.filter.as_ref(),
        )?;

        let count = rows.len();
        for row in rows {
            let Some(state) = row.state.as_ref() else {
                continue;
            };
            let context = RowContext::new(&view.columns, &row.values);
            match &view.kind {
                ViewKind::State | ViewKind::StateByVersion => {
                    self.update_state_row(state, &plan.assignments, context)?
                }
                ViewKind::Entity(entity) => {
                    self.update_entity_row(entity, state, &plan.assignments, context)?
                }
                _ => return Err(errors::read_only_view_write_error(&view.name, "UPDATE")),
            }
        }
        debug!(view = %view.name, rows = count, "updated rows");
        Ok(QueryResult::affected(count))
    }

    fn update_state_row(
        &mut self,
        state: &StateCacheRow,
        assignments: &[Assignment],
        context: RowContext<'_>,
    ) -> Result<(), LixError> {
        let mut snapshot = state.snapshot_content.clone();
        let mut plugin_key = state.plugin_key.clone();
        for assignment in assignments {
            let value = eval_scalar(&assignment.value, context)?;
            match assignment.column.to_ascii_lowercase().as_str() {
                "snapshot_content" => {
                    snapshot = parse_json_column(Some(&value), "snapshot_content")?
                }
                "plugin_key" => {
                    plugin_key = value.as_text().map(str::to_string).ok_or_else(|| {
                        errors::invalid_parameter_error("`plugin_key` must be text")
                    })?
                }
                other => {
                    return Err(errors::invalid_parameter_error(&format!(
                        "`{other}` cannot be updated; only snapshot_content and plugin_key can"
                    )))
                }
            }
        }
        let change = match snapshot {
            Some(snapshot) => NewChange::upsert(
                &state.entity_id,
                &state.schema_key,
                &state.schema_version,
                &state.file_id,
                snapshot,
            ),
            None => NewChange::delete(
                &state.entity_id,
                &state.schema_key,
                &state.schema_version,
                &state.file_id,
            ),
        };
        self.record_change_in_version(&state.version_id, change.with_plugin_key(plugin_key))?;
        Ok(())
    }

    fn update_entity_row(
        &mut self,
        entity: &EntityView,
        state: &StateCacheRow,
        assignments: &[Assignment],
        context: RowContext<'_>,
    ) -> Result<(), LixError> {
        let mut snapshot = match &state.snapshot_content {
            Some(JsonValue::Object(map)) => map.clone(),
            _ => JsonMap::new(),
        };
        for assignment in assignments {
            let Some(property) = entity
                .properties
                .iter()
                .find(|property| property.eq_ignore_ascii_case(&assignment.column))
            else {
                return Err(errors::invalid_parameter_error(&format!(
                    "`{}` cannot be updated on `{}`",
                    assignment.column, entity.schema_key
                )));
            };
            let value = eval_scalar(&assignment.value, context)?;
            match property_json(entity, property, &value)? {
                Some(json) => {
                    snapshot.insert(property.clone(), json);
                }
                None => {
                    snapshot.remove(property);
                }
            }
        }
        let snapshot = JsonValue::Object(snapshot);

        let entity_id =
            derive_entity_id(&entity.schema, &snapshot).unwrap_or_else(|| state.entity_id.clone());
        if entity_id != state.entity_id {
            let delete = NewChange::delete(
                &state.entity_id,
                &state.schema_key,
                &state.schema_version,
                &state.file_id,
            )
            .with_plugin_key(&state.plugin_key);
            self.record_change_in_version(&state.version_id, delete)?;
        }
        let change = NewChange::upsert(
            entity_id,
            &entity.schema_key,
            &entity.schema_version,
            &state.file_id,
            snapshot,
        )
        .with_plugin_key(&state.plugin_key);
        self.record_change_in_version(&state.version_id, change)?;
        Ok(())
    }

    fn execute_delete(&mut self, plan: &DeletePlan) -> Result<QueryResult, LixError> {
        let view = self.view(&plan.view)?;
        if !view.writes.delete {
            return Err(errors::read_only_view_write_error(&view.name, "DELETE"));
        }
        let rows = filter_rows(
            &view.columns,
            scan_view(&*self.store, self.active_version_id(), &view)?,
            plan.filter.as_ref(),
        )?;

        let mut count = 0;
        for state in rows.iter().filter_map(|row| row.state.as_ref()) {
            let change = NewChange::delete(
                &state.entity_id,
                &state.schema_key,
                &state.schema_version,
                &state.file_id,
            )
            .with_plugin_key(&state.plugin_key);
            self.record_change_in_version(&state.version_id, change)?;
            count += 1;
        }
        debug!(view = %view.name, rows = count, "deleted rows");
        Ok(QueryResult::affected(count))
    }
}

impl Session {
    /// Runs `sql` in one transaction on this session's active version. Any
    /// failing statement rolls back the whole script.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, LixError> {
        self.transaction(|tx| tx.execute(sql, params))
    }

    /// The textual expansion of `sql` over physical tables.
    pub fn preprocess(&self, sql: &str, params: &[Value]) -> Result<PreprocessOutput, LixError> {
        let engine = self.engine();
        engine.read(|store| {
            let catalog = engine.catalog(&store.schemas)?;
            preprocess(&catalog, sql, params)
        })
    }
}

fn filter_rows(
    columns: &[String],
    rows: Vec<ScannedRow>,
    filter: Option<&Predicate>,
) -> Result<Vec<ScannedRow>, LixError> {
    let Some(filter) = filter else {
        return Ok(rows);
    };
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        if eval_predicate(filter, RowContext::new(columns, &row.values))? == Some(true) {
            kept.push(row);
        }
    }
    Ok(kept)
}

fn count_rows(projection: &[Projection], count: usize) -> Result<QueryResult, LixError> {
    let mut columns = Vec::with_capacity(projection.len());
    let mut values = Vec::with_capacity(projection.len());
    for item in projection {
        match item {
            Projection::CountStar { name } => {
                columns.push(name.clone());
                values.push(Value::Integer(count as i64));
            }
            Projection::Expr {
                expr: ScalarExpr::Literal(value),
                name,
            } => {
                columns.push(name.clone());
                values.push(value.clone());
            }
            _ => {
                return Err(errors::unsupported_statement_error(
                    "COUNT(*) cannot be mixed with column references without GROUP BY",
                ))
            }
        }
    }
    Ok(QueryResult {
        columns,
        rows: vec![values],
        rows_affected: 0,
    })
}

/// ORDER BY may name a projection alias that is not a view column.
fn resolve_order_keys(
    keys: &[OrderKey],
    projection: &[Projection],
    columns: &[String],
) -> Vec<OrderKey> {
    keys.iter()
        .map(|key| {
            let ScalarExpr::Column(name) = &key.expr else {
                return key.clone();
            };
            if columns.iter().any(|column| column.eq_ignore_ascii_case(name)) {
                return key.clone();
            }
            let aliased = projection.iter().find_map(|item| match item {
                Projection::Expr { expr, name: alias } if alias.eq_ignore_ascii_case(name) => {
                    Some(expr.clone())
                }
                _ => None,
            });
            OrderKey {
                expr: aliased.unwrap_or_else(|| key.expr.clone()),
                descending: key.descending,
            }
        })
        .collect()
}

fn compare_sort_keys(keys: &[OrderKey], left: &[Value], right: &[Value]) -> Ordering {
    for (index, key) in keys.iter().enumerate() {
        let ordering = order_values(&left[index], &right[index]);
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Converts a column value into the JSON a property expects. `None` drops
/// the property.
fn property_json(
    entity: &EntityView,
    property: &str,
    value: &Value,
) -> Result<Option<JsonValue>, LixError> {
    let json = match (entity.property_type(property), value) {
        (_, Value::Null) => return Ok(None),
        (Some("object" | "array"), Value::Text(text)) => {
            serde_json::from_str(text).map_err(|error| {
                errors::invalid_parameter_error(&format!(
                    "`{property}` expects JSON text: {error}"
                ))
            })?
        }
        (Some("boolean"), Value::Integer(flag)) => JsonValue::Bool(*flag != 0),
        (_, other) => other.to_json(),
    };
    Ok(Some(json))
}

fn parse_json_column(value: Option<&Value>, column: &str) -> Result<Option<JsonValue>, LixError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(text)) => serde_json::from_str(text).map(Some).map_err(|error| {
            errors::invalid_parameter_error(&format!("`{column}` must be JSON text: {error}"))
        }),
        Some(_) => Err(errors::invalid_parameter_error(&format!(
            "`{column}` must be JSON text"
        ))),
    }
}

fn optional_text(row: &BTreeMap<String, Value>, column: &str) -> Result<Option<String>, LixError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(text)) => Ok(Some(text.clone())),
        Some(_) => Err(errors::invalid_parameter_error(&format!(
            "`{column}` must be text"
        ))),
    }
}

fn required_text(row: &BTreeMap<String, Value>, column: &str) -> Result<String, LixError> {
    optional_text(row, column)?
        .ok_or_else(|| errors::invalid_parameter_error(&format!("`{column}` is required")))
}

#[cfg(test)]
mod tests {
    use crate::sql::catalog::STATE_COLUMNS;

    #[test]
    fn state_columns_lead_with_identity() {
        assert_eq!(&STATE_COLUMNS[..3], &["entity_id", "schema_key", "file_id"]);
    }
}
