use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as JsonValue;
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::errors;
use crate::schema::SchemaRegistry;
use crate::state::state_cache_table_name;
use crate::LixError;

pub(crate) const STATE_COLUMNS: &[&str] = &[
    "entity_id",
    "schema_key",
    "file_id",
    "version_id",
    "plugin_key",
    "snapshot_content",
    "schema_version",
    "created_at",
    "updated_at",
    "inherited_from_version_id",
    "change_id",
    "commit_id",
];

const CHANGE_COLUMNS: &[&str] = &[
    "id",
    "entity_id",
    "schema_key",
    "schema_version",
    "file_id",
    "plugin_key",
    "snapshot_content",
    "created_at",
];

/// Metadata columns of entity views, paired with the state column they map to.
pub(crate) const LIXCOL_COLUMNS: &[(&str, &str)] = &[
    ("lixcol_entity_id", "entity_id"),
    ("lixcol_schema_key", "schema_key"),
    ("lixcol_file_id", "file_id"),
    ("lixcol_version_id", "version_id"),
    ("lixcol_plugin_key", "plugin_key"),
    ("lixcol_schema_version", "schema_version"),
    ("lixcol_created_at", "created_at"),
    ("lixcol_updated_at", "updated_at"),
    ("lixcol_inherited_from_version_id", "inherited_from_version_id"),
    ("lixcol_change_id", "change_id"),
    ("lixcol_commit_id", "commit_id"),
];

/// What a view reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewKind {
    /// Visible state of the active version.
    State,
    /// Visible state of every version.
    StateByVersion,
    /// Raw cache rows including tombstones.
    StateCache,
    Change,
    ChangeSet,
    ChangeSetElement,
    ChangeSetEdge,
    Commit,
    CommitEdge,
    Version,
    ActiveVersion,
    StoredSchema,
    Entity(EntityView),
}

/// A view over one schema's entities.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView {
    pub schema_key: String,
    pub schema_version: String,
    pub properties: Vec<String>,
    pub schema: JsonValue,
    pub by_version: bool,
}

impl EntityView {
    /// Declared JSON type of `property`, if any.
    pub(crate) fn property_type(&self, property: &str) -> Option<&str> {
        self.schema
            .get("properties")
            .and_then(|properties| properties.get(property))
            .and_then(|definition| definition.get("type"))
            .and_then(JsonValue::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewWrites {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl ViewWrites {
    const ALL: Self = Self {
        insert: true,
        update: true,
        delete: true,
    };
    const INSERT_ONLY: Self = Self {
        insert: true,
        update: false,
        delete: false,
    };
    const NONE: Self = Self {
        insert: false,
        update: false,
        delete: false,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewDefinition {
    pub name: String,
    pub kind: ViewKind,
    pub columns: Vec<String>,
    pub writes: ViewWrites,
    /// Backing SELECT over other views and physical tables.
    pub query: Query,
}

impl ViewDefinition {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(column))
    }
}

/// Every view the engine answers, keyed by lower-case name.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewCatalog {
    fingerprint: u64,
    views: BTreeMap<String, ViewDefinition>,
}

impl ViewCatalog {
    pub fn build(schemas: &SchemaRegistry) -> Result<Self, LixError> {
        let mut views = BTreeMap::new();
        for view in builtin_views(schemas)? {
            views.insert(view.name.clone(), view);
        }

        let keys: BTreeSet<&str> = schemas.keys().collect();
        for key in keys {
            let Some(schema) = schemas.latest(key) else {
                continue;
            };
            for by_version in [false, true] {
                let view = entity_view(key, &schema.version, &schema.value, by_version)?;
                if views.contains_key(&view.name) {
                    debug!(view = %view.name, "schema key shadowed by a builtin view");
                    continue;
                }
                views.insert(view.name.clone(), view);
            }
        }

        Ok(Self {
            fingerprint: schemas.fingerprint(),
            views,
        })
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn get(&self, name: &str) -> Option<&ViewDefinition> {
        self.views.get(&name.to_ascii_lowercase())
    }

    pub fn require(&self, name: &str) -> Result<&ViewDefinition, LixError> {
        self.get(name)
            .ok_or_else(|| errors::table_not_found_error(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }
}

fn builtin_views(schemas: &SchemaRegistry) -> Result<Vec<ViewDefinition>, LixError> {
    let keys: BTreeSet<&str> = schemas.keys().collect();
    let mut cache_selects: Vec<String> = keys
        .iter()
        .map(|key| {
            format!(
                "SELECT {columns}, is_tombstone FROM {table}",
                columns = STATE_COLUMNS.join(", "),
                table = state_cache_table_name(key),
            )
        })
        .collect();
    if cache_selects.is_empty() {
        cache_selects.push(format!(
            "SELECT {columns}, is_tombstone FROM {table} WHERE 1 = 0",
            columns = STATE_COLUMNS.join(", "),
            table = state_cache_table_name(""),
        ));
    }
    let mut state_cache_columns = columns(STATE_COLUMNS);
    state_cache_columns.push("is_tombstone".to_string());

    let ranked_projection = STATE_COLUMNS
        .iter()
        .map(|column| match *column {
            "version_id" => "lix_version_chain.version_id AS version_id".to_string(),
            "inherited_from_version_id" => "CASE WHEN lix_version_chain.chain_depth = 0 \
                 THEN NULL ELSE sc.version_id END AS inherited_from_version_id"
                .to_string(),
            other => format!("sc.{other}"),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let state_by_version_sql = format!(
        "WITH RECURSIVE lix_version_chain (version_id, ancestor_id, chain_depth) AS (\
           SELECT id, id, 0 FROM version \
           UNION ALL \
           SELECT lix_version_chain.version_id, v.inherits_from_version_id, lix_version_chain.chain_depth + 1 \
           FROM lix_version_chain JOIN version AS v ON v.id = lix_version_chain.ancestor_id \
           WHERE v.inherits_from_version_id IS NOT NULL\
         ), lix_ranked_state AS (\
           SELECT {ranked_projection}, sc.is_tombstone, \
           ROW_NUMBER() OVER (PARTITION BY lix_version_chain.version_id, sc.schema_key, sc.entity_id, sc.file_id \
           ORDER BY lix_version_chain.chain_depth) AS visibility_rank \
           FROM state_cache AS sc JOIN lix_version_chain ON sc.version_id = lix_version_chain.ancestor_id\
         ) \
         SELECT {columns} FROM lix_ranked_state WHERE visibility_rank = 1 AND is_tombstone = 0",
        columns = STATE_COLUMNS.join(", "),
    );

    let state_columns = STATE_COLUMNS.join(", ");
    Ok(vec![
        view(
            "state_cache",
            ViewKind::StateCache,
            state_cache_columns,
            ViewWrites::NONE,
            &cache_selects.join(" UNION ALL "),
        )?,
        view(
            "state_by_version",
            ViewKind::StateByVersion,
            columns(STATE_COLUMNS),
            ViewWrites::ALL,
            &state_by_version_sql,
        )?,
        view(
            "state",
            ViewKind::State,
            columns(STATE_COLUMNS),
            ViewWrites::ALL,
            &format!(
                "SELECT {state_columns} FROM state_by_version \
                 WHERE version_id = (SELECT version_id FROM active_version)"
            ),
        )?,
        view(
            "change",
            ViewKind::Change,
            columns(CHANGE_COLUMNS),
            ViewWrites::NONE,
            &format!("SELECT {} FROM lix_internal_change", CHANGE_COLUMNS.join(", ")),
        )?,
        view(
            "change_set",
            ViewKind::ChangeSet,
            columns(&["id", "immutable_elements"]),
            ViewWrites::NONE,
            "SELECT id, immutable_elements FROM lix_internal_change_set",
        )?,
        view(
            "change_set_element",
            ViewKind::ChangeSetElement,
            columns(&["change_set_id", "change_id", "entity_id", "schema_key", "file_id"]),
            ViewWrites::NONE,
            "SELECT change_set_id, change_id, entity_id, schema_key, file_id \
             FROM lix_internal_change_set_element",
        )?,
        view(
            "change_set_edge",
            ViewKind::ChangeSetEdge,
            columns(&["parent_id", "child_id"]),
            ViewWrites::INSERT_ONLY,
            "SELECT parent_id, child_id FROM lix_internal_change_set_edge",
        )?,
        view(
            "commit",
            ViewKind::Commit,
            columns(&["id", "change_set_id", "parent_commit_ids", "created_at"]),
            ViewWrites::NONE,
            "SELECT id, change_set_id, parent_commit_ids, created_at FROM lix_internal_commit",
        )?,
        view(
            "commit_edge",
            ViewKind::CommitEdge,
            columns(&["parent_id", "child_id"]),
            ViewWrites::NONE,
            "SELECT parent_id, child_id FROM lix_internal_commit_edge",
        )?,
        view(
            "version",
            ViewKind::Version,
            columns(&["id", "name", "commit_id", "inherits_from_version_id"]),
            ViewWrites::NONE,
            "SELECT id, name, commit_id, inherits_from_version_id FROM lix_internal_version",
        )?,
        view(
            "active_version",
            ViewKind::ActiveVersion,
            columns(&["version_id"]),
            ViewWrites::NONE,
            "SELECT version_id FROM lix_internal_active_version",
        )?,
        view(
            "stored_schema",
            ViewKind::StoredSchema,
            columns(&["key", "version", "value"]),
            ViewWrites::INSERT_ONLY,
            "SELECT \"key\", \"version\", \"value\" FROM lix_internal_stored_schema",
        )?,
    ])
}

fn entity_view(
    schema_key: &str,
    schema_version: &str,
    schema: &JsonValue,
    by_version: bool,
) -> Result<ViewDefinition, LixError> {
    let properties: Vec<String> = schema
        .get("properties")
        .and_then(JsonValue::as_object)
        .map(|properties| properties.keys().cloned().collect())
        .unwrap_or_default();

    let mut view_columns = properties.clone();
    let mut projection: Vec<String> = properties
        .iter()
        .map(|property| {
            format!(
                "json_extract(snapshot_content, '$.{path}') AS {alias}",
                path = escape_sql_string(property),
                alias = quote_ident(property),
            )
        })
        .collect();
    for (alias, column) in LIXCOL_COLUMNS {
        if *column == "version_id" && !by_version {
            continue;
        }
        view_columns.push((*alias).to_string());
        projection.push(format!("{column} AS {alias}"));
    }

    let (name, source) = if by_version {
        (format!("{schema_key}_by_version"), "state_by_version")
    } else {
        (schema_key.to_string(), "state")
    };
    let sql = format!(
        "SELECT {projection} FROM {source} WHERE schema_key = '{key}'",
        projection = projection.join(", "),
        key = escape_sql_string(schema_key),
    );
    view(
        &name.to_ascii_lowercase(),
        ViewKind::Entity(EntityView {
            schema_key: schema_key.to_string(),
            schema_version: schema_version.to_string(),
            properties,
            schema: schema.clone(),
            by_version,
        }),
        view_columns,
        ViewWrites::ALL,
        &sql,
    )
}

fn view(
    name: &str,
    kind: ViewKind,
    columns: Vec<String>,
    writes: ViewWrites,
    sql: &str,
) -> Result<ViewDefinition, LixError> {
    Ok(ViewDefinition {
        name: name.to_string(),
        kind,
        columns,
        writes,
        query: parse_single_query(sql)?,
    })
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn parse_single_query(sql: &str) -> Result<Query, LixError> {
    let mut statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|error| errors::sql_parse_error(&error.to_string()))?;
    if statements.len() != 1 {
        return Err(errors::sql_parse_error("expected a single SELECT statement"));
    }
    match statements.remove(0) {
        Statement::Query(query) => Ok(*query),
        _ => Err(errors::sql_parse_error("expected SELECT statement")),
    }
}

pub(crate) fn quote_ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub(crate) fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}
