use crate::LixError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    SchemaNotFound,
    SchemaAlreadyExists,
    SchemaDefinitionInvalid,
    SchemaMismatch,
    SnapshotValidation,
    SelfReference,
    ForeignKeyViolation,
    PrimaryKeyViolation,
    MutableChangeSetEdge,
    ImmutableChangeSet,
    GraphCycle,
    InheritanceCycle,
    VersionNotFound,
    VersionInUse,
    CommitNotFound,
    ChangeSetNotFound,
    ChangeNotFound,
    TableNotFound,
    ReadOnlyViewWriteDenied,
    UnsupportedStatement,
    SqlParse,
    InvalidParameter,
    Serialization,
    ImageInvalid,
    PluginFailure,
    Unknown,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SchemaNotFound => "LIX_ERROR_SCHEMA_NOT_FOUND",
            Self::SchemaAlreadyExists => "LIX_ERROR_SCHEMA_ALREADY_EXISTS",
            Self::SchemaDefinitionInvalid => "LIX_ERROR_SCHEMA_DEFINITION_INVALID",
            Self::SchemaMismatch => "LIX_ERROR_SCHEMA_MISMATCH",
            Self::SnapshotValidation => "LIX_ERROR_SNAPSHOT_VALIDATION",
            Self::SelfReference => "LIX_ERROR_SELF_REFERENCE",
            Self::ForeignKeyViolation => "LIX_ERROR_FOREIGN_KEY_VIOLATION",
            Self::PrimaryKeyViolation => "LIX_ERROR_PRIMARY_KEY_VIOLATION",
            Self::MutableChangeSetEdge => "LIX_ERROR_MUTABLE_CHANGE_SET_EDGE",
            Self::ImmutableChangeSet => "LIX_ERROR_IMMUTABLE_CHANGE_SET",
            Self::GraphCycle => "LIX_ERROR_GRAPH_CYCLE",
            Self::InheritanceCycle => "LIX_ERROR_INHERITANCE_CYCLE",
            Self::VersionNotFound => "LIX_ERROR_VERSION_NOT_FOUND",
            Self::VersionInUse => "LIX_ERROR_VERSION_IN_USE",
            Self::CommitNotFound => "LIX_ERROR_COMMIT_NOT_FOUND",
            Self::ChangeSetNotFound => "LIX_ERROR_CHANGE_SET_NOT_FOUND",
            Self::ChangeNotFound => "LIX_ERROR_CHANGE_NOT_FOUND",
            Self::TableNotFound => "LIX_ERROR_TABLE_NOT_FOUND",
            Self::ReadOnlyViewWriteDenied => "LIX_ERROR_READ_ONLY_VIEW_WRITE_DENIED",
            Self::UnsupportedStatement => "LIX_ERROR_UNSUPPORTED_STATEMENT",
            Self::SqlParse => "LIX_ERROR_SQL_PARSE",
            Self::InvalidParameter => "LIX_ERROR_INVALID_PARAMETER",
            Self::Serialization => "LIX_ERROR_SERIALIZATION",
            Self::ImageInvalid => "LIX_ERROR_IMAGE_INVALID",
            Self::PluginFailure => "LIX_ERROR_PLUGIN_FAILURE",
            Self::Unknown => "LIX_ERROR_UNKNOWN",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::SchemaNotFound,
            Self::SchemaAlreadyExists,
            Self::SchemaDefinitionInvalid,
            Self::SchemaMismatch,
            Self::SnapshotValidation,
            Self::SelfReference,
            Self::ForeignKeyViolation,
            Self::PrimaryKeyViolation,
            Self::MutableChangeSetEdge,
            Self::ImmutableChangeSet,
            Self::GraphCycle,
            Self::InheritanceCycle,
            Self::VersionNotFound,
            Self::VersionInUse,
            Self::CommitNotFound,
            Self::ChangeSetNotFound,
            Self::ChangeNotFound,
            Self::TableNotFound,
            Self::ReadOnlyViewWriteDenied,
            Self::UnsupportedStatement,
            Self::SqlParse,
            Self::InvalidParameter,
            Self::Serialization,
            Self::ImageInvalid,
            Self::PluginFailure,
            Self::Unknown,
        ]
    }
}

fn build_error(code: ErrorCode, title: &str, description: &str) -> LixError {
    LixError::new(code.as_str(), title, description)
}

pub(crate) fn schema_not_found_error(schema_key: &str, schema_version: &str) -> LixError {
    build_error(
        ErrorCode::SchemaNotFound,
        "Schema not found",
        &format!(
            "No stored schema matches `{schema_key}` version `{schema_version}`. Register it via `stored_schema` before writing changes."
        ),
    )
}

pub(crate) fn schema_already_exists_error(schema_key: &str, schema_version: &str) -> LixError {
    build_error(
        ErrorCode::SchemaAlreadyExists,
        "Schema is immutable",
        &format!(
            "Schema `{schema_key}` version `{schema_version}` is already stored. Stored schemas cannot change; bump `x-lix-version` instead."
        ),
    )
}

pub(crate) fn schema_definition_invalid_error(details: &str) -> LixError {
    build_error(
        ErrorCode::SchemaDefinitionInvalid,
        "Invalid schema definition",
        &format!("Invalid Lix schema definition: {details}"),
    )
}

pub(crate) fn schema_mismatch_error(details: &str) -> LixError {
    build_error(ErrorCode::SchemaMismatch, "Schema mismatch", details)
}

pub(crate) fn snapshot_validation_error(schema_key: &str, details: &str) -> LixError {
    build_error(
        ErrorCode::SnapshotValidation,
        "Snapshot does not match schema",
        &format!("Snapshot for `{schema_key}` failed validation: {details}"),
    )
}

pub(crate) fn self_reference_error(table: &str, id: &str) -> LixError {
    build_error(
        ErrorCode::SelfReference,
        "Self-referencing edge",
        &format!("`{table}` edge from `{id}` to itself is not allowed."),
    )
}

pub(crate) fn foreign_key_violation_error(table: &str, column: &str, id: &str) -> LixError {
    build_error(
        ErrorCode::ForeignKeyViolation,
        "Foreign key violation",
        &format!("`{table}.{column}` references `{id}`, which does not exist."),
    )
}

pub(crate) fn primary_key_violation_error(table: &str, key: &str) -> LixError {
    build_error(
        ErrorCode::PrimaryKeyViolation,
        "Primary key violation",
        &format!("`{table}` already contains a row with key {key}."),
    )
}

pub(crate) fn mutable_change_set_edge_error(parent_id: &str, child_id: &str) -> LixError {
    build_error(
        ErrorCode::MutableChangeSetEdge,
        "Change set edge requires immutable change sets",
        &format!(
            "Edge `{parent_id}` -> `{child_id}` connects a change set whose elements are still mutable. Seal both change sets first."
        ),
    )
}

pub(crate) fn immutable_change_set_error(change_set_id: &str) -> LixError {
    build_error(
        ErrorCode::ImmutableChangeSet,
        "Change set is immutable",
        &format!("Change set `{change_set_id}` is sealed; elements can no longer be added."),
    )
}

pub(crate) fn graph_cycle_error(table: &str, parent_id: &str, child_id: &str) -> LixError {
    build_error(
        ErrorCode::GraphCycle,
        "Edge would create a cycle",
        &format!("`{table}` edge `{parent_id}` -> `{child_id}` closes a cycle."),
    )
}

pub(crate) fn inheritance_cycle_error(version_id: &str, parent_id: &str) -> LixError {
    build_error(
        ErrorCode::InheritanceCycle,
        "Version inheritance cycle",
        &format!(
            "Version `{version_id}` cannot inherit from `{parent_id}`: `{parent_id}` already inherits from `{version_id}`."
        ),
    )
}

pub(crate) fn version_not_found_error(version_id: &str) -> LixError {
    build_error(
        ErrorCode::VersionNotFound,
        "Version not found",
        &format!("Version `{version_id}` does not exist."),
    )
}

pub(crate) fn version_in_use_error(version_id: &str, reason: &str) -> LixError {
    build_error(
        ErrorCode::VersionInUse,
        "Version is in use",
        &format!("Version `{version_id}` cannot be deleted: {reason}."),
    )
}

pub(crate) fn commit_not_found_error(commit_id: &str) -> LixError {
    build_error(
        ErrorCode::CommitNotFound,
        "Commit not found",
        &format!("Commit `{commit_id}` does not exist."),
    )
}

pub(crate) fn change_set_not_found_error(change_set_id: &str) -> LixError {
    build_error(
        ErrorCode::ChangeSetNotFound,
        "Change set not found",
        &format!("Change set `{change_set_id}` does not exist."),
    )
}

pub(crate) fn change_not_found_error(change_id: &str) -> LixError {
    build_error(
        ErrorCode::ChangeNotFound,
        "Change not found",
        &format!("Change `{change_id}` does not exist."),
    )
}

pub(crate) fn table_not_found_error(name: &str) -> LixError {
    build_error(
        ErrorCode::TableNotFound,
        "Table does not exist",
        &format!(
            "`{name}` is not a known view. Try: state, state_by_version, change, commit, version, or an entity view named after a stored schema key."
        ),
    )
}

pub(crate) fn read_only_view_write_error(view_name: &str, operation: &str) -> LixError {
    build_error(
        ErrorCode::ReadOnlyViewWriteDenied,
        "View is read-only",
        &format!("`{view_name}` is read-only. `{operation}` is not supported."),
    )
}

pub(crate) fn unsupported_statement_error(details: &str) -> LixError {
    build_error(
        ErrorCode::UnsupportedStatement,
        "Unsupported statement",
        details,
    )
}

pub(crate) fn sql_parse_error(details: &str) -> LixError {
    build_error(ErrorCode::SqlParse, "SQL parse error", details)
}

pub(crate) fn invalid_parameter_error(details: &str) -> LixError {
    build_error(ErrorCode::InvalidParameter, "Invalid parameter", details)
}

pub(crate) fn serialization_error(details: &str) -> LixError {
    build_error(ErrorCode::Serialization, "Serialization failed", details)
}

pub(crate) fn image_invalid_error(details: &str) -> LixError {
    build_error(
        ErrorCode::ImageInvalid,
        "Invalid lix image",
        &format!("The image could not be read: {details}"),
    )
}

pub(crate) fn plugin_failure_error(plugin_key: &str, details: &str) -> LixError {
    build_error(
        ErrorCode::PluginFailure,
        "Plugin failed",
        &format!("Plugin `{plugin_key}` failed: {details}"),
    )
}

pub(crate) fn unknown_error(details: &str) -> LixError {
    build_error(ErrorCode::Unknown, "Unknown error", details)
}

#[cfg(test)]
mod tests {
    use super::{
        foreign_key_violation_error, mutable_change_set_edge_error, read_only_view_write_error,
        self_reference_error, ErrorCode,
    };
    use std::collections::HashSet;

    #[test]
    fn error_code_strings_are_unique() {
        let mut seen = HashSet::new();
        for code in ErrorCode::all() {
            let inserted = seen.insert(code.as_str());
            assert!(inserted, "duplicate error code string: {}", code.as_str());
        }
    }

    #[test]
    fn constructors_include_code() {
        let self_reference = self_reference_error("change_set_edge", "cs0");
        assert_eq!(self_reference.code, "LIX_ERROR_SELF_REFERENCE");
        assert!(self_reference.is(ErrorCode::SelfReference));

        let foreign_key = foreign_key_violation_error("commit_edge", "parent_id", "missing");
        assert_eq!(foreign_key.code, "LIX_ERROR_FOREIGN_KEY_VIOLATION");
        assert!(!foreign_key.is(ErrorCode::SelfReference));

        let mutable_edge = mutable_change_set_edge_error("a", "b");
        assert_eq!(mutable_edge.code, "LIX_ERROR_MUTABLE_CHANGE_SET_EDGE");

        let read_only = read_only_view_write_error("commit", "INSERT");
        assert_eq!(read_only.code, "LIX_ERROR_READ_ONLY_VIEW_WRITE_DENIED");
    }

    #[test]
    fn display_contains_code_and_description() {
        let error = foreign_key_violation_error("commit_edge", "parent_id", "missing");
        let rendered = error.to_string();
        assert!(rendered.starts_with("LIX_ERROR_FOREIGN_KEY_VIOLATION"));
        assert!(rendered.contains("`missing`"));
    }
}
