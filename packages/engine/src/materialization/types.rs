use std::collections::BTreeSet;

use crate::state::{StateCacheRow, StateFilter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializationRequest {
    pub filter: StateFilter,
    /// Also rebuild the versions `filter.version_id` inherits from.
    pub include_ancestors: bool,
}

impl MaterializationRequest {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn for_filter(filter: StateFilter) -> Self {
        Self {
            include_ancestors: filter.version_id.is_some(),
            filter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializationWriteOp {
    Upsert,
    Tombstone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializationWrite {
    pub op: MaterializationWriteOp,
    pub row: StateCacheRow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializationWarning {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializationPlan {
    pub versions: BTreeSet<String>,
    pub filter: StateFilter,
    pub writes: Vec<MaterializationWrite>,
    pub warnings: Vec<MaterializationWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializationReport {
    pub versions: Vec<String>,
    pub rows_deleted: usize,
    pub rows_written: usize,
    pub warnings: Vec<MaterializationWarning>,
}
