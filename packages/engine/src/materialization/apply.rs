use crate::materialization::types::{MaterializationPlan, MaterializationReport};
use crate::state::StateCache;

/// Replaces the planned versions' rows (within the plan filter) with the
/// planned writes.
pub(crate) fn apply_materialization_plan(
    cache: &mut StateCache,
    plan: &MaterializationPlan,
) -> MaterializationReport {
    let mut rows_deleted = 0usize;
    for version_id in &plan.versions {
        rows_deleted += cache.clear(&plan.filter.for_version(version_id));
    }

    for write in &plan.writes {
        cache.upsert(write.row.clone());
    }

    MaterializationReport {
        versions: plan.versions.iter().cloned().collect(),
        rows_deleted,
        rows_written: plan.writes.len(),
        warnings: plan.warnings.clone(),
    }
}
