//! Rebuilds state cache rows from the change log and commit graph.

mod apply;
mod plan;
mod types;

pub use types::{
    MaterializationPlan, MaterializationReport, MaterializationRequest, MaterializationWarning,
    MaterializationWrite, MaterializationWriteOp,
};

pub(crate) use plan::latest_visible_state;

use tracing::{info, warn};

use crate::change::ChangeStore;
use crate::graph::CommitGraph;
use crate::state::StateCache;
use crate::version::VersionStore;
use crate::LixError;

pub fn materialization_plan(
    graph: &CommitGraph,
    changes: &ChangeStore,
    versions: &VersionStore,
    req: &MaterializationRequest,
) -> Result<MaterializationPlan, LixError> {
    plan::materialization_plan(graph, changes, versions, req)
}

/// Recomputes the cache rows selected by `req`. The result is independent of
/// the cache's previous contents.
pub fn populate_state_cache(
    cache: &mut StateCache,
    graph: &CommitGraph,
    changes: &ChangeStore,
    versions: &VersionStore,
    req: &MaterializationRequest,
) -> Result<MaterializationReport, LixError> {
    let plan = plan::materialization_plan(graph, changes, versions, req)?;
    for warning in &plan.warnings {
        warn!(code = %warning.code, "{}", warning.message);
    }
    let report = apply::apply_materialization_plan(cache, &plan);
    info!(
        versions = report.versions.len(),
        rows_deleted = report.rows_deleted,
        rows_written = report.rows_written,
        "state cache populated"
    );
    Ok(report)
}
