use tracing::debug;

use crate::change::ChangeStore;
use crate::commit::types::{DerivedCommitArgs, PendingCommit};
use crate::deterministic_mode::RuntimeFunctionProvider;
use crate::functions::LixFunctionProvider;
use crate::graph::{Commit, CommitGraph, CreateChangeSetOptions, CreateCommitOptions};
use crate::version::VersionStore;
use crate::LixError;

/// Creates the mutable change set that collects a version's changes until the
/// transaction ends. The commit id is allocated now so cache rows written in
/// the meantime can already point at it.
pub(crate) fn open_pending_commit(
    graph: &mut CommitGraph,
    changes: &ChangeStore,
    functions: &mut RuntimeFunctionProvider,
    version_id: &str,
) -> Result<PendingCommit, LixError> {
    let change_set_id = functions.uuid_v7();
    let commit_id = functions.uuid_v7();
    graph.create_change_set(
        changes,
        CreateChangeSetOptions {
            id: change_set_id.clone(),
            ..Default::default()
        },
    )?;
    Ok(PendingCommit {
        version_id: version_id.to_string(),
        change_set_id,
        commit_id,
    })
}

/// Seals the pending change set into a commit on top of the version's tip and
/// moves the version to it.
pub(crate) fn generate_commit(
    graph: &mut CommitGraph,
    versions: &mut VersionStore,
    functions: &mut RuntimeFunctionProvider,
    pending: PendingCommit,
) -> Result<Commit, LixError> {
    let parent_commit_id = versions.require(&pending.version_id)?.commit_id.clone();
    let commit = graph.create_commit(CreateCommitOptions {
        id: pending.commit_id,
        change_set_id: pending.change_set_id,
        parent_commit_ids: vec![parent_commit_id],
        created_at: functions.timestamp(),
    })?;
    versions.set_commit(&pending.version_id, &commit.id)?;
    debug!(
        version_id = %pending.version_id,
        commit_id = %commit.id,
        "generated commit"
    );
    Ok(commit)
}

/// Writes an already-sealed change set holding `change_ids` and a commit with
/// the given parents. The caller moves version pointers.
pub(crate) fn generate_derived_commit(
    graph: &mut CommitGraph,
    changes: &ChangeStore,
    functions: &mut RuntimeFunctionProvider,
    args: DerivedCommitArgs,
) -> Result<Commit, LixError> {
    let change_set_id = functions.uuid_v7();
    let commit_id = functions.uuid_v7();
    graph.create_change_set(
        changes,
        CreateChangeSetOptions {
            id: change_set_id.clone(),
            change_ids: args.change_ids,
            parent_ids: Vec::new(),
            immutable_elements: true,
        },
    )?;
    graph.create_commit(CreateCommitOptions {
        id: commit_id,
        change_set_id,
        parent_commit_ids: args.parent_commit_ids,
        created_at: functions.timestamp(),
    })
}
