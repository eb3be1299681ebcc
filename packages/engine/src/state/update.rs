use tracing::debug;

use super::{StateCache, StateCacheRow};
use crate::change::Change;
use crate::version::VersionStore;
use crate::LixError;

/// Applies `changes` to the cache rows of `version_id` in the given order.
///
/// Content overwrites the direct row, including its timestamps. A delete
/// writes a tombstone when the version inherits from another version, so the
/// parent's row cannot resurface; in a root version it removes the row.
pub(crate) fn update_state_cache(
    cache: &mut StateCache,
    versions: &VersionStore,
    changes: &[Change],
    commit_id: &str,
    version_id: &str,
) -> Result<(), LixError> {
    let inherits = versions.require(version_id)?.inherits_from_version_id.is_some();
    debug!(version_id, commit_id, changes = changes.len(), "updating state cache");

    for change in changes {
        if change.snapshot_content.is_some() || inherits {
            cache.upsert(StateCacheRow::from_change(change, version_id, commit_id));
        } else {
            cache.remove(
                &change.schema_key,
                &change.entity_id,
                &change.file_id,
                version_id,
            );
        }
    }
    Ok(())
}
