use tracing::debug;

use crate::builtin_schema::builtin_schemas;
use crate::deterministic_mode::{DeterministicSettings, RuntimeFunctionProvider};
use crate::functions::LixFunctionProvider;
use crate::graph::{CreateChangeSetOptions, CreateCommitOptions};
use crate::store::Store;
use crate::version::{Version, DEFAULT_ACTIVE_VERSION_NAME, GLOBAL_VERSION_ID};
use crate::LixError;

/// A fresh store: builtin schemas, an empty root commit, the `global` version
/// and a default version inheriting from it, both on the root commit.
pub(crate) fn init_store(
    settings: DeterministicSettings,
    active_version_name: Option<&str>,
) -> Result<Store, LixError> {
    let mut store = Store {
        functions: RuntimeFunctionProvider::new(settings, 0),
        ..Store::default()
    };
    for schema in builtin_schemas()? {
        store.schemas.register(schema)?;
    }

    let change_set_id = store.functions.uuid_v7();
    store.graph.create_change_set(
        &store.changes,
        CreateChangeSetOptions {
            id: change_set_id.clone(),
            immutable_elements: true,
            ..Default::default()
        },
    )?;
    let commit_id = store.functions.uuid_v7();
    let created_at = store.functions.timestamp();
    store.graph.create_commit(CreateCommitOptions {
        id: commit_id.clone(),
        change_set_id,
        parent_commit_ids: Vec::new(),
        created_at,
    })?;

    store.versions.insert(Version::new(
        GLOBAL_VERSION_ID,
        GLOBAL_VERSION_ID,
        &commit_id,
        None,
    ))?;
    let main_id = store.functions.uuid_v7();
    let main_name = active_version_name.unwrap_or(DEFAULT_ACTIVE_VERSION_NAME);
    store.versions.insert(Version::new(
        &main_id,
        main_name,
        &commit_id,
        Some(GLOBAL_VERSION_ID),
    ))?;
    store.versions.set_default_active_version(&main_id)?;
    debug!(commit_id = %commit_id, default_version_id = %main_id, "initialized store");
    Ok(store)
}
