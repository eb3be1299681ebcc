mod boot;
mod builtin_schema;
mod change;
mod commit;
mod deterministic_mode;
mod engine;
mod error;
pub mod errors;
mod functions;
mod graph;
mod init;
mod key_value;
mod materialization;
mod merge;
mod plugin;
mod schema;
mod session;
mod snapshot;
pub mod sql;
mod state;
mod store;
mod transaction;
mod transition;
mod types;
mod version;

pub use boot::{boot, BootArgs, BootKeyValue};
pub use change::{Change, ChangeStore, EntityKey, NewChange};
pub use commit::{DerivedCommitArgs, PendingCommit};
pub use deterministic_mode::{DeterministicSettings, RuntimeFunctionProvider};
pub use engine::Engine;
pub use error::LixError;
pub use functions::{LixFunctionProvider, SystemFunctionProvider};
pub use graph::{
    ChangeSet, ChangeSetEdge, ChangeSetElement, Commit, CommitEdge, CommitFilter, CommitGraph,
    CreateChangeSetOptions, CreateCommitOptions, TraversalOptions,
};
pub use materialization::{
    materialization_plan, populate_state_cache, MaterializationPlan, MaterializationReport,
    MaterializationRequest, MaterializationWarning, MaterializationWrite, MaterializationWriteOp,
};
pub use merge::{DetectedConflict, MergeOutcome};
pub use plugin::{
    DetectedChange, FileChangeReport, FileChangeRequest, Plugin, PluginError, PluginFailure,
    PluginFile, PluginRegistry,
};
pub use schema::{
    derive_entity_id, lix_schema_definition, validate_lix_schema_definition, SchemaKey,
    SchemaRegistry, StoredSchema,
};
pub use session::Session;
pub use snapshot::{open_image, IMAGE_FORMAT_VERSION};
pub use state::{
    state_cache_table_name, state_history, CacheTable, HistoryEntry, StateCache, StateCacheRow,
    StateFilter,
};
pub use store::Store;
pub use transaction::Transaction;
pub use transition::TransitionOutcome;
pub use types::{QueryResult, Value};
pub use version::{
    resolve_all_versions, resolve_state, CreateVersionOptions, Version, VersionInheritance,
    VersionSource, VersionStore, DEFAULT_ACTIVE_VERSION_NAME, GLOBAL_VERSION_ID,
};
