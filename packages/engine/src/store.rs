use serde::{Deserialize, Serialize};

use crate::change::ChangeStore;
use crate::deterministic_mode::RuntimeFunctionProvider;
use crate::graph::CommitGraph;
use crate::schema::SchemaRegistry;
use crate::state::StateCache;
use crate::version::VersionStore;
use crate::LixError;

/// Everything a lix holds. Cloning it is the transaction savepoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Store {
    pub(crate) schemas: SchemaRegistry,
    pub(crate) changes: ChangeStore,
    pub(crate) graph: CommitGraph,
    pub(crate) versions: VersionStore,
    pub(crate) cache: StateCache,
    pub(crate) functions: RuntimeFunctionProvider,
}

impl Store {
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn changes(&self) -> &ChangeStore {
        &self.changes
    }

    pub fn graph(&self) -> &CommitGraph {
        &self.graph
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn functions(&self) -> &RuntimeFunctionProvider {
        &self.functions
    }

    /// Rebuilds the lookup structures serde skips.
    pub(crate) fn rebuild_indexes(&mut self) -> Result<(), LixError> {
        self.schemas.rebuild_validators()?;
        self.changes.rebuild_index();
        Ok(())
    }
}
