use tracing::{debug, instrument};

use super::{Version, GLOBAL_VERSION_ID};
use crate::errors;
use crate::materialization::MaterializationRequest;
use crate::session::Session;
use crate::state::StateFilter;
use crate::transaction::Transaction;
use crate::LixError;

/// Where a new version's tip comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionSource {
    #[default]
    ActiveVersion,
    Version(String),
    Commit(String),
}

/// Parent of a new version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionInheritance {
    #[default]
    Global,
    ActiveVersion,
    Version(String),
    None,
    /// The version whose history contains the commit the new version starts
    /// from, nearest first.
    OwnerOfCommit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateVersionOptions {
    pub id: Option<String>,
    pub name: Option<String>,
    pub from: VersionSource,
    /// Defaults to the active version.
    pub inherits_from: Option<VersionInheritance>,
}

impl<'a> Transaction<'a> {
    #[instrument(skip_all)]
    pub fn create_version(&mut self, options: CreateVersionOptions) -> Result<Version, LixError> {
        self.flush_pending()?;
        let commit_id = match &options.from {
            VersionSource::ActiveVersion => self.active_version()?.commit_id.clone(),
            VersionSource::Version(version_id) => {
                self.store.versions.require(version_id)?.commit_id.clone()
            }
            VersionSource::Commit(commit_id) => commit_id.clone(),
        };
        let inherits = options
            .inherits_from
            .unwrap_or(VersionInheritance::ActiveVersion);
        self.insert_version(options.id, options.name, commit_id, inherits)
    }

    /// Creates a version whose tip is `commit_id`.
    pub fn create_version_from_commit(
        &mut self,
        commit_id: &str,
        name: Option<String>,
        inherits: VersionInheritance,
    ) -> Result<Version, LixError> {
        self.flush_pending()?;
        self.insert_version(None, name, commit_id.to_string(), inherits)
    }

    fn insert_version(
        &mut self,
        id: Option<String>,
        name: Option<String>,
        commit_id: String,
        inherits: VersionInheritance,
    ) -> Result<Version, LixError> {
        let id = non_empty(id, "id")?.unwrap_or_else(|| self.uuid_v7());
        let name = non_empty(name, "name")?.unwrap_or_else(|| id.clone());
        self.store.graph.require_commit(&commit_id)?;

        let parent = match inherits {
            VersionInheritance::Global => Some(GLOBAL_VERSION_ID.to_string()),
            VersionInheritance::ActiveVersion => Some(self.active_version_id().to_string()),
            VersionInheritance::Version(parent_id) => Some(parent_id),
            VersionInheritance::None => None,
            VersionInheritance::OwnerOfCommit => {
                let owner = self
                    .store
                    .versions
                    .owner_of_commit(&self.store.graph, &commit_id)?
                    .map(|version| version.id.clone())
                    .ok_or_else(|| {
                        errors::invalid_parameter_error(&format!(
                            "no version has commit `{commit_id}` in its history"
                        ))
                    })?;
                Some(owner)
            }
        };

        let version = Version {
            id,
            name,
            commit_id,
            inherits_from_version_id: parent,
        };
        self.store.versions.insert(version.clone())?;
        self.populate_state_cache(&MaterializationRequest {
            filter: StateFilter::version(&version.id),
            include_ancestors: false,
        })?;
        debug!(version_id = %version.id, commit_id = %version.commit_id, "created version");
        Ok(version)
    }

    /// Removes a version and its cache rows. The active version, the default
    /// version and versions other versions inherit from cannot be deleted.
    pub fn delete_version(&mut self, version_id: &str) -> Result<Version, LixError> {
        self.flush_pending()?;
        self.store.versions.require(version_id)?;
        if version_id == self.active_version_id() {
            return Err(errors::version_in_use_error(version_id, "it is the active version"));
        }
        if version_id == self.store.versions.default_active_version_id() {
            return Err(errors::version_in_use_error(
                version_id,
                "it is the default active version",
            ));
        }
        if let Some(child) = self.store.versions.children(version_id).first() {
            return Err(errors::version_in_use_error(
                version_id,
                &format!("version `{}` inherits from it", child.id),
            ));
        }
        let removed = self.store.versions.remove(version_id)?;
        self.store.cache.clear(&StateFilter::version(version_id));
        Ok(removed)
    }

    /// Re-parents a version and rebuilds its cache rows, since tombstones are
    /// only kept in versions that inherit.
    pub fn set_version_inheritance(
        &mut self,
        version_id: &str,
        parent_id: Option<&str>,
    ) -> Result<(), LixError> {
        self.flush_pending()?;
        self.store.versions.set_inheritance(version_id, parent_id)?;
        self.populate_state_cache(&MaterializationRequest {
            filter: StateFilter::version(version_id),
            include_ancestors: false,
        })?;
        Ok(())
    }
}

impl Session {
    pub fn create_version(&mut self, options: CreateVersionOptions) -> Result<Version, LixError> {
        self.transaction(|tx| tx.create_version(options))
    }

    pub fn create_version_from_commit(
        &mut self,
        commit_id: &str,
        name: Option<String>,
        inherits: VersionInheritance,
    ) -> Result<Version, LixError> {
        self.transaction(|tx| tx.create_version_from_commit(commit_id, name, inherits))
    }

    pub fn delete_version(&mut self, version_id: &str) -> Result<Version, LixError> {
        self.transaction(|tx| tx.delete_version(version_id))
    }

    pub fn set_version_inheritance(
        &mut self,
        version_id: &str,
        parent_id: Option<&str>,
    ) -> Result<(), LixError> {
        self.transaction(|tx| tx.set_version_inheritance(version_id, parent_id))
    }

    pub fn list_versions(&self) -> Result<Vec<Version>, LixError> {
        self.engine()
            .read(|store| Ok(store.versions.iter().cloned().collect()))
    }
}

fn non_empty(value: Option<String>, field: &str) -> Result<Option<String>, LixError> {
    match value {
        Some(value) if value.trim().is_empty() => Err(errors::invalid_parameter_error(&format!(
            "{field} must be a non-empty string when provided"
        ))),
        other => Ok(other),
    }
}
