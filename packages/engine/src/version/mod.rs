mod create_version;
mod resolve;
mod switch_version;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors;
use crate::graph::CommitGraph;
use crate::LixError;

pub use create_version::{CreateVersionOptions, VersionInheritance, VersionSource};
pub use resolve::{resolve_all_versions, resolve_state};

pub const GLOBAL_VERSION_ID: &str = "global";
pub const DEFAULT_ACTIVE_VERSION_NAME: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub name: String,
    pub commit_id: String,
    pub inherits_from_version_id: Option<String>,
}

impl Version {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        commit_id: impl Into<String>,
        inherits_from_version_id: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            commit_id: commit_id.into(),
            inherits_from_version_id: inherits_from_version_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionStore {
    versions: BTreeMap<String, Version>,
    default_active_version_id: String,
}

impl VersionStore {
    pub fn get(&self, id: &str) -> Option<&Version> {
        self.versions.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Version, LixError> {
        self.get(id)
            .ok_or_else(|| errors::version_not_found_error(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.values()
    }

    pub fn by_name(&self, name: &str) -> Option<&Version> {
        self.versions.values().find(|version| version.name == name)
    }

    /// The version whose history reaches `commit_id` in the fewest steps.
    /// Ties go to the smaller version id.
    pub fn owner_of_commit(
        &self,
        graph: &CommitGraph,
        commit_id: &str,
    ) -> Result<Option<&Version>, LixError> {
        let mut owner: Option<(usize, &Version)> = None;
        for version in self.versions.values() {
            let depths = graph.commit_depths(&version.commit_id)?;
            let Some(depth) = depths.get(commit_id).copied() else {
                continue;
            };
            if owner.map_or(true, |(nearest, _)| depth < nearest) {
                owner = Some((depth, version));
            }
        }
        Ok(owner.map(|(_, version)| version))
    }

    pub fn default_active_version_id(&self) -> &str {
        &self.default_active_version_id
    }

    pub(crate) fn set_default_active_version(&mut self, id: &str) -> Result<(), LixError> {
        self.require(id)?;
        self.default_active_version_id = id.to_string();
        Ok(())
    }

    pub fn insert(&mut self, version: Version) -> Result<(), LixError> {
        if self.versions.contains_key(&version.id) {
            return Err(errors::primary_key_violation_error(
                "version",
                &format!("(id = {})", version.id),
            ));
        }
        if let Some(parent_id) = &version.inherits_from_version_id {
            if *parent_id == version.id {
                return Err(errors::inheritance_cycle_error(&version.id, parent_id));
            }
            self.require(parent_id)?;
        }
        self.versions.insert(version.id.clone(), version);
        Ok(())
    }

    pub(crate) fn set_commit(&mut self, version_id: &str, commit_id: &str) -> Result<(), LixError> {
        let version = self
            .versions
            .get_mut(version_id)
            .ok_or_else(|| errors::version_not_found_error(version_id))?;
        version.commit_id = commit_id.to_string();
        Ok(())
    }

    /// Re-parents a version. Rejects a parent whose own chain reaches back to
    /// `version_id`.
    pub(crate) fn set_inheritance(
        &mut self,
        version_id: &str,
        parent_id: Option<&str>,
    ) -> Result<(), LixError> {
        self.require(version_id)?;
        if let Some(parent_id) = parent_id {
            let chain = self.inheritance_chain(parent_id)?;
            if chain.iter().any(|version| version.id == version_id) {
                return Err(errors::inheritance_cycle_error(version_id, parent_id));
            }
        }
        if let Some(version) = self.versions.get_mut(version_id) {
            version.inherits_from_version_id = parent_id.map(str::to_string);
        }
        Ok(())
    }

    pub(crate) fn remove(&mut self, version_id: &str) -> Result<Version, LixError> {
        self.versions
            .remove(version_id)
            .ok_or_else(|| errors::version_not_found_error(version_id))
    }

    /// `version_id` followed by its ancestors, nearest first.
    pub fn inheritance_chain(&self, version_id: &str) -> Result<Vec<&Version>, LixError> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = Some(version_id);
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(errors::inheritance_cycle_error(version_id, id));
            }
            let version = self.require(id)?;
            chain.push(version);
            current = version.inherits_from_version_id.as_deref();
        }
        Ok(chain)
    }

    /// Versions that inherit directly from `version_id`.
    pub fn children(&self, version_id: &str) -> Vec<&Version> {
        self.versions
            .values()
            .filter(|version| version.inherits_from_version_id.as_deref() == Some(version_id))
            .collect()
    }
}
