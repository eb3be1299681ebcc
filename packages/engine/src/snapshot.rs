//! Export and import of a whole store as a zip image.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::engine::Engine;
use crate::errors;
use crate::plugin::{Plugin, PluginRegistry};
use crate::store::Store;
use crate::LixError;

pub const IMAGE_FORMAT_VERSION: u32 = 1;
const MANIFEST_MEMBER: &str = "manifest.json";

const SCHEMAS_MEMBER: &str = "schemas.json";
const CHANGES_MEMBER: &str = "changes.json";
const GRAPH_MEMBER: &str = "graph.json";
const VERSIONS_MEMBER: &str = "versions.json";
const CACHE_MEMBER: &str = "cache.json";
const FUNCTIONS_MEMBER: &str = "functions.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ImageManifest {
    format_version: u32,
    /// Member name to blake3 hex digest.
    members: BTreeMap<String, String>,
}

impl Engine {
    /// Serializes the whole store, deterministic counter included.
    #[instrument(skip(self))]
    pub fn export_image(&self) -> Result<Vec<u8>, LixError> {
        let members = self.read(|store| {
            Ok(vec![
                (SCHEMAS_MEMBER, serde_json::to_vec(&store.schemas)?),
                (CHANGES_MEMBER, serde_json::to_vec(&store.changes)?),
                (GRAPH_MEMBER, serde_json::to_vec(&store.graph)?),
                (VERSIONS_MEMBER, serde_json::to_vec(&store.versions)?),
                (CACHE_MEMBER, serde_json::to_vec(&store.cache)?),
                (FUNCTIONS_MEMBER, serde_json::to_vec(&store.functions)?),
            ])
        })?;

        let manifest = ImageManifest {
            format_version: IMAGE_FORMAT_VERSION,
            members: members
                .iter()
                .map(|(name, bytes)| (name.to_string(), blake3::hash(bytes).to_hex().to_string()))
                .collect(),
        };

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(MANIFEST_MEMBER, options)?;
        writer.write_all(&serde_json::to_vec_pretty(&manifest)?)?;
        for (name, bytes) in &members {
            writer.start_file(*name, options)?;
            writer.write_all(bytes)?;
        }
        let image = writer.finish()?.into_inner();
        debug!(bytes = image.len(), "exported image");
        Ok(image)
    }
}

/// Restores an engine from [`Engine::export_image`] output. Every member is
/// checked against the manifest digest before anything is deserialized.
#[instrument(skip(bytes, plugins), fields(bytes = bytes.len()))]
pub fn open_image(bytes: &[u8], plugins: Vec<Arc<dyn Plugin>>) -> Result<Engine, LixError> {
    if bytes.is_empty() {
        return Err(errors::image_invalid_error("the image is empty"));
    }
    let mut members = read_members(bytes)?;
    let manifest: ImageManifest = serde_json::from_slice(
        &members
            .remove(MANIFEST_MEMBER)
            .ok_or_else(|| errors::image_invalid_error("`manifest.json` is missing"))?,
    )?;
    if manifest.format_version != IMAGE_FORMAT_VERSION {
        return Err(errors::image_invalid_error(&format!(
            "format version {} is not supported (expected {IMAGE_FORMAT_VERSION})",
            manifest.format_version
        )));
    }
    for (name, digest) in &manifest.members {
        let member = members
            .get(name)
            .ok_or_else(|| errors::image_invalid_error(&format!("`{name}` is missing")))?;
        if blake3::hash(member).to_hex().as_str() != digest {
            return Err(errors::image_invalid_error(&format!(
                "`{name}` does not match its digest"
            )));
        }
    }

    let mut store = Store {
        schemas: member(&members, SCHEMAS_MEMBER)?,
        changes: member(&members, CHANGES_MEMBER)?,
        graph: member(&members, GRAPH_MEMBER)?,
        versions: member(&members, VERSIONS_MEMBER)?,
        cache: member(&members, CACHE_MEMBER)?,
        functions: member(&members, FUNCTIONS_MEMBER)?,
    };
    store.rebuild_indexes()?;
    debug!(changes = store.changes.len(), "opened image");
    Ok(Engine::from_store(store, PluginRegistry::new(plugins)))
}

fn read_members(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, LixError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| errors::image_invalid_error(&format!("not a zip archive: {error}")))?;
    let mut members = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        if members.insert(name.clone(), contents).is_some() {
            return Err(errors::image_invalid_error(&format!(
                "duplicate member `{name}`"
            )));
        }
    }
    Ok(members)
}

fn member<T: DeserializeOwned>(
    members: &BTreeMap<String, Vec<u8>>,
    name: &str,
) -> Result<T, LixError> {
    let bytes = members
        .get(name)
        .ok_or_else(|| errors::image_invalid_error(&format!("`{name}` is missing")))?;
    Ok(serde_json::from_slice(bytes)?)
}
