use std::collections::BTreeSet;

use super::VersionStore;
use crate::change::EntityKey;
use crate::state::{StateCache, StateCacheRow, StateFilter};
use crate::LixError;

/// Visible state of `version_id`.
///
/// Walks the inheritance chain nearest first. The first row found for an
/// entity decides it: a tombstone hides the entity, anything else is
/// returned. Rows taken from an ancestor carry its id in
/// `inherited_from_version_id` and report `version_id` as their version.
pub fn resolve_state(
    cache: &StateCache,
    versions: &VersionStore,
    version_id: &str,
    filter: &StateFilter,
) -> Result<Vec<StateCacheRow>, LixError> {
    let chain = versions.inheritance_chain(version_id)?;
    let mut decided = BTreeSet::new();
    let mut rows = Vec::new();

    for (depth, version) in chain.iter().enumerate() {
        for row in cache.rows(&filter.for_version(&version.id)) {
            let key = EntityKey::new(&row.schema_key, &row.entity_id, &row.file_id);
            if !decided.insert(key) || row.is_tombstone {
                continue;
            }
            let mut visible = row.clone();
            if depth > 0 {
                visible.version_id = version_id.to_string();
                visible.inherited_from_version_id = Some(version.id.clone());
            }
            rows.push(visible);
        }
    }

    rows.sort_by(|a, b| {
        a.schema_key
            .cmp(&b.schema_key)
            .then_with(|| a.file_id.cmp(&b.file_id))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    Ok(rows)
}

/// Visible state of every version matching `filter.version_id` (all versions
/// when unset), ordered by version id.
pub fn resolve_all_versions(
    cache: &StateCache,
    versions: &VersionStore,
    filter: &StateFilter,
) -> Result<Vec<StateCacheRow>, LixError> {
    let mut rows = Vec::new();
    for version in versions.iter() {
        if filter
            .version_id
            .as_deref()
            .is_some_and(|wanted| wanted != version.id)
        {
            continue;
        }
        rows.extend(resolve_state(cache, versions, &version.id, filter)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::resolve_state;
    use crate::state::{StateCache, StateCacheRow, StateFilter};
    use crate::version::{Version, VersionStore};

    fn versions() -> VersionStore {
        let mut versions = VersionStore::default();
        versions.insert(Version::new("global", "global", "c0", None)).expect("global");
        versions
            .insert(Version::new("main", "main", "c0", Some("global")))
            .expect("main");
        versions
    }

    fn row(entity_id: &str, version_id: &str, value: Option<&str>) -> StateCacheRow {
        StateCacheRow {
            entity_id: entity_id.to_string(),
            schema_key: "kv".to_string(),
            file_id: "lix".to_string(),
            version_id: version_id.to_string(),
            plugin_key: "p".to_string(),
            snapshot_content: value.map(|v| json!({ "value": v })),
            schema_version: "1.0".to_string(),
            created_at: "t".to_string(),
            updated_at: "t".to_string(),
            inherited_from_version_id: None,
            is_tombstone: value.is_none(),
            change_id: format!("{version_id}-{entity_id}"),
            commit_id: "c".to_string(),
        }
    }

    #[test]
    fn direct_rows_override_inherited_rows() {
        let mut cache = StateCache::default();
        cache.upsert(row("a", "global", Some("parent")));
        cache.upsert(row("b", "global", Some("parent")));
        cache.upsert(row("a", "main", Some("child")));

        let rows = resolve_state(&cache, &versions(), "main", &StateFilter::default())
            .expect("resolve");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].snapshot_content, Some(json!({ "value": "child" })));
        assert_eq!(rows[0].inherited_from_version_id, None);
        assert_eq!(rows[1].inherited_from_version_id.as_deref(), Some("global"));
        assert_eq!(rows[1].version_id, "main");
    }

    #[test]
    fn tombstone_hides_inherited_row() {
        let mut cache = StateCache::default();
        cache.upsert(row("a", "global", Some("parent")));
        cache.upsert(row("a", "main", None));

        let rows = resolve_state(
            &cache,
            &versions(),
            "main",
            &StateFilter::default().with_entity("a"),
        )
        .expect("resolve");
        assert!(rows.is_empty());

        let global = resolve_state(&cache, &versions(), "global", &StateFilter::default())
            .expect("resolve");
        assert_eq!(global.len(), 1);
    }
}
