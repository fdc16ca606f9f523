//! Record-level merge for the `merge-by-timestamp` strategy.
//!
//! When both sides of a merge touched the same collection file, git sees one
//! conflicted blob per side. This module re-merges those blobs at the record
//! level using the engine-assigned `_updated_at` metadata:
//!
//! - a record present on both sides keeps whichever copy was written later;
//! - a record present on one side only is an addition (kept) unless the
//!   other side deleted it while this side left it unchanged from the merge
//!   ancestor — a concurrent modification beats a deletion, since deletions
//!   carry no timestamp of their own;
//! - ties break by `_version`, then by canonical serialized bytes.
//!
//! Every rule is symmetric in its inputs, so merging A into B and B into A
//! produce the same record set — replicas converge regardless of merge
//! order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::model::{CollectionName, Item, ItemId};
use crate::provider::ProviderResult;
use crate::store::layout;

/// Merge the three sides of one conflicted file into resolved bytes.
///
/// Understands both on-disk shapes: a per-collection file (map of id to
/// record) and the single-file `database.json` (map of collection name to
/// such a map). A missing side is an empty map.
pub(crate) fn merge_file(
    ancestor: Option<&[u8]>,
    ours: Option<&[u8]>,
    theirs: Option<&[u8]>,
    path: &Path,
) -> ProviderResult<Vec<u8>> {
    let is_database_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n == layout::SINGLE_FILE_NAME)
        .unwrap_or(false);

    if is_database_file {
        let ancestor = parse_database_side(ancestor, path)?;
        let ours = parse_database_side(ours, path)?;
        let theirs = parse_database_side(theirs, path)?;
        let merged = merge_databases(&ancestor, &ours, &theirs);
        layout::serialize_database(&merged, true)
    } else {
        let ancestor = parse_collection_side(ancestor, path)?;
        let ours = parse_collection_side(ours, path)?;
        let theirs = parse_collection_side(theirs, path)?;
        let merged = merge_collections(&ancestor, &ours, &theirs);
        layout::serialize_collection(&merged, true)
    }
}

fn parse_collection_side(
    bytes: Option<&[u8]>,
    path: &Path,
) -> ProviderResult<BTreeMap<ItemId, Item>> {
    match bytes {
        Some(bytes) => layout::parse_collection(bytes, path),
        None => Ok(BTreeMap::new()),
    }
}

fn parse_database_side(
    bytes: Option<&[u8]>,
    path: &Path,
) -> ProviderResult<BTreeMap<CollectionName, BTreeMap<ItemId, Item>>> {
    match bytes {
        Some(bytes) => parse_database(bytes, path),
        None => Ok(BTreeMap::new()),
    }
}

fn parse_database(
    bytes: &[u8],
    path: &Path,
) -> ProviderResult<BTreeMap<CollectionName, BTreeMap<ItemId, Item>>> {
    let raw: BTreeMap<CollectionName, BTreeMap<ItemId, Item>> = serde_json::from_slice(bytes)
        .map_err(|e| crate::provider::ProviderError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(raw)
}

/// Merge whole databases collection by collection (single-file mode).
pub(crate) fn merge_databases(
    ancestor: &BTreeMap<CollectionName, BTreeMap<ItemId, Item>>,
    ours: &BTreeMap<CollectionName, BTreeMap<ItemId, Item>>,
    theirs: &BTreeMap<CollectionName, BTreeMap<ItemId, Item>>,
) -> BTreeMap<CollectionName, BTreeMap<ItemId, Item>> {
    static EMPTY: BTreeMap<ItemId, Item> = BTreeMap::new();

    let names: BTreeSet<&CollectionName> = ours.keys().chain(theirs.keys()).collect();
    let mut merged = BTreeMap::new();
    for name in names {
        let collection = merge_collections(
            ancestor.get(name).unwrap_or(&EMPTY),
            ours.get(name).unwrap_or(&EMPTY),
            theirs.get(name).unwrap_or(&EMPTY),
        );
        merged.insert(name.clone(), collection);
    }
    merged
}

/// Merge one collection record by record.
pub(crate) fn merge_collections(
    ancestor: &BTreeMap<ItemId, Item>,
    ours: &BTreeMap<ItemId, Item>,
    theirs: &BTreeMap<ItemId, Item>,
) -> BTreeMap<ItemId, Item> {
    let ids: BTreeSet<&ItemId> = ours.keys().chain(theirs.keys()).collect();

    let mut merged = BTreeMap::new();
    for id in ids {
        match (ours.get(id), theirs.get(id)) {
            (Some(a), Some(b)) => {
                merged.insert(id.clone(), newer(a, b).clone());
            }
            (Some(a), None) => {
                if !deleted_elsewhere(ancestor.get(id), a) {
                    merged.insert(id.clone(), a.clone());
                }
            }
            (None, Some(b)) => {
                if !deleted_elsewhere(ancestor.get(id), b) {
                    merged.insert(id.clone(), b.clone());
                }
            }
            (None, None) => {}
        }
    }
    merged
}

/// The record is missing on the other side. That is a deletion to honor only
/// if the surviving copy is unchanged from the merge ancestor; otherwise it
/// is either our addition or a modification that outranks the delete.
fn deleted_elsewhere(ancestor: Option<&Item>, surviving: &Item) -> bool {
    matches!(ancestor, Some(base) if base == surviving)
}

fn newer<'a>(a: &'a Item, b: &'a Item) -> &'a Item {
    if record_ordering(a, b) == Ordering::Less {
        b
    } else {
        a
    }
}

/// Total, symmetric order over two copies of the same record: update
/// timestamp, then version, then canonical bytes.
fn record_ordering(a: &Item, b: &Item) -> Ordering {
    let by_time = match (a.updated_at_utc(), b.updated_at_utc()) {
        (Some(x), Some(y)) => x.cmp(&y),
        // RFC-3339 strings order lexicographically; fall back if unparseable
        _ => a.updated_at.cmp(&b.updated_at),
    };

    by_time
        .then(a.version.cmp(&b.version))
        .then_with(|| canonical(a).cmp(&canonical(b)))
}

fn canonical(item: &Item) -> String {
    serde_json::to_string(item).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, name: &str, updated_at: &str, version: u64) -> Item {
        let mut item = Item::new(
            ItemId::new(id).unwrap(),
            BTreeMap::from([("name".to_string(), json!(name))]),
        );
        item.updated_at = updated_at.to_string();
        item.version = version;
        item
    }

    fn collection(items: &[Item]) -> BTreeMap<ItemId, Item> {
        items.iter().map(|i| (i.id.clone(), i.clone())).collect()
    }

    #[test]
    fn test_newer_edit_wins() {
        let base = record("t1", "Drill", "2026-01-01T00:00:00+00:00", 1);
        let older = record("t1", "Old", "2026-01-01T00:01:00+00:00", 2);
        let newer = record("t1", "New", "2026-01-01T00:02:00+00:00", 2);

        let merged = merge_collections(
            &collection(&[base]),
            &collection(&[older.clone()]),
            &collection(&[newer.clone()]),
        );
        assert_eq!(merged.get(&newer.id).unwrap().get("name"), Some(&json!("New")));
    }

    #[test]
    fn test_merge_order_independence() {
        let base = record("t1", "Drill", "2026-01-01T00:00:00+00:00", 1);
        let a = record("t1", "A-edit", "2026-01-01T00:01:00+00:00", 2);
        let b = record("t1", "B-edit", "2026-01-01T00:02:00+00:00", 2);
        let ancestor = collection(&[base]);

        let ab = merge_collections(&ancestor, &collection(&[a.clone()]), &collection(&[b.clone()]));
        let ba = merge_collections(&ancestor, &collection(&[b]), &collection(&[a]));

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_tie_breaks_are_symmetric() {
        // identical timestamps and versions, different payloads
        let a = record("t1", "aaa", "2026-01-01T00:00:00+00:00", 2);
        let b = record("t1", "zzz", "2026-01-01T00:00:00+00:00", 2);
        let ancestor = BTreeMap::new();

        let ab = merge_collections(&ancestor, &collection(&[a.clone()]), &collection(&[b.clone()]));
        let ba = merge_collections(&ancestor, &collection(&[b]), &collection(&[a]));

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_additions_on_both_sides_survive() {
        let ours = record("t1", "Ours", "2026-01-01T00:00:00+00:00", 1);
        let theirs = record("t2", "Theirs", "2026-01-01T00:00:00+00:00", 1);

        let merged = merge_collections(
            &BTreeMap::new(),
            &collection(&[ours]),
            &collection(&[theirs]),
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_clean_deletion_is_honored() {
        let base = record("t1", "Drill", "2026-01-01T00:00:00+00:00", 1);
        let ancestor = collection(&[base.clone()]);

        // they deleted it, we never touched it
        let merged = merge_collections(&ancestor, &collection(&[base]), &BTreeMap::new());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_modification_beats_deletion() {
        let base = record("t1", "Drill", "2026-01-01T00:00:00+00:00", 1);
        let edited = record("t1", "Drill-2", "2026-01-01T00:05:00+00:00", 2);
        let ancestor = collection(&[base]);

        let merged = merge_collections(&ancestor, &collection(&[edited.clone()]), &BTreeMap::new());
        assert_eq!(merged.get(&edited.id).unwrap().get("name"), Some(&json!("Drill-2")));

        // and symmetrically when the edit is on the other side
        let merged = merge_collections(&ancestor, &BTreeMap::new(), &collection(&[edited.clone()]));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_database_merge_unions_collections() {
        let tools = record("t1", "Drill", "2026-01-01T00:00:00+00:00", 1);
        let users = record("u1", "Alice", "2026-01-01T00:00:00+00:00", 1);

        let ours = BTreeMap::from([(CollectionName::new("tools").unwrap(), collection(&[tools]))]);
        let theirs = BTreeMap::from([(CollectionName::new("users").unwrap(), collection(&[users]))]);

        let merged = merge_databases(&BTreeMap::new(), &ours, &theirs);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_file_roundtrip() {
        let base = record("t1", "Drill", "2026-01-01T00:00:00+00:00", 1);
        let edit = record("t1", "Drill-2", "2026-01-01T00:05:00+00:00", 2);

        let ancestor = layout::serialize_collection(&collection(&[base.clone()]), false).unwrap();
        let ours = layout::serialize_collection(&collection(&[base]), false).unwrap();
        let theirs = layout::serialize_collection(&collection(&[edit.clone()]), false).unwrap();

        let merged_bytes = merge_file(
            Some(&ancestor),
            Some(&ours),
            Some(&theirs),
            Path::new("tools.json"),
        )
        .unwrap();

        let merged = layout::parse_collection(&merged_bytes, Path::new("tools.json")).unwrap();
        assert_eq!(merged.get(&edit.id).unwrap().get("name"), Some(&json!("Drill-2")));
    }
}
