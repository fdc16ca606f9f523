//! On-disk layout and atomic file replacement.
//!
//! Each collection file is a JSON object keyed by item id:
//!
//! ```json
//! {
//!   "t1": { "_id": "t1", "_version": 1, ... , "name": "Drill" }
//! }
//! ```
//!
//! Single-file mode nests the same shape one level deeper, keyed by
//! collection name. Writes always go through [`write_atomic`]: serialize to
//! `<name>.json.tmp` in the same directory, then rename over the target.
//! The rename is the only step visible to readers, so the target file is
//! either the previous complete version or the new complete version, never
//! a partial write.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{CollectionName, Item, ItemId};
use crate::provider::{ProviderError, ProviderResult};

/// file name used in single-file mode
pub const SINGLE_FILE_NAME: &str = "database.json";

/// suffix for in-flight temp files
const TMP_SUFFIX: &str = ".json.tmp";

/// Path of a collection's file in per-collection mode.
pub fn collection_path(dir: &Path, name: &CollectionName) -> PathBuf {
    dir.join(format!("{}.json", name))
}

/// Path of the combined file in single-file mode.
pub fn single_file_path(dir: &Path) -> PathBuf {
    dir.join(SINGLE_FILE_NAME)
}

/// Create the storage directory and remove orphaned temp files left behind
/// by a crash between temp-write and rename.
pub fn prepare_dir(dir: &Path) -> ProviderResult<()> {
    fs::create_dir_all(dir).map_err(|e| ProviderError::io(dir, e))?;

    for entry in fs::read_dir(dir).map_err(|e| ProviderError::io(dir, e))? {
        let entry = entry.map_err(|e| ProviderError::io(dir, e))?;
        let path = entry.path();
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(TMP_SUFFIX))
            .unwrap_or(false);
        if is_tmp {
            fs::remove_file(&path).map_err(|e| ProviderError::io(&path, e))?;
        }
    }

    Ok(())
}

/// Write bytes to `path` atomically: temp file in the same directory, then
/// rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> ProviderResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| ProviderError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| ProviderError::io(path, e))?;

    Ok(())
}

/// Serialize one collection map.
pub fn serialize_collection(
    items: &BTreeMap<ItemId, Item>,
    pretty: bool,
) -> ProviderResult<Vec<u8>> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(items)?
    } else {
        serde_json::to_vec(items)?
    };
    Ok(bytes)
}

/// Serialize the whole database for single-file mode.
pub fn serialize_database(
    collections: &BTreeMap<CollectionName, BTreeMap<ItemId, Item>>,
    pretty: bool,
) -> ProviderResult<Vec<u8>> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(collections)?
    } else {
        serde_json::to_vec(collections)?
    };
    Ok(bytes)
}

/// Load one collection file. A missing file is an empty collection, not an
/// error; an unparseable file is corruption, reported with the path and the
/// parse failure detail.
pub fn load_collection(path: &Path) -> ProviderResult<BTreeMap<ItemId, Item>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(ProviderError::io(path, e)),
    };

    parse_collection(&bytes, path)
}

/// Load the combined file for single-file mode.
pub fn load_database(
    path: &Path,
) -> ProviderResult<BTreeMap<CollectionName, BTreeMap<ItemId, Item>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(ProviderError::io(path, e)),
    };

    let raw: BTreeMap<CollectionName, BTreeMap<ItemId, Item>> = serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    for items in raw.values() {
        check_id_consistency(items, path)?;
    }

    Ok(raw)
}

/// Parse a collection map, validating that each map key matches the
/// embedded `_id`.
pub fn parse_collection(bytes: &[u8], path: &Path) -> ProviderResult<BTreeMap<ItemId, Item>> {
    let items: BTreeMap<ItemId, Item> =
        serde_json::from_slice(bytes).map_err(|e| ProviderError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    check_id_consistency(&items, path)?;
    Ok(items)
}

fn check_id_consistency(items: &BTreeMap<ItemId, Item>, path: &Path) -> ProviderResult<()> {
    for (key, item) in items {
        if key != &item.id {
            return Err(ProviderError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "id mismatch: map key is '{}' but record carries '{}'",
                    key, item.id
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_items() -> BTreeMap<ItemId, Item> {
        let id = ItemId::new("t1").unwrap();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), json!("Drill"));
        let item = Item::new(id.clone(), data);
        BTreeMap::from([(id, item)])
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let name = CollectionName::new("tools").unwrap();
        let path = collection_path(dir.path(), &name);

        let items = sample_items();
        let bytes = serialize_collection(&items, false).unwrap();
        write_atomic(&path, &bytes).unwrap();

        let loaded = load_collection(&path).unwrap();
        assert_eq!(loaded, items);
    }

    #[test]
    fn test_atomic_write_leaves_no_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tools.json");
        write_atomic(&path, b"{}").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["tools.json"]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = load_collection(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_corrupt_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tools.json");
        fs::write(&path, b"not json{").unwrap();

        let err = load_collection(&path).unwrap_err();
        assert!(matches!(err, ProviderError::Corrupt { .. }));
        assert!(err.to_string().contains("tools.json"));
    }

    #[test]
    fn test_id_mismatch_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tools.json");
        fs::write(
            &path,
            serde_json::to_vec(&json!({
                "wrong": {"_id": "t1", "_version": 1,
                          "_created_at": "2026-01-01T00:00:00+00:00",
                          "_updated_at": "2026-01-01T00:00:00+00:00"}
            }))
            .unwrap(),
        )
        .unwrap();

        let err = load_collection(&path).unwrap_err();
        assert!(matches!(err, ProviderError::Corrupt { .. }));
    }

    #[test]
    fn test_prepare_dir_sweeps_orphan_tmp() {
        let dir = TempDir::new().unwrap();
        let keep = dir.path().join("tools.json");
        let orphan = dir.path().join("tools.json.tmp");
        fs::write(&keep, b"{}").unwrap();
        fs::write(&orphan, b"partial garbage").unwrap();

        prepare_dir(dir.path()).unwrap();

        assert!(keep.exists());
        assert!(!orphan.exists());
    }

    #[test]
    fn test_crash_window_preserves_previous_file() {
        let dir = TempDir::new().unwrap();
        let name = CollectionName::new("tools").unwrap();
        let path = collection_path(dir.path(), &name);

        let items = sample_items();
        write_atomic(&path, &serialize_collection(&items, false).unwrap()).unwrap();
        let committed = fs::read(&path).unwrap();

        // a crash between temp-write and rename leaves a stale tmp behind
        fs::write(dir.path().join("tools.json.tmp"), b"half-written").unwrap();

        prepare_dir(dir.path()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), committed);
        assert_eq!(load_collection(&path).unwrap(), items);
    }

    #[test]
    fn test_database_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = single_file_path(dir.path());

        let mut db = BTreeMap::new();
        db.insert(CollectionName::new("tools").unwrap(), sample_items());

        write_atomic(&path, &serialize_database(&db, true).unwrap()).unwrap();
        assert_eq!(load_database(&path).unwrap(), db);
    }
}
