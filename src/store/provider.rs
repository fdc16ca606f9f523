//! The JSON-file backend.
//!
//! Collections live in an in-memory cache and are persisted to one JSON file
//! per collection (or one combined `database.json`). Mutations are applied to
//! the cache synchronously and never block on disk I/O; durability comes from
//! the debounced flusher, from explicit `flush()` calls, and from
//! `disconnect()`, which always drains pending writes before returning.
//!
//! With `write_debounce_ms == 0` every mutation flushes synchronously in the
//! calling thread instead; a failed write then rolls the mutation back so the
//! cache never diverges from what the caller observed as committed.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::model::{CollectionName, Item, ItemId};
use crate::provider::{self, Provider, ProviderError, ProviderResult};
use crate::query::{engine, QueryOptions};
use crate::store::flusher::Flusher;
use crate::store::layout;

/// Configuration for the JSON-file backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsonFileConfig {
    /// Directory holding the collection files.
    pub directory_path: PathBuf,
    /// Store every collection in one `database.json` instead of one file per
    /// collection.
    pub use_single_file: bool,
    /// Pretty-print the JSON files. Formatting only; atomicity is identical.
    pub pretty_print: bool,
    /// Debounce window for coalescing writes, in milliseconds. 0 flushes
    /// synchronously on every mutation.
    pub write_debounce_ms: u64,
}

impl Default for JsonFileConfig {
    fn default() -> Self {
        Self {
            directory_path: PathBuf::new(),
            use_single_file: false,
            pretty_print: false,
            write_debounce_ms: 100,
        }
    }
}

impl JsonFileConfig {
    /// Create a configuration with the given directory.
    pub fn new(directory_path: impl Into<PathBuf>) -> Self {
        Self {
            directory_path: directory_path.into(),
            ..Default::default()
        }
    }

    /// Set single-file mode.
    pub fn use_single_file(mut self, value: bool) -> Self {
        self.use_single_file = value;
        self
    }

    /// Set pretty-printing.
    pub fn pretty_print(mut self, value: bool) -> Self {
        self.pretty_print = value;
        self
    }

    /// Set the debounce window in milliseconds.
    pub fn write_debounce_ms(mut self, value: u64) -> Self {
        self.write_debounce_ms = value;
        self
    }

    /// Check required fields. Pure; runs before any filesystem access.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.directory_path.as_os_str().is_empty() {
            return Err(ProviderError::MissingConfig {
                backend: "json-file",
                field: "directoryPath",
            });
        }
        Ok(())
    }
}

/// Counters exposed for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// collections currently held in the cache
    pub collections_loaded: usize,
    /// write-replace cycles performed since connect
    pub flushes: u64,
}

#[derive(Default)]
struct CollectionCache {
    items: BTreeMap<ItemId, Item>,
    dirty: bool,
}

struct StoreInner {
    config: JsonFileConfig,
    connected: Mutex<bool>,
    collections: RwLock<HashMap<CollectionName, CollectionCache>>,
    flusher: Mutex<Option<Flusher>>,
    flush_count: AtomicU64,
}

/// The JSON-file provider.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct JsonFileProvider {
    inner: Arc<StoreInner>,
}

impl JsonFileProvider {
    /// Create a provider from configuration. No I/O happens until
    /// `connect()`.
    pub fn new(config: JsonFileConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                connected: Mutex::new(false),
                collections: RwLock::new(HashMap::new()),
                flusher: Mutex::new(None),
                flush_count: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            collections_loaded: self.inner.collections.read().len(),
            flushes: self.inner.flush_count.load(Ordering::SeqCst),
        }
    }

    fn ensure_connected(&self) -> ProviderResult<()> {
        if *self.inner.connected.lock() {
            Ok(())
        } else {
            Err(ProviderError::NotConnected)
        }
    }

    /// Record a completed mutation: hand the collection to the flusher, or
    /// flush synchronously when debouncing is off. A failed synchronous
    /// flush restores the previous state of the mutated id so the cache
    /// still matches the last durable file.
    fn commit_mutation(
        &self,
        name: &CollectionName,
        id: &ItemId,
        prior: Option<Item>,
        was_dirty: bool,
    ) -> ProviderResult<()> {
        if self.inner.config.write_debounce_ms > 0 {
            if let Some(flusher) = self.inner.flusher.lock().as_ref() {
                flusher.mark_dirty(name.clone());
            }
            return Ok(());
        }

        let result = if self.inner.config.use_single_file {
            flush_single(&self.inner)
        } else {
            flush_collection(&self.inner, name)
        };

        if let Err(e) = result {
            let mut collections = self.inner.collections.write();
            if let Some(cache) = collections.get_mut(name) {
                match prior {
                    Some(item) => {
                        cache.items.insert(id.clone(), item);
                    }
                    None => {
                        cache.items.remove(id);
                    }
                }
                cache.dirty = was_dirty;
            }
            return Err(e);
        }

        Ok(())
    }
}

impl Provider for JsonFileProvider {
    fn connect(&self) -> ProviderResult<()> {
        self.inner.config.validate()?;
        let mut connected = self.inner.connected.lock();

        if *connected {
            // reconnect: persist pending state before dropping the caches,
            // then fall through and reload from disk
            flush_all(&self.inner)?;
        }

        layout::prepare_dir(&self.inner.config.directory_path)
            .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;

        {
            let mut collections = self.inner.collections.write();
            collections.clear();

            if self.inner.config.use_single_file {
                let path = layout::single_file_path(&self.inner.config.directory_path);
                for (name, items) in layout::load_database(&path)? {
                    collections.insert(name, CollectionCache { items, dirty: false });
                }
            }
        }

        if self.inner.config.write_debounce_ms > 0 {
            let mut flusher = self.inner.flusher.lock();
            if flusher.is_none() {
                let debounce = Duration::from_millis(self.inner.config.write_debounce_ms);
                let weak = Arc::downgrade(&self.inner);
                *flusher = Some(Flusher::spawn(debounce, move |names| {
                    let Some(inner) = weak.upgrade() else { return };
                    if let Err(e) = flush_batch(&inner, &names) {
                        warn!(error = %e, "background flush failed; collection stays dirty until the next flush");
                    }
                }));
            }
        }

        *connected = true;
        Ok(())
    }

    fn disconnect(&self) -> ProviderResult<()> {
        let mut connected = self.inner.connected.lock();
        if !*connected {
            return Ok(());
        }

        // stop() drains pending work and joins the thread, so nothing can
        // write after disconnect returns
        if let Some(flusher) = self.inner.flusher.lock().take() {
            flusher.stop();
        }

        flush_all(&self.inner)?;
        self.inner.collections.write().clear();
        *connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.inner.connected.lock()
    }

    fn create(&self, collection: &str, payload: Value) -> ProviderResult<Item> {
        self.ensure_connected()?;
        let name = CollectionName::new(collection)?;
        let (explicit_id, data) = provider::payload_into_parts(payload)?;
        let id = explicit_id.unwrap_or_else(ItemId::generate);

        ensure_loaded(&self.inner, &name)?;

        let item = Item::new(id.clone(), data);
        let was_dirty = {
            let mut collections = self.inner.collections.write();
            let cache = collections.entry(name.clone()).or_default();
            if cache.items.contains_key(&id) {
                return Err(ProviderError::DuplicateId {
                    collection: collection.to_string(),
                    id: id.into_string(),
                });
            }
            let was_dirty = cache.dirty;
            cache.items.insert(id.clone(), item.clone());
            cache.dirty = true;
            was_dirty
        };

        self.commit_mutation(&name, &id, None, was_dirty)?;
        Ok(item)
    }

    fn read(&self, collection: &str, id: &str) -> ProviderResult<Option<Item>> {
        self.ensure_connected()?;
        let (name, id) = match (CollectionName::new(collection), ItemId::new(id)) {
            (Ok(name), Ok(id)) => (name, id),
            // a name that fails validation cannot exist, so it is absent
            _ => return Ok(None),
        };

        ensure_loaded(&self.inner, &name)?;

        let collections = self.inner.collections.read();
        Ok(collections.get(&name).and_then(|cache| cache.items.get(&id)).cloned())
    }

    fn update(&self, collection: &str, id: &str, patch: Value) -> ProviderResult<Option<Item>> {
        self.ensure_connected()?;
        let patch = provider::patch_into_map(patch)?;
        let (name, id) = match (CollectionName::new(collection), ItemId::new(id)) {
            (Ok(name), Ok(id)) => (name, id),
            _ => return Ok(None),
        };

        ensure_loaded(&self.inner, &name)?;

        let (merged, prior, was_dirty) = {
            let mut collections = self.inner.collections.write();
            let Some(cache) = collections.get_mut(&name) else {
                return Ok(None);
            };
            let Some(item) = cache.items.get_mut(&id) else {
                return Ok(None);
            };
            let prior = item.clone();
            let was_dirty = cache.dirty;
            item.merge(patch);
            cache.dirty = true;
            (item.clone(), prior, was_dirty)
        };

        self.commit_mutation(&name, &id, Some(prior), was_dirty)?;
        Ok(Some(merged))
    }

    fn delete(&self, collection: &str, id: &str) -> ProviderResult<bool> {
        self.ensure_connected()?;
        let (name, id) = match (CollectionName::new(collection), ItemId::new(id)) {
            (Ok(name), Ok(id)) => (name, id),
            _ => return Ok(false),
        };

        ensure_loaded(&self.inner, &name)?;

        let (removed, was_dirty) = {
            let mut collections = self.inner.collections.write();
            let Some(cache) = collections.get_mut(&name) else {
                return Ok(false);
            };
            let was_dirty = cache.dirty;
            match cache.items.remove(&id) {
                Some(item) => {
                    cache.dirty = true;
                    (item, was_dirty)
                }
                None => return Ok(false),
            }
        };

        self.commit_mutation(&name, &id, Some(removed), was_dirty)?;
        Ok(true)
    }

    fn query(&self, collection: &str, options: &QueryOptions) -> ProviderResult<Vec<Item>> {
        self.ensure_connected()?;
        let Ok(name) = CollectionName::new(collection) else {
            return Ok(Vec::new());
        };

        ensure_loaded(&self.inner, &name)?;

        let snapshot: Vec<Item> = {
            let collections = self.inner.collections.read();
            collections
                .get(&name)
                .map(|cache| cache.items.values().cloned().collect())
                .unwrap_or_default()
        };

        engine::apply(snapshot, options)
    }

    fn flush(&self) -> ProviderResult<()> {
        self.ensure_connected()?;
        flush_all(&self.inner)
    }
}

/// Load a collection into the cache on first access. In single-file mode
/// everything was loaded at connect, so an unseen name is a new empty
/// collection.
fn ensure_loaded(inner: &StoreInner, name: &CollectionName) -> ProviderResult<()> {
    {
        let collections = inner.collections.read();
        if collections.contains_key(name) {
            return Ok(());
        }
    }

    if inner.config.use_single_file {
        let mut collections = inner.collections.write();
        collections.entry(name.clone()).or_default();
        return Ok(());
    }

    let path = layout::collection_path(&inner.config.directory_path, name);
    let items = layout::load_collection(&path)?;

    let mut collections = inner.collections.write();
    collections
        .entry(name.clone())
        .or_insert(CollectionCache { items, dirty: false });
    Ok(())
}

/// Flush one drained batch of dirty collections.
fn flush_batch(inner: &StoreInner, names: &[CollectionName]) -> ProviderResult<()> {
    if inner.config.use_single_file {
        return flush_single(inner);
    }
    for name in names {
        flush_collection(inner, name)?;
    }
    Ok(())
}

/// Flush every dirty collection.
fn flush_all(inner: &StoreInner) -> ProviderResult<()> {
    if inner.config.use_single_file {
        return flush_single(inner);
    }

    let dirty: Vec<CollectionName> = {
        let collections = inner.collections.read();
        collections
            .iter()
            .filter(|(_, cache)| cache.dirty)
            .map(|(name, _)| name.clone())
            .collect()
    };

    for name in dirty {
        flush_collection(inner, &name)?;
    }
    Ok(())
}

/// Write one collection with the snapshot-then-serialize discipline: the
/// dirty flag clears with the snapshot, so a mutation landing during the
/// file write re-marks it and is picked up by the next flush.
fn flush_collection(inner: &StoreInner, name: &CollectionName) -> ProviderResult<()> {
    let snapshot = {
        let mut collections = inner.collections.write();
        let Some(cache) = collections.get_mut(name) else {
            return Ok(());
        };
        if !cache.dirty {
            return Ok(());
        }
        cache.dirty = false;
        cache.items.clone()
    };

    let bytes = layout::serialize_collection(&snapshot, inner.config.pretty_print)?;
    let path = layout::collection_path(&inner.config.directory_path, name);

    if let Err(e) = layout::write_atomic(&path, &bytes) {
        let mut collections = inner.collections.write();
        if let Some(cache) = collections.get_mut(name) {
            cache.dirty = true;
        }
        return Err(e);
    }

    inner.flush_count.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

/// Single-file mode: any dirty collection rewrites the whole database file.
fn flush_single(inner: &StoreInner) -> ProviderResult<()> {
    let snapshot: BTreeMap<CollectionName, BTreeMap<ItemId, Item>> = {
        let mut collections = inner.collections.write();
        if !collections.values().any(|cache| cache.dirty) {
            return Ok(());
        }
        for cache in collections.values_mut() {
            cache.dirty = false;
        }
        collections
            .iter()
            .map(|(name, cache)| (name.clone(), cache.items.clone()))
            .collect()
    };

    let bytes = layout::serialize_database(&snapshot, inner.config.pretty_print)?;
    let path = layout::single_file_path(&inner.config.directory_path);

    if let Err(e) = layout::write_atomic(&path, &bytes) {
        let mut collections = inner.collections.write();
        for cache in collections.values_mut() {
            cache.dirty = true;
        }
        return Err(e);
    }

    inner.flush_count.fetch_add(1, Ordering::SeqCst);
    Ok(())
}
