//! In-memory backend.
//!
//! A HashMap of collections behind a read-write lock. Useful as a test
//! double and as a base provider for the git-sync layer in setups where only
//! the git history needs to survive. Data lives until the provider is
//! dropped; disconnecting only gates access.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::model::{CollectionName, Item, ItemId};
use crate::provider::{self, Provider, ProviderError, ProviderResult};
use crate::query::{engine, QueryOptions};

/// The in-memory provider.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    connected: AtomicBool,
    collections: RwLock<HashMap<CollectionName, BTreeMap<ItemId, Item>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_connected(&self) -> ProviderResult<()> {
        if self.inner.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::NotConnected)
        }
    }
}

impl Provider for MemoryProvider {
    fn connect(&self) -> ProviderResult<()> {
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> ProviderResult<()> {
        self.inner.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn create(&self, collection: &str, payload: Value) -> ProviderResult<Item> {
        self.ensure_connected()?;
        let name = CollectionName::new(collection)?;
        let (explicit_id, data) = provider::payload_into_parts(payload)?;
        let id = explicit_id.unwrap_or_else(ItemId::generate);

        let mut collections = self.inner.collections.write();
        let items = collections.entry(name).or_default();
        if items.contains_key(&id) {
            return Err(ProviderError::DuplicateId {
                collection: collection.to_string(),
                id: id.into_string(),
            });
        }

        let item = Item::new(id.clone(), data);
        items.insert(id, item.clone());
        Ok(item)
    }

    fn read(&self, collection: &str, id: &str) -> ProviderResult<Option<Item>> {
        self.ensure_connected()?;
        let (name, id) = match (CollectionName::new(collection), ItemId::new(id)) {
            (Ok(name), Ok(id)) => (name, id),
            // a name that fails validation cannot exist, so it is absent
            _ => return Ok(None),
        };

        let collections = self.inner.collections.read();
        Ok(collections.get(&name).and_then(|items| items.get(&id)).cloned())
    }

    fn update(&self, collection: &str, id: &str, patch: Value) -> ProviderResult<Option<Item>> {
        self.ensure_connected()?;
        let patch = provider::patch_into_map(patch)?;
        let (name, id) = match (CollectionName::new(collection), ItemId::new(id)) {
            (Ok(name), Ok(id)) => (name, id),
            _ => return Ok(None),
        };

        let mut collections = self.inner.collections.write();
        let Some(item) = collections.get_mut(&name).and_then(|items| items.get_mut(&id)) else {
            return Ok(None);
        };

        item.merge(patch);
        Ok(Some(item.clone()))
    }

    fn delete(&self, collection: &str, id: &str) -> ProviderResult<bool> {
        self.ensure_connected()?;
        let (name, id) = match (CollectionName::new(collection), ItemId::new(id)) {
            (Ok(name), Ok(id)) => (name, id),
            _ => return Ok(false),
        };

        let mut collections = self.inner.collections.write();
        Ok(collections
            .get_mut(&name)
            .map(|items| items.remove(&id).is_some())
            .unwrap_or(false))
    }

    fn query(&self, collection: &str, options: &QueryOptions) -> ProviderResult<Vec<Item>> {
        self.ensure_connected()?;
        let Ok(name) = CollectionName::new(collection) else {
            return Ok(Vec::new());
        };

        let snapshot: Vec<Item> = {
            let collections = self.inner.collections.read();
            collections
                .get(&name)
                .map(|items| items.values().cloned().collect())
                .unwrap_or_default()
        };

        engine::apply(snapshot, options)
    }
}
