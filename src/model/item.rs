//! The item record and its on-disk JSON format.
//!
//! Each item is stored as a JSON object with underscore-prefixed metadata
//! fields alongside the user payload:
//!
//! ```json
//! {
//!   "_id": "01arz3ndektsv4rrffq69g5fav",
//!   "_version": 2,
//!   "_created_at": "2026-01-05T10:00:00+00:00",
//!   "_updated_at": "2026-01-05T10:03:12+00:00",
//!   "name": "Drill",
//!   "price": 99
//! }
//! ```
//!
//! The `_` prefix keeps metadata from colliding with user fields. Timestamps
//! and the version counter are assigned by the engine on every write; callers
//! cannot supply them. That makes the `_updated_at` ordering used by the
//! git-sync merge policy immune to caller clock skew.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ItemId;

/// A stored record: id, payload, and engine-assigned metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// unique id within the collection (immutable after create)
    #[serde(rename = "_id")]
    pub id: ItemId,
    /// version number, bumped on every update
    #[serde(rename = "_version")]
    pub version: u64,
    /// creation timestamp (RFC-3339)
    #[serde(rename = "_created_at")]
    pub created_at: String,
    /// last update timestamp (RFC-3339)
    #[serde(rename = "_updated_at")]
    pub updated_at: String,
    /// user payload (everything that isn't metadata)
    #[serde(flatten)]
    pub data: BTreeMap<String, Value>,
}

impl Item {
    /// Payload keys the engine owns; stripped from user payloads so they
    /// cannot collide with the flattened metadata fields.
    pub const RESERVED_KEYS: [&'static str; 4] =
        ["_id", "_version", "_created_at", "_updated_at"];

    /// Create a new item with version 1 and current timestamps.
    pub fn new(id: ItemId, mut data: BTreeMap<String, Value>) -> Self {
        for key in Self::RESERVED_KEYS {
            data.remove(key);
        }
        let now = Utc::now().to_rfc3339();
        Self {
            id,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
            data,
        }
    }

    /// Shallow-merge a patch into the payload.
    ///
    /// Explicit field union: each patch field replaces the existing field
    /// wholesale (no deep merge). `id` keys are skipped since an item's id is
    /// immutable, and reserved metadata keys stay engine-owned. Bumps the
    /// version and refreshes `_updated_at`.
    pub fn merge(&mut self, patch: BTreeMap<String, Value>) {
        for (k, v) in patch {
            if k == "id" || Self::RESERVED_KEYS.contains(&k.as_str()) {
                continue;
            }
            self.data.insert(k, v);
        }
        self.version += 1;
        self.updated_at = Utc::now().to_rfc3339();
    }

    /// get a payload field by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// parse `_updated_at` as a UTC instant (None if the stored string is
    /// not valid RFC-3339)
    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Render as a plain JSON object with the id exposed under `id`.
    ///
    /// This is the caller-facing shape; the underscore-metadata shape is an
    /// on-disk concern.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), Value::String(self.id.to_string()));
        for (k, v) in &self.data {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}
