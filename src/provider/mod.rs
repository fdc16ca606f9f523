//! The provider contract every backend satisfies.
//!
//! A [`Provider`] exposes uniform CRUD/query semantics over wildly different
//! storage media. The read path is deliberately non-raising: `read` and
//! `update` return `None` for an absent id, `delete` returns `false`, and
//! `query` on an unknown collection returns an empty vector. Only genuine
//! I/O, constraint, and connection failures produce errors.
//!
//! All methods take `&self`; backends use interior mutability so a single
//! provider handle can be shared across threads (the same discipline as a
//! shared repository handle wrapping its inner state in `Arc`).
//!
//! Optional contract members (transactions, index and schema management)
//! default to [`ProviderError::Unsupported`]; [`Provider::capabilities`]
//! advertises what a backend actually implements, so callers branch on
//! explicit flags instead of probing for failures.

pub mod error;
mod memory;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::{Item, ItemId};
use crate::query::QueryOptions;

pub use error::{ErrorKind, ProviderError, ProviderResult};
pub use memory::MemoryProvider;

/// Optional-feature flags advertised by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// begin/commit/rollback are functional
    pub transactions: bool,
    /// ensure_index is functional
    pub indexes: bool,
    /// ensure_schema is functional
    pub schemas: bool,
}

/// The storage backend contract.
pub trait Provider: Send + Sync {
    /// Establish or re-establish the backend connection. Idempotent; a
    /// reconnect on an already-connected provider flushes pending state and
    /// reloads from the storage medium.
    fn connect(&self) -> ProviderResult<()>;

    /// Release resources, flushing pending state first. Idempotent; safe to
    /// call when already disconnected.
    fn disconnect(&self) -> ProviderResult<()>;

    /// Pure status check, no I/O.
    fn is_connected(&self) -> bool;

    /// Store a new item. The payload must be a JSON object; an `id` field is
    /// honored if present (and validated), otherwise a ULID is generated.
    /// Returns the stored item including backend-assigned metadata.
    fn create(&self, collection: &str, payload: Value) -> ProviderResult<Item>;

    /// Fetch an item by id. Absence is `None`, never an error.
    fn read(&self, collection: &str, id: &str) -> ProviderResult<Option<Item>>;

    /// Shallow-merge a patch into an existing item. Returns the merged item,
    /// or `None` if the id is absent. `id` keys inside the patch are ignored.
    fn update(&self, collection: &str, id: &str, patch: Value) -> ProviderResult<Option<Item>>;

    /// Remove an item. Returns `true` if something was removed; deleting an
    /// absent id returns `false` and is not an error.
    fn delete(&self, collection: &str, id: &str) -> ProviderResult<bool>;

    /// Evaluate a query against one collection. Unknown collections yield an
    /// empty vector.
    fn query(&self, collection: &str, options: &QueryOptions) -> ProviderResult<Vec<Item>>;

    /// Explicit durability point: wait until pending writes reach the
    /// storage medium. Default is a no-op for backends that write through.
    fn flush(&self) -> ProviderResult<()> {
        Ok(())
    }

    /// Advertise which optional contract members this backend implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn begin_transaction(&self) -> ProviderResult<()> {
        Err(ProviderError::Unsupported("begin_transaction"))
    }

    fn commit_transaction(&self) -> ProviderResult<()> {
        Err(ProviderError::Unsupported("commit_transaction"))
    }

    fn rollback_transaction(&self) -> ProviderResult<()> {
        Err(ProviderError::Unsupported("rollback_transaction"))
    }

    fn ensure_index(&self, _collection: &str, _field: &str) -> ProviderResult<()> {
        Err(ProviderError::Unsupported("ensure_index"))
    }

    fn ensure_schema(&self, _collection: &str, _schema: &Value) -> ProviderResult<()> {
        Err(ProviderError::Unsupported("ensure_schema"))
    }
}

/// Split a create payload into an optional explicit id and the data map.
pub(crate) fn payload_into_parts(
    payload: Value,
) -> ProviderResult<(Option<ItemId>, BTreeMap<String, Value>)> {
    let map = match payload {
        Value::Object(map) => map,
        other => {
            return Err(ProviderError::InvalidPayload(format!(
                "item payload must be a JSON object, got {}",
                json_type_name(&other)
            )))
        }
    };

    let mut data: BTreeMap<String, Value> = map.into_iter().collect();
    let id = match data.remove("id") {
        Some(Value::String(s)) => Some(ItemId::new(s)?),
        Some(other) => {
            return Err(ProviderError::InvalidPayload(format!(
                "'id' must be a string, got {}",
                json_type_name(&other)
            )))
        }
        None => None,
    };

    Ok((id, data))
}

/// Interpret an update patch as a field map.
pub(crate) fn patch_into_map(patch: Value) -> ProviderResult<BTreeMap<String, Value>> {
    match patch {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(ProviderError::InvalidPayload(format!(
            "update patch must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_split() {
        let (id, data) = payload_into_parts(json!({"id": "t1", "name": "Drill"})).unwrap();
        assert_eq!(id.unwrap().as_str(), "t1");
        assert_eq!(data.get("name"), Some(&json!("Drill")));
        assert!(!data.contains_key("id"));
    }

    #[test]
    fn test_payload_without_id() {
        let (id, data) = payload_into_parts(json!({"name": "Drill"})).unwrap();
        assert!(id.is_none());
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_payload_must_be_object() {
        assert!(matches!(
            payload_into_parts(json!([1, 2])),
            Err(ProviderError::InvalidPayload(_))
        ));
        assert!(matches!(
            patch_into_map(json!("nope")),
            Err(ProviderError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_payload_rejects_non_string_id() {
        assert!(matches!(
            payload_into_parts(json!({"id": 42})),
            Err(ProviderError::InvalidPayload(_))
        ));
    }
}
