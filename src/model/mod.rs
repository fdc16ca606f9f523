//! Core data model shared by every backend.
//!
//! An [`Item`] is a schema-less record: a validated id plus an arbitrary
//! key/value payload, carried together with engine-assigned metadata
//! (version counter and RFC-3339 timestamps). A [`CollectionName`] identifies
//! the named bag an item belongs to; backends map each collection 1:1 to a
//! storage unit (a file, a table, a key prefix).

mod item;
mod names;

pub use item::Item;
pub use names::{CollectionName, InvalidNameError, ItemId};
