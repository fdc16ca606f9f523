//! Query model and the shared in-memory query engine.
//!
//! [`QueryOptions`] is a plain value type describing filters, sort keys, and
//! pagination; it carries no behavior and is consumed by every backend. The
//! engine in [`engine`] evaluates those options over an in-memory item
//! snapshot, for backends whose storage medium has no native query support.

pub mod engine;
mod options;

pub use options::{Filter, FilterOp, QueryOptions, SortDirection, SortKey};
