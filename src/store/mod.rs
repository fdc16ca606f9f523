//! JSON-file persistence engine.
//!
//! An in-memory collection cache backed by plain JSON files, one per
//! collection (or one `database.json` for everything in single-file mode).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    JsonFileProvider                         │
//! │        (CRUD + query over the in-memory caches)             │
//! └─────────────────────────────────────────────────────────────┘
//!                │                             │
//!                ▼                             ▼
//!        ┌───────────────┐             ┌───────────────┐
//!        │    flusher    │             │    layout     │
//!        │ (debounce +   │────────────▶│ (atomic file  │
//!        │  coalescing)  │             │  replace)     │
//!        └───────────────┘             └───────────────┘
//! ```
//!
//! Mutations land in memory synchronously and mark their collection dirty;
//! the flusher coalesces a burst of mutations into one write-replace per
//! collection per debounce window. Every write goes to `<name>.json.tmp`
//! first and is renamed over the target, so a crash mid-write leaves the
//! previous complete file intact.

mod flusher;
pub(crate) mod layout;
mod provider;

pub use provider::{JsonFileConfig, JsonFileProvider, StoreStats};
