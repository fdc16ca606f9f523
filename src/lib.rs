//! Polystore - a pluggable document store
//!
//! One CRUD/query contract, interchangeable storage backends. The JSON-file
//! backend is a crash-safe persistence engine (atomic write-replace,
//! debounced flushing); the git-sync backend wraps any other backend and
//! replicates its files through a git working tree with configurable
//! conflict resolution.
//!
//! # Example
//!
//! ```no_run
//! use polystore::{DatabaseService, ProviderConfig};
//! use serde_json::json;
//!
//! let config: ProviderConfig = serde_json::from_value(json!({
//!     "type": "json-file",
//!     "directoryPath": "./data"
//! }))?;
//!
//! let service = DatabaseService::new(config);
//! let db = service.provider()?;
//!
//! let item = db.create("tools", json!({"name": "Drill"}))?;
//! let found = db.read("tools", item.id.as_str())?;
//! assert!(found.is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod factory;
pub mod model;
pub mod provider;
pub mod query;
pub mod service;
pub mod store;
pub mod sync;

// Re-export the public API
pub use config::{GitSyncConfig, MongodbConfig, ObjectStorageConfig, ProviderConfig, SqliteConfig};
pub use factory::ProviderFactory;
pub use model::{CollectionName, InvalidNameError, Item, ItemId};
pub use provider::{
    Capabilities, ErrorKind, MemoryProvider, Provider, ProviderError, ProviderResult,
};
pub use query::{Filter, FilterOp, QueryOptions, SortDirection, SortKey};
pub use service::DatabaseService;
pub use store::{JsonFileConfig, JsonFileProvider, StoreStats};
pub use sync::{
    CommitAuthor, ConflictStrategy, GitSyncProvider, MergeOutcome, SyncOptions, SyncReport,
};
