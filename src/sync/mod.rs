//! Git-sync replication layer.
//!
//! Wraps any base provider and replicates its on-disk state through a git
//! working tree. All CRUD and query calls pass straight through to the base
//! provider; the value of this layer is the synchronization cycle:
//!
//! ```text
//!  flush base ─▶ commit local ─▶ fetch ─▶ merge ─▶ reload base ─▶ push
//! ```
//!
//! A background worker repeats the cycle on a timer (`autoSync`); callers can
//! also run one synchronously via [`GitSyncProvider::sync`]. Merge conflicts
//! resolve per the configured [`ConflictStrategy`]; with `merge-by-timestamp`
//! the resolution happens at the record level using the engine-assigned
//! `_updated_at` metadata, so two replicas converge on the newer edit no
//! matter which side merges first.

mod merge;
mod options;
mod provider;
mod repo;
mod worker;

pub use options::{CommitAuthor, ConflictStrategy, SyncOptions};
pub use provider::{GitSyncProvider, SyncReport};
pub use repo::MergeOutcome;
