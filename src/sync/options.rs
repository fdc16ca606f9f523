//! Sync configuration value types.
//!
//! Read once at provider construction; the sync loop never re-reads
//! configuration, so these are immutable for the provider's lifetime.

use serde::{Deserialize, Serialize};

/// Author identity for generated commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    /// create a new author identity
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// convert to a git2 signature stamped with the current time
    pub(crate) fn to_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self::new("polystore", "polystore@localhost")
    }
}

/// Policy for resolving divergent concurrent edits during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// keep local file contents, discard incoming changes
    PreferLocal,
    /// accept incoming changes, discard local edits
    PreferRemote,
    /// merge JSON collections record by record, newest `_updated_at` wins
    MergeByTimestamp,
    /// leave conflict markers in place and fail the cycle
    Manual,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        // always applicable: every record carries engine-assigned timestamps
        Self::MergeByTimestamp
    }
}

/// Options for the git-sync layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    /// remote name to fetch from and push to
    pub remote: String,
    /// branch replicated between nodes
    pub branch: String,
    /// polling interval of the background loop, in milliseconds
    #[serde(rename = "interval")]
    pub interval_ms: u64,
    /// stage and commit local changes each cycle
    pub auto_commit: bool,
    /// run the background loop
    pub auto_sync: bool,
    /// author identity for generated commits
    pub author: CommitAuthor,
    /// conflict resolution policy
    pub conflict_strategy: ConflictStrategy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            interval_ms: 30_000,
            auto_commit: true,
            auto_sync: true,
            author: CommitAuthor::default(),
            conflict_strategy: ConflictStrategy::default(),
        }
    }
}
