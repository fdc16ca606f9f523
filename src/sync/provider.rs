//! The git-sync provider.
//!
//! Decorates a base provider with replication. The data path is untouched:
//! every CRUD/query call delegates to the base provider. The sync cycle runs
//! on a timer (and on demand via [`GitSyncProvider::sync`]):
//!
//! 1. flush the base provider so disk reflects memory;
//! 2. stage and commit local changes (`autoCommit`);
//! 3. fetch the remote and merge its branch, resolving conflicts per the
//!    configured strategy;
//! 4. reconnect the base provider when the merge changed files, so merged
//!    records become visible through its cache;
//! 5. push.
//!
//! The worker holds only the git repository lock — never the base
//! provider's locks — so CRUD calls and a running cycle interleave freely;
//! the base engine's atomic-replace writes keep the files git stages
//! consistent at every instant.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::Item;
use crate::provider::{Capabilities, Provider, ProviderError, ProviderResult};
use crate::query::QueryOptions;
use crate::sync::options::SyncOptions;
use crate::sync::repo::{MergeOutcome, SyncMessage, SyncRepository};
use crate::sync::worker::SyncWorker;

/// What one sync cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// a local-changes commit was created
    pub committed: bool,
    /// how remote changes were applied
    pub merged: MergeOutcome,
    /// the branch was pushed
    pub pushed: bool,
}

struct SyncShared {
    base: Box<dyn Provider>,
    repository_path: PathBuf,
    options: SyncOptions,
    repo: Mutex<Option<SyncRepository>>,
    connected: Mutex<bool>,
}

/// Replicating wrapper around any base provider.
pub struct GitSyncProvider {
    shared: Arc<SyncShared>,
    worker: Mutex<Option<SyncWorker>>,
}

impl GitSyncProvider {
    /// Create the wrapper. No I/O happens until `connect()`.
    pub fn new(
        base: Box<dyn Provider>,
        repository_path: impl Into<PathBuf>,
        options: SyncOptions,
    ) -> Self {
        Self {
            shared: Arc::new(SyncShared {
                base,
                repository_path: repository_path.into(),
                options,
                repo: Mutex::new(None),
                connected: Mutex::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Run one sync cycle synchronously, surfacing any error to the caller.
    /// The background loop runs the same cycle but logs failures and retries
    /// on the next tick instead.
    pub fn sync(&self) -> ProviderResult<SyncReport> {
        run_cycle(&self.shared)
    }

    /// The configured sync options.
    pub fn options(&self) -> &SyncOptions {
        &self.shared.options
    }
}

impl Provider for GitSyncProvider {
    fn connect(&self) -> ProviderResult<()> {
        let mut connected = self.shared.connected.lock();

        self.shared.base.connect()?;

        {
            let mut repo = self.shared.repo.lock();
            if repo.is_none() {
                let opened = SyncRepository::open_or_init(
                    &self.shared.repository_path,
                    &self.shared.options.branch,
                    &self.shared.options.author,
                )
                .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;
                *repo = Some(opened);
            }
        }

        if self.shared.options.auto_sync {
            let mut worker = self.worker.lock();
            if worker.is_none() {
                let interval = Duration::from_millis(self.shared.options.interval_ms);
                let shared = self.shared.clone();
                *worker = Some(SyncWorker::spawn(interval, move || {
                    if let Err(e) = run_cycle(&shared) {
                        warn!(error = %e, "sync cycle failed; retrying next interval");
                    }
                }));
            }
        }

        *connected = true;
        Ok(())
    }

    fn disconnect(&self) -> ProviderResult<()> {
        let mut connected = self.shared.connected.lock();
        if !*connected {
            return Ok(());
        }

        // join the worker first so no cycle is in flight past this point
        if let Some(worker) = self.worker.lock().take() {
            worker.stop();
        }

        if self.shared.options.auto_commit {
            // best-effort final flush of local changes
            if let Err(e) = run_cycle(&self.shared) {
                warn!(error = %e, "final sync cycle failed during disconnect");
            }
        }

        self.shared.base.disconnect()?;
        *self.shared.repo.lock() = None;
        *connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.shared.connected.lock() && self.shared.base.is_connected()
    }

    fn create(&self, collection: &str, payload: Value) -> ProviderResult<Item> {
        self.shared.base.create(collection, payload)
    }

    fn read(&self, collection: &str, id: &str) -> ProviderResult<Option<Item>> {
        self.shared.base.read(collection, id)
    }

    fn update(&self, collection: &str, id: &str, patch: Value) -> ProviderResult<Option<Item>> {
        self.shared.base.update(collection, id, patch)
    }

    fn delete(&self, collection: &str, id: &str) -> ProviderResult<bool> {
        self.shared.base.delete(collection, id)
    }

    fn query(&self, collection: &str, options: &QueryOptions) -> ProviderResult<Vec<Item>> {
        self.shared.base.query(collection, options)
    }

    fn flush(&self) -> ProviderResult<()> {
        self.shared.base.flush()
    }

    fn capabilities(&self) -> Capabilities {
        self.shared.base.capabilities()
    }

    fn begin_transaction(&self) -> ProviderResult<()> {
        self.shared.base.begin_transaction()
    }

    fn commit_transaction(&self) -> ProviderResult<()> {
        self.shared.base.commit_transaction()
    }

    fn rollback_transaction(&self) -> ProviderResult<()> {
        self.shared.base.rollback_transaction()
    }

    fn ensure_index(&self, collection: &str, field: &str) -> ProviderResult<()> {
        self.shared.base.ensure_index(collection, field)
    }

    fn ensure_schema(&self, collection: &str, schema: &Value) -> ProviderResult<()> {
        self.shared.base.ensure_schema(collection, schema)
    }
}

fn run_cycle(shared: &SyncShared) -> ProviderResult<SyncReport> {
    // one cycle at a time: the timer and manual sync() serialize here
    let mut repo_guard = shared.repo.lock();
    let Some(repo) = repo_guard.as_mut() else {
        return Err(ProviderError::NotConnected);
    };

    // disk must reflect memory before staging
    shared.base.flush()?;

    let mut committed = false;
    if shared.options.auto_commit {
        committed = repo.commit_all(&SyncMessage::auto_commit())?.is_some();
    }

    let mut merged = MergeOutcome::UpToDate;
    let mut pushed = false;

    if repo.has_remote(&shared.options.remote) {
        if let Some(remote_head) = repo.fetch(&shared.options.remote)? {
            let outcome = repo.merge_remote(
                &shared.options.remote,
                remote_head,
                shared.options.conflict_strategy,
            )?;
            if outcome.changed_files() {
                // idempotent reconnect reloads the base caches from the
                // merged files
                shared.base.connect()?;
            }
            merged = outcome;
        }

        repo.push(&shared.options.remote)?;
        pushed = true;
    } else {
        debug!(
            remote = %shared.options.remote,
            "remote not configured; commit-only sync cycle"
        );
    }

    Ok(SyncReport {
        committed,
        merged,
        pushed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ErrorKind;
    use crate::query::QueryOptions;
    use crate::store::{JsonFileConfig, JsonFileProvider};
    use crate::sync::options::ConflictStrategy;
    use serde_json::json;
    use tempfile::TempDir;

    fn bare_remote() -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        git2::Repository::init_bare(dir.path()).unwrap();
        let url = dir.path().to_str().unwrap().to_string();
        (dir, url)
    }

    /// A replica: JSON-file base storing under `<repo>/data`, manual-only
    /// sync so tests drive every cycle deterministically.
    fn replica(remote_url: &str, strategy: ConflictStrategy) -> (TempDir, GitSyncProvider) {
        let dir = TempDir::new().unwrap();
        let base = JsonFileProvider::new(
            JsonFileConfig::new(dir.path().join("data")).write_debounce_ms(0),
        );
        let options = SyncOptions {
            interval_ms: 3_600_000,
            auto_sync: false,
            conflict_strategy: strategy,
            ..SyncOptions::default()
        };
        let provider = GitSyncProvider::new(Box::new(base), dir.path(), options);
        provider.connect().unwrap();

        git2::Repository::open(dir.path())
            .unwrap()
            .remote("origin", remote_url)
            .unwrap();

        (dir, provider)
    }

    fn head_count(path: &std::path::Path) -> usize {
        let repo = git2::Repository::open(path).unwrap();
        let mut walk = repo.revwalk().unwrap();
        walk.push_head().unwrap();
        walk.count()
    }

    #[test]
    fn test_crud_passes_through() {
        let dir = TempDir::new().unwrap();
        let base = JsonFileProvider::new(
            JsonFileConfig::new(dir.path().join("data")).write_debounce_ms(0),
        );
        let options = SyncOptions {
            auto_sync: false,
            ..SyncOptions::default()
        };
        let provider = GitSyncProvider::new(Box::new(base), dir.path(), options);
        provider.connect().unwrap();

        let created = provider.create("tools", json!({"id": "t1", "name": "Drill"})).unwrap();
        assert_eq!(provider.read("tools", "t1").unwrap().unwrap(), created);
        assert_eq!(provider.query("tools", &QueryOptions::new()).unwrap().len(), 1);
        assert!(provider.delete("tools", "t1").unwrap());

        provider.disconnect().unwrap();
    }

    #[test]
    fn test_commit_only_cycle_without_remote() {
        let dir = TempDir::new().unwrap();
        let base = JsonFileProvider::new(
            JsonFileConfig::new(dir.path().join("data")).write_debounce_ms(0),
        );
        let options = SyncOptions {
            auto_sync: false,
            ..SyncOptions::default()
        };
        let provider = GitSyncProvider::new(Box::new(base), dir.path(), options);
        provider.connect().unwrap();

        provider.create("tools", json!({"id": "t1"})).unwrap();
        let report = provider.sync().unwrap();

        assert!(report.committed);
        assert!(!report.pushed);
        provider.disconnect().unwrap();
    }

    #[test]
    fn test_auto_commit_and_push() {
        let (_remote_dir, url) = bare_remote();
        let (dir, provider) = replica(&url, ConflictStrategy::MergeByTimestamp);

        provider.create("tools", json!({"id": "t1", "name": "Drill"})).unwrap();
        let report = provider.sync().unwrap();
        assert!(report.committed);
        assert!(report.pushed);

        // the data file is tracked, the temp artifacts are not
        let repo = git2::Repository::open(dir.path()).unwrap();
        let head_tree = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(head_tree.get_path(std::path::Path::new("data/tools.json")).is_ok());

        let remote_repo = git2::Repository::open(&url).unwrap();
        assert!(remote_repo.find_reference("refs/heads/main").is_ok());

        provider.disconnect().unwrap();
    }

    #[test]
    fn test_replicates_between_nodes() {
        let (_remote_dir, url) = bare_remote();
        let (_dir_a, node_a) = replica(&url, ConflictStrategy::MergeByTimestamp);
        let (_dir_b, node_b) = replica(&url, ConflictStrategy::MergeByTimestamp);

        node_a.create("tools", json!({"id": "t1", "name": "Drill"})).unwrap();
        node_a.sync().unwrap();

        node_b.sync().unwrap();
        let replicated = node_b.read("tools", "t1").unwrap().unwrap();
        assert_eq!(replicated.get("name"), Some(&json!("Drill")));

        node_a.disconnect().unwrap();
        node_b.disconnect().unwrap();
    }

    /// Seed both replicas with the same record, then edit it divergently.
    /// Returns after A has pushed its (older) edit and B holds its (newer)
    /// uncommitted edit.
    fn diverge(
        node_a: &GitSyncProvider,
        node_b: &GitSyncProvider,
    ) {
        node_a.create("tools", json!({"id": "t1", "name": "Drill"})).unwrap();
        node_a.sync().unwrap();
        node_b.sync().unwrap();

        node_a.update("tools", "t1", json!({"name": "A-edit"})).unwrap().unwrap();
        node_a.sync().unwrap();

        // B's edit is strictly newer than A's
        std::thread::sleep(std::time::Duration::from_millis(30));
        node_b.update("tools", "t1", json!({"name": "B-edit"})).unwrap().unwrap();
    }

    #[test]
    fn test_merge_by_timestamp_newer_edit_wins() {
        let (_remote_dir, url) = bare_remote();
        let (_dir_a, node_a) = replica(&url, ConflictStrategy::MergeByTimestamp);
        let (_dir_b, node_b) = replica(&url, ConflictStrategy::MergeByTimestamp);

        diverge(&node_a, &node_b);

        let report = node_b.sync().unwrap();
        assert!(matches!(report.merged, MergeOutcome::Merged { resolved_conflicts: 1 }));
        assert_eq!(
            node_b.read("tools", "t1").unwrap().unwrap().get("name"),
            Some(&json!("B-edit"))
        );

        // A converges to the same winner
        node_a.sync().unwrap();
        assert_eq!(
            node_a.read("tools", "t1").unwrap().unwrap().get("name"),
            Some(&json!("B-edit"))
        );

        node_a.disconnect().unwrap();
        node_b.disconnect().unwrap();
    }

    #[test]
    fn test_prefer_remote_discards_local_edit() {
        let (_remote_dir, url) = bare_remote();
        let (_dir_a, node_a) = replica(&url, ConflictStrategy::PreferRemote);
        let (_dir_b, node_b) = replica(&url, ConflictStrategy::PreferRemote);

        diverge(&node_a, &node_b);

        node_b.sync().unwrap();
        // B's newer edit loses: the incoming (remote) side wins wholesale
        assert_eq!(
            node_b.read("tools", "t1").unwrap().unwrap().get("name"),
            Some(&json!("A-edit"))
        );

        node_a.disconnect().unwrap();
        node_b.disconnect().unwrap();
    }

    #[test]
    fn test_prefer_local_keeps_local_edit() {
        let (_remote_dir, url) = bare_remote();
        let (_dir_a, node_a) = replica(&url, ConflictStrategy::PreferLocal);
        let (_dir_b, node_b) = replica(&url, ConflictStrategy::PreferLocal);

        diverge(&node_a, &node_b);

        node_b.sync().unwrap();
        assert_eq!(
            node_b.read("tools", "t1").unwrap().unwrap().get("name"),
            Some(&json!("B-edit"))
        );

        node_a.disconnect().unwrap();
        node_b.disconnect().unwrap();
    }

    #[test]
    fn test_manual_strategy_surfaces_conflict() {
        let (_remote_dir, url) = bare_remote();
        let (_dir_a, node_a) = replica(&url, ConflictStrategy::Manual);
        let (_dir_b, node_b) = replica(&url, ConflictStrategy::Manual);

        diverge(&node_a, &node_b);

        let err = node_b.sync().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transaction);
        assert!(err.to_string().contains("tools.json"));

        node_a.disconnect().unwrap();
    }

    #[test]
    fn test_background_loop_commits() {
        let (_remote_dir, url) = bare_remote();

        let dir = TempDir::new().unwrap();
        let base = JsonFileProvider::new(
            JsonFileConfig::new(dir.path().join("data")).write_debounce_ms(0),
        );
        let options = SyncOptions {
            interval_ms: 50,
            auto_sync: true,
            ..SyncOptions::default()
        };
        let provider = GitSyncProvider::new(Box::new(base), dir.path(), options);
        provider.connect().unwrap();
        git2::Repository::open(dir.path())
            .unwrap()
            .remote("origin", &url)
            .unwrap();

        let before = head_count(dir.path());
        provider.create("tools", json!({"id": "t1"})).unwrap();

        // give the loop a few intervals
        std::thread::sleep(std::time::Duration::from_millis(400));

        assert!(head_count(dir.path()) > before);
        provider.disconnect().unwrap();
    }

    #[test]
    fn test_disconnect_runs_final_flush() {
        let (_remote_dir, url) = bare_remote();
        let (dir, provider) = replica(&url, ConflictStrategy::MergeByTimestamp);

        provider.create("tools", json!({"id": "t1"})).unwrap();
        let before = head_count(dir.path());
        provider.disconnect().unwrap();

        // the final best-effort cycle committed the pending change
        assert!(head_count(dir.path()) > before);
        assert!(!provider.is_connected());
    }

    #[test]
    fn test_sync_while_disconnected_errors() {
        let (_remote_dir, url) = bare_remote();
        let (_dir, provider) = replica(&url, ConflictStrategy::MergeByTimestamp);
        provider.disconnect().unwrap();

        assert!(matches!(provider.sync(), Err(ProviderError::NotConnected)));
    }
}
