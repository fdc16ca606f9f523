//! Git plumbing for the sync layer.
//!
//! Wraps `git2` behind a small surface so the rest of the layer never
//! touches git primitives directly: open-or-init of the working tree,
//! stage-everything commits, fetch, merge with per-strategy conflict
//! resolution, and push. The working tree's tracked files are exactly the
//! base provider's persisted files; `*.json.tmp` artifacts are kept out via
//! a `.gitignore` written at init.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use git2::build::CheckoutBuilder;
use git2::{IndexAddOption, Repository, RepositoryState};
use tracing::warn;

use crate::provider::{ProviderError, ProviderResult};
use crate::sync::merge;
use crate::sync::options::{CommitAuthor, ConflictStrategy};

/// Outcome of applying remote changes during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// the local branch already contained every remote commit
    UpToDate,
    /// local branch fast-forwarded to the remote head
    FastForwarded,
    /// a real merge commit was created
    Merged {
        /// conflicted paths resolved by the configured strategy
        resolved_conflicts: usize,
    },
}

impl MergeOutcome {
    /// whether working-tree files may have changed
    pub fn changed_files(&self) -> bool {
        !matches!(self, Self::UpToDate)
    }
}

/// message formatting for generated commits
pub(crate) struct SyncMessage;

impl SyncMessage {
    pub fn initialize() -> String {
        "[sync] initialize repository".to_string()
    }

    pub fn auto_commit() -> String {
        format!("[sync] local changes at {}", Utc::now().to_rfc3339())
    }

    pub fn merge(remote: &str, branch: &str) -> String {
        format!("[sync] merge {}/{}", remote, branch)
    }
}

/// The git working tree owned by one git-sync provider.
pub(crate) struct SyncRepository {
    repo: Repository,
    branch: String,
    author: CommitAuthor,
}

impl SyncRepository {
    /// Open the repository at `path`, initializing it (with a first commit
    /// on the configured branch) when none exists yet.
    pub fn open_or_init(
        path: &Path,
        branch: &str,
        author: &CommitAuthor,
    ) -> ProviderResult<Self> {
        fs::create_dir_all(path).map_err(|e| ProviderError::io(path, e))?;

        let repo = if path.join(".git").exists() {
            Repository::open(path)?
        } else {
            Repository::init(path)?
        };

        // temp files from atomic writes must never be tracked
        let gitignore = path.join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, "*.json.tmp\n").map_err(|e| ProviderError::io(&gitignore, e))?;
        }

        let refname = format!("refs/heads/{}", branch);
        if repo.find_reference(&refname).is_ok() {
            repo.set_head(&refname)?;
        } else if let Ok(head) = repo.head().and_then(|h| h.peel_to_commit()) {
            // existing repo without our branch: branch off its current head
            repo.branch(branch, &head, false)?;
            repo.set_head(&refname)?;
        } else {
            // unborn: the first commit below creates the branch
            repo.set_head(&refname)?;
        }

        let mut sync = Self {
            repo,
            branch: branch.to_string(),
            author: author.clone(),
        };

        if sync.head_commit()?.is_none() {
            sync.commit_all(&SyncMessage::initialize())?;
        }

        Ok(sync)
    }

    /// Current head commit, `None` while the branch is unborn.
    pub fn head_commit(&self) -> ProviderResult<Option<git2::Oid>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id())),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// check whether the configured remote exists
    pub fn has_remote(&self, name: &str) -> bool {
        self.repo.find_remote(name).is_ok()
    }

    /// Stage every change in the working tree and commit it.
    ///
    /// Returns `None` when the tree is unchanged. While a merge is pending
    /// (manual strategy), a clean index commits the user's resolution as a
    /// merge commit; a still-conflicted index fails instead of committing
    /// conflict markers.
    pub fn commit_all(&mut self, message: &str) -> ProviderResult<Option<git2::Oid>> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;

        if index.has_conflicts() {
            return Err(ProviderError::MergeConflict {
                paths: conflicted_paths(&index)?,
            });
        }

        index.write()?;
        let tree_id = index.write_tree()?;

        let head = self.head_commit()?;
        let in_merge = self.repo.state() == RepositoryState::Merge;

        if let Some(head_oid) = head {
            let head_commit = self.repo.find_commit(head_oid)?;
            if head_commit.tree_id() == tree_id && !in_merge {
                return Ok(None);
            }
        }

        let mut parent_ids = Vec::new();
        if let Some(head_oid) = head {
            parent_ids.push(head_oid);
        }
        if in_merge {
            self.repo.mergehead_foreach(|oid| {
                parent_ids.push(*oid);
                true
            })?;
        }

        let parents: Vec<git2::Commit<'_>> = parent_ids
            .iter()
            .map(|id| self.repo.find_commit(*id))
            .collect::<Result<_, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.author.to_signature()?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?;

        if in_merge {
            self.repo.cleanup_state()?;
        }

        Ok(Some(oid))
    }

    /// Fetch the remote and resolve its copy of the configured branch.
    /// Returns `None` when the remote doesn't have the branch yet.
    pub fn fetch(&self, remote_name: &str) -> ProviderResult<Option<git2::Oid>> {
        let mut remote = self.repo.find_remote(remote_name)?;
        // empty refspec list = the remote's configured fetch refspecs
        remote.fetch(&[] as &[&str], None, None)?;

        let tracking = format!("refs/remotes/{}/{}", remote_name, self.branch);
        match self.repo.find_reference(&tracking) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?.id())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Bring remote commits into the local branch.
    ///
    /// Fast-forwards when possible. A real merge resolves conflicted paths
    /// per the strategy, except `manual`, which leaves the conflict markers
    /// in the working tree and fails the cycle.
    pub fn merge_remote(
        &self,
        remote_name: &str,
        remote_oid: git2::Oid,
        strategy: ConflictStrategy,
    ) -> ProviderResult<MergeOutcome> {
        let local_oid = self.head_commit()?.ok_or_else(|| {
            ProviderError::ConnectionFailed("repository has no commits".to_string())
        })?;
        let annotated = self.repo.find_annotated_commit(remote_oid)?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }

        if analysis.is_fast_forward() {
            let refname = format!("refs/heads/{}", self.branch);
            let mut reference = self.repo.find_reference(&refname)?;
            reference.set_target(remote_oid, "sync: fast-forward")?;
            self.repo.set_head(&refname)?;
            self.repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
            return Ok(MergeOutcome::FastForwarded);
        }

        self.repo.merge(
            &[&annotated],
            Some(&mut git2::MergeOptions::new()),
            Some(CheckoutBuilder::new().allow_conflicts(true)),
        )?;

        let mut index = self.repo.index()?;
        let mut resolved = 0;
        if index.has_conflicts() {
            if strategy == ConflictStrategy::Manual {
                // markers stay in the working tree for the user to resolve
                return Err(ProviderError::MergeConflict {
                    paths: conflicted_paths(&index)?,
                });
            }
            resolved = self.resolve_conflicts(&mut index, strategy)?;
            index.write()?;
        }

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let local = self.repo.find_commit(local_oid)?;
        let remote_commit = self.repo.find_commit(remote_oid)?;
        let sig = self.author.to_signature()?;

        self.repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &SyncMessage::merge(remote_name, &self.branch),
            &tree,
            &[&local, &remote_commit],
        )?;

        self.repo.cleanup_state()?;
        self.repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

        Ok(MergeOutcome::Merged {
            resolved_conflicts: resolved,
        })
    }

    /// Push the configured branch. A no-op when the remote is already
    /// current.
    pub fn push(&self, remote_name: &str) -> ProviderResult<()> {
        let mut remote = self.repo.find_remote(remote_name)?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", self.branch);
        remote.push(&[refspec.as_str()], None)?;
        Ok(())
    }

    fn resolve_conflicts(
        &self,
        index: &mut git2::Index,
        strategy: ConflictStrategy,
    ) -> ProviderResult<usize> {
        let conflicts: Vec<git2::IndexConflict> =
            index.conflicts()?.collect::<Result<_, _>>()?;

        let mut resolved = 0;
        for conflict in &conflicts {
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            let Some(entry) = entry else { continue };
            let path_bytes = entry.path.clone();
            let rel = PathBuf::from(String::from_utf8_lossy(&path_bytes).into_owned());

            let chosen: Option<Vec<u8>> = match strategy {
                ConflictStrategy::PreferLocal => self.blob_bytes(conflict.our.as_ref())?,
                ConflictStrategy::PreferRemote => self.blob_bytes(conflict.their.as_ref())?,
                ConflictStrategy::MergeByTimestamp => {
                    let ancestor = self.blob_bytes(conflict.ancestor.as_ref())?;
                    let ours = self.blob_bytes(conflict.our.as_ref())?;
                    let theirs = self.blob_bytes(conflict.their.as_ref())?;
                    match merge::merge_file(
                        ancestor.as_deref(),
                        ours.as_deref(),
                        theirs.as_deref(),
                        &rel,
                    ) {
                        Ok(bytes) => Some(bytes),
                        Err(e) => {
                            warn!(
                                path = %rel.display(),
                                error = %e,
                                "conflicted file is not a parseable collection; keeping local side"
                            );
                            ours
                        }
                    }
                }
                ConflictStrategy::Manual => unreachable!("manual conflicts fail before resolution"),
            };

            // clears every conflict stage for the path
            index.remove_path(&rel)?;
            if let Some(bytes) = chosen {
                index.add_frombuffer(&stage0_entry(path_bytes), &bytes)?;
            }
            resolved += 1;
        }

        Ok(resolved)
    }

    fn blob_bytes(&self, entry: Option<&git2::IndexEntry>) -> ProviderResult<Option<Vec<u8>>> {
        match entry {
            Some(entry) => Ok(Some(self.repo.find_blob(entry.id)?.content().to_vec())),
            None => Ok(None),
        }
    }
}

fn conflicted_paths(index: &git2::Index) -> ProviderResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        let entry = conflict
            .our
            .as_ref()
            .or(conflict.their.as_ref())
            .or(conflict.ancestor.as_ref());
        if let Some(entry) = entry {
            paths.push(PathBuf::from(
                String::from_utf8_lossy(&entry.path).into_owned(),
            ));
        }
    }
    Ok(paths)
}

fn stage0_entry(path: Vec<u8>) -> git2::IndexEntry {
    git2::IndexEntry {
        ctime: git2::IndexTime::new(0, 0),
        mtime: git2::IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: 0o100644,
        uid: 0,
        gid: 0,
        file_size: 0,
        id: git2::Oid::zero(),
        flags: 0,
        flags_extended: 0,
        path,
    }
}
