//! [`GixRepo`]: the gitoxide-backed implementation of [`GitRepo`].
//!
//! This struct itself does almost no work — it owns the opened repository
//! and delegates every trait method to a free function in the matching
//! `*_impl` module, keeping each concern (refs, objects, diff, worktrees,
//! checkout, status, merge, tags) in its own file.

use crate::error::GitError;
use crate::repo::GitRepo;
use crate::types::{
    CommitInfo, ConflictEntry, DiffEntry, GitOid, MergeOutcome, MergeStrategy, RefEdit, RefName,
    StatusEntry, TagInfo, TreeEdit, TreeEntry, WorktreeInfo,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{checkout_impl, diff_impl, merge_impl, objects_impl, refs_impl, status_impl, tag_impl, worktree_impl};

/// A [`GitRepo`] implementation backed by `gix`.
pub struct GixRepo {
    pub(crate) repo: Mutex<gix::Repository>,
    pub(crate) root: PathBuf,
}

impl GixRepo {
    /// Open an existing repository at `path`.
    ///
    /// # Errors
    /// Returns [`GitError::OpenFailed`] if `path` is not a git repository.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = gix::open(path).map_err(|e| GitError::OpenFailed {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        Ok(Self {
            root: path.to_path_buf(),
            repo: Mutex::new(repo),
        })
    }

    /// Initialize a new, empty repository at `path`.
    ///
    /// # Errors
    /// Returns [`GitError::OpenFailed`] if initialization fails.
    pub fn init(path: &Path) -> Result<Self, GitError> {
        let repo = gix::init(path).map_err(|e| GitError::OpenFailed {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        Ok(Self {
            root: path.to_path_buf(),
            repo: Mutex::new(repo),
        })
    }
}

impl GitRepo for GixRepo {
    fn resolve_ref(&self, name: &RefName) -> Result<GitOid, GitError> {
        refs_impl::resolve_ref(&self.repo, name)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError> {
        refs_impl::list_refs(&self.repo, prefix)
    }

    fn update_refs(&self, edits: &[RefEdit]) -> Result<(), GitError> {
        refs_impl::update_refs(&self.repo, edits)
    }

    fn delete_ref(&self, name: &RefName, expected_oid: GitOid) -> Result<(), GitError> {
        refs_impl::delete_ref(&self.repo, name, expected_oid)
    }

    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        objects_impl::read_blob(&self.repo, oid)
    }

    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError> {
        objects_impl::write_blob(&self.repo, data)
    }

    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
        objects_impl::read_tree(&self.repo, oid)
    }

    fn edit_tree(&self, base: GitOid, edits: &[TreeEdit]) -> Result<GitOid, GitError> {
        objects_impl::edit_tree(&self.repo, base, edits)
    }

    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError> {
        objects_impl::read_commit(&self.repo, oid)
    }

    fn write_commit(&self, info: &CommitInfo) -> Result<GitOid, GitError> {
        objects_impl::write_commit(&self.repo, info)
    }

    fn commit_range(&self, from: GitOid, excluding: GitOid) -> Result<Vec<GitOid>, GitError> {
        objects_impl::commit_range(&self.repo, from, excluding)
    }

    fn diff_trees(&self, old: GitOid, new: GitOid) -> Result<Vec<DiffEntry>, GitError> {
        diff_impl::diff_trees(&self.repo, old, new)
    }

    fn merge_trees(
        &self,
        base: GitOid,
        ours: GitOid,
        theirs: GitOid,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome, GitError> {
        merge_impl::merge_trees(&self.repo, base, ours, theirs, strategy)
    }

    fn detect_conflicts(
        &self,
        base: GitOid,
        ours: GitOid,
        theirs: GitOid,
    ) -> Result<Vec<ConflictEntry>, GitError> {
        merge_impl::detect_conflicts(&self.repo, base, ours, theirs)
    }

    fn create_tag(&self, name: &str, target: GitOid) -> Result<TagInfo, GitError> {
        tag_impl::create_tag(&self.repo, name, target)
    }

    fn list_tags(&self) -> Result<Vec<TagInfo>, GitError> {
        tag_impl::list_tags(&self.repo)
    }

    fn add_worktree(
        &self,
        path: &Path,
        branch_ref: &RefName,
        oid: GitOid,
    ) -> Result<WorktreeInfo, GitError> {
        worktree_impl::add_worktree(&self.repo, &self.root, path, branch_ref, oid)
    }

    fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError> {
        worktree_impl::remove_worktree(&self.repo, path, force)
    }

    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, GitError> {
        worktree_impl::list_worktrees(&self.repo)
    }

    fn checkout(&self, path: &Path, oid: GitOid) -> Result<(), GitError> {
        checkout_impl::checkout(&self.repo, path, oid)
    }

    fn status(&self, path: &Path) -> Result<Vec<StatusEntry>, GitError> {
        status_impl::status(&self.repo, path)
    }

    fn unstage_all(&self, path: &Path) -> Result<(), GitError> {
        checkout_impl::unstage_all(&self.repo, path)
    }
}
