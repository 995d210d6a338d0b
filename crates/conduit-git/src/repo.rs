//! The [`GitRepo`] trait: the sole boundary between conduit's domain logic
//! and a concrete git backend.
//!
//! Every method is object-safe (no generics, no `impl Trait` in argument
//! position) so the engine can hold a `Box<dyn GitRepo>` and swap backends
//! (or a test double) without touching call sites.

use crate::error::GitError;
use crate::types::{
    CommitInfo, ConflictEntry, DiffEntry, GitOid, MergeOutcome, MergeStrategy, RefEdit, RefName,
    StatusEntry, TagInfo, TreeEdit, TreeEntry, WorktreeInfo,
};
use std::path::Path;

/// Abstraction over a git repository's object store, refs, working trees,
/// and index.
///
/// Implementations must be `Send + Sync` so the engine can share a handle
/// across the tokio runtime.
pub trait GitRepo: Send + Sync {
    // -- refs ---------------------------------------------------------

    /// Resolve a ref to the OID it currently points at.
    ///
    /// # Errors
    /// Returns [`GitError::RefNotFound`] if the ref does not exist.
    fn resolve_ref(&self, name: &RefName) -> Result<GitOid, GitError>;

    /// List all refs under a given namespace prefix (e.g. `"refs/heads/"`).
    ///
    /// # Errors
    /// Returns [`GitError::Backend`] on a backend failure.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError>;

    /// Apply a batch of ref edits as a single atomic transaction.
    ///
    /// Each edit's `expected_old_oid` is checked against the ref's current
    /// value before any edit is applied; if any check fails, none of the
    /// edits take effect.
    ///
    /// # Errors
    /// Returns [`GitError::CasMismatch`] or [`GitError::RefConflict`] if any
    /// edit's precondition does not hold.
    fn update_refs(&self, edits: &[RefEdit]) -> Result<(), GitError>;

    /// Delete a ref if it currently points at `expected_oid`.
    ///
    /// # Errors
    /// Returns [`GitError::CasMismatch`] if the ref has moved.
    fn delete_ref(&self, name: &RefName, expected_oid: GitOid) -> Result<(), GitError>;

    // -- objects --------------------------------------------------------

    /// Read the full contents of a blob.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if the blob does not exist.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Write a blob and return its OID.
    ///
    /// # Errors
    /// Returns [`GitError::Backend`] on a write failure.
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError>;

    /// Read the entries of a tree object.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if the tree does not exist.
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError>;

    /// Apply a set of edits to a tree, returning the OID of the resulting
    /// tree. Missing intermediate subtrees are created as needed.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if `base` does not exist, or
    /// [`GitError::Backend`] on a write failure.
    fn edit_tree(&self, base: GitOid, edits: &[TreeEdit]) -> Result<GitOid, GitError>;

    /// Read a commit object.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if the commit does not exist.
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    /// Create a new commit object and return its OID. Does not move any ref.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if `tree` or any parent is
    /// missing, or [`GitError::Backend`] on a write failure.
    fn write_commit(&self, info: &CommitInfo) -> Result<GitOid, GitError>;

    /// List commits reachable from `from` and not reachable from `excluding`
    /// (i.e. `git log excluding..from`), oldest-first.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if either endpoint is missing.
    fn commit_range(&self, from: GitOid, excluding: GitOid) -> Result<Vec<GitOid>, GitError>;

    // -- diff -------------------------------------------------------------

    /// Compute the file-level diff between two trees.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if either tree is missing.
    fn diff_trees(&self, old: GitOid, new: GitOid) -> Result<Vec<DiffEntry>, GitError>;

    // -- merge --------------------------------------------------------------

    /// Three-way-merge `ours` and `theirs` against `base`, resolving
    /// conflicts per `strategy` where possible.
    ///
    /// With [`MergeStrategy::Strict`], any conflicted path is reported in
    /// the outcome's `conflicts` and `tree` is `None`. With
    /// `FavorOurs`/`FavorTheirs`, conflicted paths are resolved by taking
    /// the named side and `tree` is always `Some`.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if any of the three trees is
    /// missing.
    fn merge_trees(
        &self,
        base: GitOid,
        ours: GitOid,
        theirs: GitOid,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome, GitError>;

    /// Detect conflicts between two trees relative to a common base without
    /// materializing a merged tree. Used to preview whether a merge would
    /// be clean.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if any of the three trees is
    /// missing.
    fn detect_conflicts(
        &self,
        base: GitOid,
        ours: GitOid,
        theirs: GitOid,
    ) -> Result<Vec<ConflictEntry>, GitError>;

    // -- tags -----------------------------------------------------------

    /// Create (or overwrite) a lightweight tag pointing at `target`.
    ///
    /// # Errors
    /// Returns [`GitError::ObjectNotFound`] if `target` does not exist.
    fn create_tag(&self, name: &str, target: GitOid) -> Result<TagInfo, GitError>;

    /// List tags under `refs/tags/`.
    ///
    /// # Errors
    /// Returns [`GitError::Backend`] on a backend failure.
    fn list_tags(&self) -> Result<Vec<TagInfo>, GitError>;

    // -- worktrees --------------------------------------------------------

    /// Create a new linked worktree at `path` checked out to `oid`, on a
    /// new or existing branch `branch_ref`.
    ///
    /// # Errors
    /// Returns [`GitError::WorktreeFailed`] if the worktree already exists
    /// at that path or the checkout fails.
    fn add_worktree(
        &self,
        path: &Path,
        branch_ref: &RefName,
        oid: GitOid,
    ) -> Result<WorktreeInfo, GitError>;

    /// Remove a linked worktree. `force` removes it even with uncommitted
    /// changes.
    ///
    /// # Errors
    /// Returns [`GitError::WorktreeFailed`] if removal fails.
    fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError>;

    /// List all worktrees known to the repository (including the main one).
    ///
    /// # Errors
    /// Returns [`GitError::Backend`] on a backend failure.
    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, GitError>;

    /// Check out `oid` into the working directory at `path`, replacing its
    /// current contents (tracked files not present in `oid` are removed).
    ///
    /// # Errors
    /// Returns [`GitError::CheckoutFailed`] on failure.
    fn checkout(&self, path: &Path, oid: GitOid) -> Result<(), GitError>;

    // -- status / index ---------------------------------------------------

    /// Compute working-tree status for `path` relative to its current HEAD.
    ///
    /// # Errors
    /// Returns [`GitError::Backend`] on a backend failure.
    fn status(&self, path: &Path) -> Result<Vec<StatusEntry>, GitError>;

    /// Reset the index at `path` to match HEAD's tree, discarding any
    /// staged changes (but not working-tree edits).
    ///
    /// # Errors
    /// Returns [`GitError::Backend`] on a backend failure.
    fn unstage_all(&self, path: &Path) -> Result<(), GitError>;
}
