//! Git abstraction layer for conduit.
//!
//! Exposes [`GitRepo`], an object-safe trait covering refs, objects, diffs,
//! merges, tags, worktrees, and status, plus [`GixRepo`], the only
//! implementation: a thin wrapper around `gix`.

mod checkout_impl;
mod diff_impl;
pub mod error;
mod gix_repo;
mod merge_impl;
mod objects_impl;
mod refs_impl;
mod repo;
mod status_impl;
mod tag_impl;
pub mod types;
mod worktree_impl;

pub use error::GitError;
pub use gix_repo::GixRepo;
pub use repo::GitRepo;
pub use types::{
    ChangeType, CommitInfo, ConflictEntry, DiffEntry, DiffStats, EntryMode, FileStatus, GitOid,
    MergeOutcome, MergeStrategy, RefEdit, RefName, RefNameError, StatusEntry, TagInfo, TreeEdit,
    TreeEntry, WorktreeInfo,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn init_repo(dir: &Path) -> GixRepo {
        GixRepo::init(dir).expect("init temp repo")
    }

    #[test]
    fn open_nonexistent_path_fails() {
        let err = GixRepo::open(Path::new("/nonexistent/path/for/conduit/tests")).unwrap_err();
        assert!(matches!(err, GitError::OpenFailed { .. }));
    }

    #[test]
    fn write_and_read_blob_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = init_repo(dir.path());
        let oid = repo.write_blob(b"hello world").expect("write blob");
        let data = repo.read_blob(oid).expect("read blob");
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn read_blob_of_missing_oid_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = init_repo(dir.path());
        let missing: GitOid = "f".repeat(40).parse().expect("valid oid");
        let err = repo.read_blob(missing).unwrap_err();
        assert!(matches!(err, GitError::ObjectNotFound { .. }));
    }
}
