//! Errors produced by the git abstraction layer.

use crate::types::GitOid;
use std::path::PathBuf;

/// Errors that can occur while talking to the git backend.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// The repository could not be opened at the given path.
    #[error("failed to open repository at {path}: {source}")]
    OpenFailed {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying backend error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A requested object does not exist in the object database.
    #[error("object {oid} not found")]
    ObjectNotFound {
        /// The missing object.
        oid: GitOid,
    },

    /// A requested ref does not exist.
    #[error("ref {name} not found")]
    RefNotFound {
        /// The missing ref name.
        name: String,
    },

    /// A compare-and-swap ref update failed because the current value did
    /// not match the expected value.
    #[error("ref {name} was expected to be {expected} but is {actual}")]
    CasMismatch {
        /// The ref that failed to update.
        name: String,
        /// The OID the caller expected.
        expected: GitOid,
        /// The OID actually found.
        actual: GitOid,
    },

    /// A lower-level ref-transaction conflict that could not be classified
    /// as a specific CAS mismatch (e.g. a concurrent writer holding a lock).
    #[error("ref update conflict on {name}: {reason}")]
    RefConflict {
        /// The ref involved.
        name: String,
        /// Backend-supplied reason.
        reason: String,
    },

    /// Checkout failed to materialize a tree into the working directory.
    #[error("checkout of {tree_oid} into {path} failed: {reason}")]
    CheckoutFailed {
        /// The tree being checked out.
        tree_oid: GitOid,
        /// Destination worktree path.
        path: PathBuf,
        /// Backend-supplied reason.
        reason: String,
    },

    /// A worktree operation (add/remove/prune) failed.
    #[error("worktree operation failed for {path}: {reason}")]
    WorktreeFailed {
        /// Worktree path involved.
        path: PathBuf,
        /// Backend-supplied reason.
        reason: String,
    },

    /// Tree merge produced unresolved conflicts and no strategy was given
    /// to resolve them.
    #[error("merge of {ours} and {theirs} left {conflict_count} file(s) conflicted")]
    MergeConflict {
        /// OID of "our" tree.
        ours: GitOid,
        /// OID of "their" tree.
        theirs: GitOid,
        /// Number of unresolved conflicts.
        conflict_count: usize,
    },

    /// A generic I/O failure while reading or writing repository state.
    #[error("I/O error accessing repository: {0}")]
    Io(#[source] std::io::Error),

    /// The backend reported a failure that does not fit a more specific
    /// variant above.
    #[error("git backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for GitError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl GitError {
    /// Build a [`GitError::Backend`] from any gix error via its `Display`.
    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    /// Inspect a backend error message for the telltale signs of a ref CAS
    /// conflict. gix's ref-transaction errors do not currently carry a
    /// dedicated conflict variant we can match on, so we fall back to
    /// substring matching on the formatted message, mirroring how callers
    /// of `gix::refs::transaction` already have to cope with this.
    pub(crate) fn classify_ref_failure(name: &str, err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.contains("should have content")
            || msg.contains("cannot lock ref")
            || msg.contains("but expected")
        {
            Self::RefConflict {
                name: name.to_owned(),
                reason: msg,
            }
        } else {
            Self::Backend(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_mismatch_display_names_both_oids() {
        let err = GitError::CasMismatch {
            name: "refs/heads/main".into(),
            expected: GitOid::ZERO,
            actual: GitOid::ZERO,
        };
        let msg = err.to_string();
        assert!(msg.contains("refs/heads/main"));
    }

    #[test]
    fn classify_ref_failure_detects_lock_conflict() {
        let err = GitError::classify_ref_failure("refs/heads/main", "cannot lock ref: already locked");
        assert!(matches!(err, GitError::RefConflict { .. }));
    }

    #[test]
    fn classify_ref_failure_falls_back_to_backend() {
        let err = GitError::classify_ref_failure("refs/heads/main", "disk full");
        assert!(matches!(err, GitError::Backend(_)));
    }

    #[test]
    fn merge_conflict_reports_count() {
        let err = GitError::MergeConflict {
            ours: GitOid::ZERO,
            theirs: GitOid::ZERO,
            conflict_count: 3,
        };
        assert!(err.to_string().contains('3'));
    }
}
