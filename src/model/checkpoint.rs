//! A [`Checkpoint`]: a reviewable stream tip, and the gate for promotion.

use crate::model::ids::{CheckpointId, ExecutionId, IssueId};
use chrono::{DateTime, Utc};
use conduit_git::GitOid;

/// Review state of a [`Checkpoint`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewState {
    /// Awaiting a reviewer's decision.
    Pending,
    /// Cleared for promotion.
    Approved,
    /// The reviewer asked for further changes.
    ChangesRequested,
}

/// The action a reviewer takes on a checkpoint's current review state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewAction {
    /// Approve.
    Approve,
    /// Request changes.
    RequestChanges,
    /// Return to `Pending` from either terminal review outcome.
    Reset,
}

impl ReviewState {
    /// Apply `action`, returning the resulting state, or `None` if the
    /// action is not legal from this state.
    ///
    /// ```text
    /// pending --approve--> approved
    /// pending --request_changes--> changes_requested
    /// approved --reset--> pending
    /// changes_requested --reset--> pending
    /// ```
    #[must_use]
    pub const fn apply(self, action: ReviewAction) -> Option<Self> {
        match (self, action) {
            (Self::Pending, ReviewAction::Approve) => Some(Self::Approved),
            (Self::Pending, ReviewAction::RequestChanges) => Some(Self::ChangesRequested),
            (Self::Approved | Self::ChangesRequested, ReviewAction::Reset) => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Change-volume summary for a checkpoint's commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckpointStats {
    /// Number of files touched.
    pub files_changed: usize,
    /// Lines/records added.
    pub additions: usize,
    /// Lines/records deleted.
    pub deletions: usize,
}

impl From<conduit_git::DiffStats> for CheckpointStats {
    fn from(stats: conduit_git::DiffStats) -> Self {
        Self {
            files_changed: stats.files_changed,
            additions: stats.additions,
            deletions: stats.deletions,
        }
    }
}

/// A named tip of a stream presented for review.
///
/// Exactly one checkpoint is *current* per issue; older ones remain for
/// history. Currency is tracked by [`crate::checkpoint_flow`], not by a
/// field here, since "current" is a per-issue fact about the collection,
/// not the checkpoint itself.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    /// Unique id.
    pub id: CheckpointId,
    /// The issue this checkpoint is for.
    pub issue_id: IssueId,
    /// The execution this checkpoint was cut from.
    pub execution_id: ExecutionId,
    /// The commit presented for review.
    pub commit: GitOid,
    /// Commit / PR-style message describing the change.
    pub message: String,
    /// Diff stats relative to the target branch at checkpoint creation.
    pub stats: CheckpointStats,
    /// Current review state.
    pub review_state: ReviewState,
    /// Who reviewed it, once reviewed.
    pub reviewer: Option<String>,
    /// Reviewer notes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
