//! A [`Stream`]: the long-lived branch of work attached to one issue.

use crate::model::ids::{IssueId, StreamId};
use conduit_git::GitOid;
use std::path::PathBuf;

/// Lifecycle state of a [`Stream`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Has an active execution or is ready for one.
    Active,
    /// A persistent-session execution is between turns.
    Waiting,
    /// A persistent-session execution has been explicitly paused.
    Paused,
    /// Its checkpoint has landed on the target branch; terminal.
    Landed,
    /// Closed without landing; terminal.
    Abandoned,
}

impl StreamState {
    /// `true` for `Landed`/`Abandoned`, the states a stream never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Landed | Self::Abandoned)
    }
}

/// A long-lived branch of work for one issue, from first execution to
/// landing.
///
/// Exactly one non-abandoned stream exists per issue at a time; this
/// invariant is enforced by [`crate::coordinator::ExecutionCoordinator`]
/// when allocating a stream for a new execution, not by the `Stream` type
/// itself.
#[derive(Clone, Debug)]
pub struct Stream {
    /// Unique id.
    pub id: StreamId,
    /// The issue this stream serves.
    pub issue_id: IssueId,
    /// Branch this stream will eventually land on (e.g. `main`).
    pub target_branch: String,
    /// The target's tip when this stream was created.
    pub base_commit: GitOid,
    /// The stream branch's current tip.
    pub head_commit: GitOid,
    /// Current lifecycle state.
    pub state: StreamState,
    /// Working directory, `None` once the worktree has been deleted.
    pub worktree_path: Option<PathBuf>,
    /// Position in the dependency graph's topological order, used to break
    /// ties when multiple streams are cascade candidates at once. Lower
    /// values are upstream of higher ones.
    pub dependency_position: i64,
}

impl Stream {
    /// Create a freshly-allocated, active stream rooted at `base_commit`.
    #[must_use]
    pub fn new(issue_id: IssueId, target_branch: impl Into<String>, base_commit: GitOid) -> Self {
        Self {
            id: StreamId::generate(),
            issue_id,
            target_branch: target_branch.into(),
            base_commit,
            head_commit: base_commit,
            state: StreamState::Active,
            worktree_path: None,
            dependency_position: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stream_has_equal_base_and_head() {
        let issue = IssueId::from_sequence(1);
        let stream = Stream::new(issue, "main", GitOid::ZERO);
        assert_eq!(stream.base_commit, stream.head_commit);
        assert_eq!(stream.state, StreamState::Active);
    }

    #[test]
    fn landed_and_abandoned_are_terminal() {
        assert!(StreamState::Landed.is_terminal());
        assert!(StreamState::Abandoned.is_terminal());
        assert!(!StreamState::Active.is_terminal());
        assert!(!StreamState::Waiting.is_terminal());
    }
}
