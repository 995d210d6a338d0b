//! An [`Execution`]: one agent run against a stream.

use crate::model::ids::{ExecutionId, IssueId, StreamId};
use chrono::{DateTime, Utc};
use conduit_agent::AgentKind;
use conduit_git::GitOid;

/// Whether an execution runs in an isolated worktree or against the
/// project root directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Agent runs in a dedicated worktree for the stream.
    Worktree,
    /// Agent runs against the project root (ad-hoc, no stream isolation).
    Local,
}

/// Status machine for an [`Execution`].
///
/// Discrete executions move `Preparing -> Pending -> Running ->` one of the
/// four terminal states. Persistent-session executions additionally pass
/// through `Waiting`/`Paused` between prompt turns; those two are not
/// terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Stream/worktree allocation underway; not yet handed to the agent driver.
    Preparing,
    /// Queued for the agent session driver.
    Pending,
    /// The agent subprocess is running.
    Running,
    /// A persistent session is between turns, its idle timer (if any) ticking.
    Waiting,
    /// A persistent session has been explicitly paused; no idle timer.
    Paused,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled by the user.
    Stopped,
    /// The subprocess died unexpectedly.
    Crashed,
}

impl ExecutionStatus {
    /// `true` for the four states an execution never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped | Self::Crashed)
    }

    /// `true` for `Waiting`/`Paused`, the two non-terminal states specific
    /// to persistent sessions.
    #[must_use]
    pub const fn is_suspended(self) -> bool {
        matches!(self, Self::Waiting | Self::Paused)
    }

    /// Whether a transition to `next` is ever legal from this state,
    /// independent of persistent-vs-discrete mode. Used to reject malformed
    /// writes before they reach the store.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ExecutionStatus::{Completed, Crashed, Failed, Paused, Pending, Preparing, Running, Stopped, Waiting};
        match (self, next) {
            (Preparing, Pending | Failed) => true,
            (Pending, Running | Failed) => true,
            (Running, Completed | Failed | Stopped | Crashed | Waiting | Paused) => true,
            (Waiting, Running | Paused | Completed | Stopped | Failed) => true,
            (Paused, Running | Waiting | Stopped | Failed) => true,
            _ => false,
        }
    }
}

/// One run of an agent against a stream.
#[derive(Clone, Debug)]
pub struct Execution {
    /// Unique id.
    pub id: ExecutionId,
    /// The stream this execution runs against.
    pub stream_id: StreamId,
    /// The issue this execution serves, `None` for ad-hoc local runs.
    pub issue_id: Option<IssueId>,
    /// Which agent product drives this execution.
    pub agent_kind: AgentKind,
    /// Worktree or local.
    pub mode: ExecutionMode,
    /// The prompt given to the agent for this run.
    pub prompt: String,
    /// The execution this one follows up on, if any.
    pub parent_execution_id: Option<ExecutionId>,
    /// The agent-assigned session id, once known (persistent sessions only).
    pub session_id: Option<String>,
    /// Merge-base of the stream branch with the target at execution start.
    pub before_commit: GitOid,
    /// Stream tip at completion; always an ancestor-or-equal descendant of
    /// `before_commit`.
    pub after_commit: Option<GitOid>,
    /// Current status.
    pub status: ExecutionStatus,
    /// Error message, set when `status` is a failure variant.
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the agent subprocess actually started, if it did.
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution reached a terminal status, if it has.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// `true` if this execution reuses another's stream/worktree/session as
    /// a follow-up.
    #[must_use]
    pub const fn is_follow_up(&self) -> bool {
        self.parent_execution_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_disallow_further_transition() {
        for terminal in [
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Stopped,
            ExecutionStatus::Crashed,
        ] {
            assert!(!terminal.can_transition_to(ExecutionStatus::Running));
        }
    }

    #[test]
    fn preparing_can_only_advance_or_fail() {
        assert!(ExecutionStatus::Preparing.can_transition_to(ExecutionStatus::Pending));
        assert!(ExecutionStatus::Preparing.can_transition_to(ExecutionStatus::Failed));
        assert!(!ExecutionStatus::Preparing.can_transition_to(ExecutionStatus::Running));
    }

    #[test]
    fn waiting_and_paused_are_not_terminal() {
        assert!(!ExecutionStatus::Waiting.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
        assert!(ExecutionStatus::Waiting.is_suspended());
    }

    #[test]
    fn running_can_move_to_waiting_for_persistent_sessions() {
        assert!(ExecutionStatus::Running.can_transition_to(ExecutionStatus::Waiting));
        assert!(ExecutionStatus::Waiting.can_transition_to(ExecutionStatus::Running));
    }
}
