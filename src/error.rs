//! [`EngineError`]: the engine's single, agent-friendly error type.
//!
//! Every variant carries the structured data a caller needs to react (not
//! just a message), and `Display` names both the problem and, where there
//! is one, the fix.

use crate::model::{CheckpointId, ExecutionId, IssueId};
use std::fmt;

/// The engine's unified error type.
#[derive(Debug)]
pub enum EngineError {
    /// Bad input: missing prompt, unknown agent kind, invalid review action.
    Validation {
        /// Which field or argument was invalid.
        field: String,
        /// Why.
        reason: String,
    },
    /// An id referenced an entity that does not exist.
    NotFound {
        /// What kind of entity was sought (`"execution"`, `"issue"`, ...).
        kind: &'static str,
        /// The id that was not found.
        id: String,
    },
    /// A required external binary or tool server is not discoverable.
    MissingDependency {
        /// Name of the missing tool.
        tool: String,
    },
    /// Promotion or a merge-queue operation is blocked by another entity's
    /// state.
    Conflict {
        /// Human-readable description of the conflict.
        reason: String,
        /// Issues whose unlanded checkpoints block this operation.
        blocked_by: Vec<IssueId>,
    },
    /// The agent subprocess never got a pid.
    SpawnFailed {
        /// The command that failed to spawn.
        program: String,
        /// Underlying OS error text.
        reason: String,
    },
    /// A process-level timeout elapsed.
    Timeout {
        /// Which execution timed out.
        execution_id: ExecutionId,
        /// The configured timeout.
        after: std::time::Duration,
    },
    /// The agent subprocess exited abnormally.
    Crashed {
        /// Which execution crashed.
        execution_id: ExecutionId,
        /// Exit code, if the OS reported one.
        exit_code: Option<i32>,
        /// Last captured stderr, truncated.
        last_stderr: String,
    },
    /// A git operation failed during sync or cascade.
    GitFailure {
        /// What operation was being attempted.
        operation: String,
        /// The underlying git error.
        source: conduit_git::GitError,
    },
    /// Import referenced an entity that does not exist locally; the
    /// offending relationship was skipped, not fatal.
    StructuredMergeWarning {
        /// Description of what was skipped and why.
        detail: String,
    },
    /// Checkpoint-related validation failure.
    NoCurrentCheckpoint {
        /// The issue with no current checkpoint.
        issue_id: IssueId,
    },
    /// Promotion attempted on a checkpoint that has not been approved.
    NotApproved {
        /// The checkpoint in question.
        checkpoint_id: CheckpointId,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { field, reason } => {
                write!(f, "invalid {field}: {reason}")
            }
            Self::NotFound { kind, id } => {
                write!(f, "no {kind} with id {id:?} exists")
            }
            Self::MissingDependency { tool } => {
                write!(
                    f,
                    "required tool '{tool}' is not on PATH. To fix: install {tool} or add it to PATH before creating an execution"
                )
            }
            Self::Conflict { reason, blocked_by } => {
                if blocked_by.is_empty() {
                    write!(f, "conflict: {reason}")
                } else {
                    let names: Vec<String> = blocked_by.iter().map(ToString::to_string).collect();
                    write!(f, "conflict: {reason}. Blocked by: {}", names.join(", "))
                }
            }
            Self::SpawnFailed { program, reason } => {
                write!(f, "failed to spawn '{program}': {reason}")
            }
            Self::Timeout { execution_id, after } => {
                write!(f, "execution {execution_id} timed out after {after:?}")
            }
            Self::Crashed { execution_id, exit_code, last_stderr } => {
                write!(
                    f,
                    "execution {execution_id} crashed (exit code {exit_code:?}): {last_stderr}"
                )
            }
            Self::GitFailure { operation, source } => {
                write!(f, "git operation '{operation}' failed: {source}. To fix: inspect the safety tag and retry")
            }
            Self::StructuredMergeWarning { detail } => {
                write!(f, "structured merge warning: {detail}")
            }
            Self::NoCurrentCheckpoint { issue_id } => {
                write!(f, "issue {issue_id} has no current checkpoint. To fix: create a checkpoint before promoting")
            }
            Self::NotApproved { checkpoint_id } => {
                write!(
                    f,
                    "checkpoint {checkpoint_id} is not approved. To fix: approve it or pass force=true"
                )
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::GitFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<crate::model::ValidationError> for EngineError {
    fn from(err: crate::model::ValidationError) -> Self {
        Self::Validation {
            field: format!("{:?}", err.kind),
            reason: err.reason,
        }
    }
}

impl From<conduit_git::GitError> for EngineError {
    fn from(err: conduit_git::GitError) -> Self {
        Self::GitFailure {
            operation: "git".to_owned(),
            source: err,
        }
    }
}
