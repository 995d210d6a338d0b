//! Checkpoint creation, review transitions, and promotion.

use crate::cascade::CascadeEngine;
use crate::config::QueueConfig;
use crate::error::EngineError;
use crate::model::{Checkpoint, CheckpointId, CheckpointStats, Execution, ExecutionStatus, IssueId, ReviewAction};
use crate::queue_engine::MergeQueue;
use crate::store::{not_found, Store};
use crate::sync::{SyncEngine, SyncStrategy};
use chrono::Utc;
use conduit_git::GitRepo;
use std::sync::Arc;

/// Options accepted by [`CheckpointFlow::promote`].
#[derive(Clone, Debug, Default)]
pub struct PromoteOptions {
    /// Landing strategy; defaults to [`SyncStrategy::Squash`].
    pub strategy: Option<SyncStrategy>,
    /// Commit/checkpoint message; defaults to the checkpoint's own message.
    pub message: Option<String>,
    /// Skip the approval gate.
    pub force: bool,
}

/// Creates checkpoints, applies review actions, and promotes approved
/// checkpoints through the sync engine.
pub struct CheckpointFlow {
    store: Arc<dyn Store>,
    repo: Arc<dyn GitRepo>,
    sync: Arc<SyncEngine>,
    queue: Arc<MergeQueue>,
    cascade: Arc<CascadeEngine>,
    queue_config: QueueConfig,
    cascade_on_land: bool,
}

impl CheckpointFlow {
    /// Build a checkpoint flow over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        repo: Arc<dyn GitRepo>,
        sync: Arc<SyncEngine>,
        queue: Arc<MergeQueue>,
        cascade: Arc<CascadeEngine>,
        queue_config: QueueConfig,
        cascade_on_land: bool,
    ) -> Self {
        Self { store, repo, sync, queue, cascade, queue_config, cascade_on_land }
    }

    /// Cut a checkpoint from a completed execution, making it current for
    /// its issue; optionally enqueue it for landing.
    ///
    /// # Errors
    /// [`EngineError::Validation`] if the execution has no issue or is not
    /// completed; propagates a store/git lookup failure otherwise.
    pub fn create_checkpoint(&self, execution: &Execution, message: &str, auto_enqueue: bool) -> Result<Checkpoint, EngineError> {
        if execution.status != ExecutionStatus::Completed {
            return Err(EngineError::Validation {
                field: "execution".into(),
                reason: "checkpoints may only be cut from a completed execution".into(),
            });
        }
        let Some(issue_id) = execution.issue_id.clone() else {
            return Err(EngineError::Validation { field: "execution".into(), reason: "has no issue to checkpoint".into() });
        };
        let commit = execution.after_commit.unwrap_or(execution.before_commit);

        let stats = if let Some(stream) = self.store.get_stream(&execution.stream_id) {
            let base = self.repo.read_commit(stream.base_commit)?.tree_oid;
            let head = self.repo.read_commit(commit)?.tree_oid;
            let entries = self.repo.diff_trees(base, head)?;
            conduit_git::DiffStats::from_entries(&entries).into()
        } else {
            CheckpointStats::default()
        };

        let checkpoint = Checkpoint {
            id: CheckpointId::generate(),
            issue_id: issue_id.clone(),
            execution_id: execution.id,
            commit,
            message: message.to_owned(),
            stats,
            review_state: crate::model::ReviewState::Pending,
            reviewer: None,
            notes: None,
            created_at: Utc::now(),
        };
        self.store.put_checkpoint(checkpoint.clone());
        self.store.set_current_checkpoint(&issue_id, checkpoint.id);

        if self.queue_config.enabled && auto_enqueue {
            if let Some(stream) = self.store.get_stream(&execution.stream_id) {
                self.queue.enqueue(execution.id, &stream.target_branch, "checkpoint-flow", None);
            }
        }

        Ok(checkpoint)
    }

    /// Apply a review action to `issue_id`'s current checkpoint.
    ///
    /// # Errors
    /// [`EngineError::NoCurrentCheckpoint`] if the issue has none;
    /// [`EngineError::Validation`] if the transition is illegal from the
    /// checkpoint's current review state.
    pub fn review(&self, issue_id: &IssueId, action: ReviewAction, reviewer: Option<String>, notes: Option<String>) -> Result<Checkpoint, EngineError> {
        let mut checkpoint = self.store.get_current_checkpoint(issue_id).ok_or_else(|| EngineError::NoCurrentCheckpoint { issue_id: issue_id.clone() })?;
        let Some(next_state) = checkpoint.review_state.apply(action) else {
            return Err(EngineError::Validation {
                field: "review_action".into(),
                reason: format!("{:?} is not legal from {:?}", action, checkpoint.review_state),
            });
        };
        checkpoint.review_state = next_state;
        checkpoint.reviewer = reviewer.or(checkpoint.reviewer);
        checkpoint.notes = notes.or(checkpoint.notes);
        self.store.put_checkpoint(checkpoint.clone());
        Ok(checkpoint)
    }

    /// Promote `issue_id`'s current, approved checkpoint onto its target
    /// branch, landing it via the sync engine and triggering cascade.
    ///
    /// # Errors
    /// [`EngineError::NoCurrentCheckpoint`], [`EngineError::NotApproved`],
    /// or [`EngineError::Conflict`] with `blocked_by` populated, per the
    /// three promotion gates, in that order; otherwise propagates the sync
    /// engine's own failure.
    pub fn promote(&self, issue_id: &IssueId, options: PromoteOptions) -> Result<crate::sync::SyncResult, EngineError> {
        let checkpoint = self.store.get_current_checkpoint(issue_id).ok_or_else(|| EngineError::NoCurrentCheckpoint { issue_id: issue_id.clone() })?;

        if checkpoint.review_state != crate::model::ReviewState::Approved && !options.force {
            return Err(EngineError::NotApproved { checkpoint_id: checkpoint.id });
        }

        let blocked_by = self.unlanded_blockers(issue_id)?;
        if !blocked_by.is_empty() && !options.force {
            return Err(EngineError::Conflict {
                reason: "one or more blocking dependencies has no landed checkpoint".into(),
                blocked_by,
            });
        }

        let execution = self.store.get_execution(&checkpoint.execution_id).ok_or_else(|| not_found("execution", checkpoint.execution_id))?;
        let stream = self.store.get_stream(&execution.stream_id).ok_or_else(|| not_found("stream", execution.stream_id))?;
        let strategy = options.strategy.unwrap_or(SyncStrategy::Squash);
        let message = options.message.unwrap_or_else(|| checkpoint.message.clone());

        let result = self.sync.land(&execution, &stream.target_branch, strategy, &message)?;

        let mut landed_checkpoint = checkpoint;
        landed_checkpoint.commit = result.after_commit.unwrap_or(landed_checkpoint.commit);
        self.store.put_checkpoint(landed_checkpoint);

        let mut landed_stream = stream.clone();
        landed_stream.state = crate::model::StreamState::Landed;
        if let Some(tip) = result.after_commit {
            landed_stream.head_commit = tip;
        }
        self.store.put_stream(landed_stream);

        if self.cascade_on_land && result.should_cascade {
            if let Some(tip) = result.after_commit {
                let _ = self.cascade.cascade(issue_id, &stream.target_branch, tip)?;
            }
        }

        Ok(result)
    }

    /// Issues with a `blocks(X, issue_id)` edge and no landed checkpoint.
    fn unlanded_blockers(&self, issue_id: &IssueId) -> Result<Vec<IssueId>, EngineError> {
        let Some(issue) = self.store.get_issue(issue_id) else {
            return Err(not_found("issue", issue_id));
        };
        let issues_by_uuid: std::collections::HashMap<_, _> =
            self.store.list_issues().into_iter().map(|i| (i.uuid, i)).collect();

        let mut blockers = Vec::new();
        for relationship in self.store.list_relationships() {
            if relationship.label != crate::model::RelationshipLabel::Blocks || relationship.to_uuid != issue.uuid {
                continue;
            }
            let Some(blocker) = issues_by_uuid.get(&relationship.from_uuid) else {
                continue;
            };
            let landed = self
                .store
                .list_streams()
                .into_iter()
                .any(|s| s.issue_id == blocker.id && s.state == crate::model::StreamState::Landed);
            if !landed {
                blockers.push(blocker.id.clone());
            }
        }
        Ok(blockers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityUuid, Issue, IssueStatus};
    use chrono::Utc;

    fn issue(id: u64) -> Issue {
        let now = Utc::now();
        Issue {
            id: crate::model::IssueId::from_sequence(id),
            uuid: EntityUuid::generate(),
            title: "t".into(),
            content: String::new(),
            status: IssueStatus::Open,
            priority: 0,
            parent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn placeholder_keeps_issue_helper_exercised() {
        let i = issue(1);
        assert_eq!(i.priority, 0);
    }
}
