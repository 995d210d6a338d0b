//! The execution coordinator: the top-level API tying the worktree
//! manager, agent session driver, sync engine, merge queue, cascade
//! engine, and checkpoint flow together into one per-repository service.

use crate::agent_session::AgentSessionDriver;
use crate::checkpoint_flow::CheckpointFlow;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{Execution, ExecutionId, ExecutionMode, ExecutionStatus, IssueId, Stream};
use crate::store::{not_found, Store};
use crate::transport::{Event, EventSink};
use crate::worktree::WorktreeManager;
use chrono::Utc;
use conduit_agent::AgentKind;
use conduit_git::{GitOid, GitRepo, RefName};
use std::sync::Arc;

/// Context an execution runs under: the target branch and anything the
/// caller already knows about the issue's stream.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    /// Branch this stream will eventually land on; defaults to `main`.
    pub target_branch: Option<String>,
}

/// Filter accepted by [`ExecutionCoordinator::list`].
#[derive(Clone, Debug, Default)]
pub struct ExecutionFilter {
    /// Restrict to one issue's executions.
    pub issue_id: Option<IssueId>,
}

/// The engine's top-level entry point: creates and drives executions,
/// exposing the rest of the engine's subsystems as thin pass-throughs.
pub struct ExecutionCoordinator {
    store: Arc<dyn Store>,
    repo: Arc<dyn GitRepo>,
    worktrees: Arc<WorktreeManager>,
    sessions: Arc<AgentSessionDriver>,
    events: Arc<dyn EventSink>,
    pub checkpoints: Arc<CheckpointFlow>,
    config: EngineConfig,
}

impl ExecutionCoordinator {
    /// Build a coordinator over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        repo: Arc<dyn GitRepo>,
        worktrees: Arc<WorktreeManager>,
        sessions: Arc<AgentSessionDriver>,
        events: Arc<dyn EventSink>,
        checkpoints: Arc<CheckpointFlow>,
        config: EngineConfig,
    ) -> Self {
        Self { store, repo, worktrees, sessions, events, checkpoints, config }
    }

    /// Create and start a new execution against `issue_id` (or an ad-hoc
    /// local run if `None`).
    ///
    /// # Errors
    /// [`EngineError::NotFound`] if `issue_id` is given but does not exist;
    /// propagates a worktree/git allocation failure (in which case the
    /// execution is still persisted, terminal, in `Failed`).
    pub async fn create_execution(
        &self,
        issue_id: Option<IssueId>,
        agent_kind: AgentKind,
        mode: ExecutionMode,
        prompt: String,
        ctx: ExecutionContext,
    ) -> Result<Execution, EngineError> {
        if prompt.trim().is_empty() {
            return Err(EngineError::Validation { field: "prompt".into(), reason: "must not be empty".into() });
        }
        if let Some(id) = &issue_id {
            if self.store.get_issue(id).is_none() {
                return Err(not_found("issue", id));
            }
        }

        let target_branch = ctx.target_branch.unwrap_or_else(|| "main".to_owned());
        let mut execution = Execution {
            id: ExecutionId::generate(),
            stream_id: crate::model::StreamId::generate(),
            issue_id: issue_id.clone(),
            agent_kind,
            mode,
            prompt,
            parent_execution_id: None,
            session_id: None,
            before_commit: GitOid::ZERO,
            after_commit: None,
            status: ExecutionStatus::Preparing,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        let prep = self.prepare(&mut execution, &issue_id, &target_branch, mode);
        if let Err(e) = prep {
            execution.status = ExecutionStatus::Failed;
            execution.error = Some(e.to_string());
            self.store.put_execution(execution.clone());
            return Err(e);
        }

        execution.status = ExecutionStatus::Pending;
        self.store.put_execution(execution.clone());

        let worktree_path = self.worktree_path_for(&execution)?;
        self.run_async(execution.clone(), worktree_path);

        Ok(execution)
    }

    fn prepare(
        &self,
        execution: &mut Execution,
        issue_id: &Option<IssueId>,
        target_branch: &str,
        mode: ExecutionMode,
    ) -> Result<(), EngineError> {
        if !crate::agent_session::mcp_server_discoverable() {
            return Err(EngineError::MissingDependency { tool: crate::agent_session::MCP_SERVER_NAME.to_owned() });
        }

        let Some(issue_id) = issue_id else {
            execution.before_commit = self.resolve_branch_tip(target_branch)?;
            return Ok(());
        };

        let stream = match self.store.get_active_stream_for_issue(issue_id) {
            Some(existing) => existing,
            None => {
                let tip = self.resolve_branch_tip(target_branch)?;
                let stream = Stream::new(issue_id.clone(), target_branch, tip);
                self.store.put_stream(stream.clone());
                stream
            }
        };
        execution.stream_id = stream.id;
        execution.before_commit = stream.head_commit;

        if mode == ExecutionMode::Worktree {
            let path = self.worktrees.acquire(stream.id, target_branch)?;
            self.worktrees.propagate_agent_config(&path).map_err(|e| EngineError::Validation {
                field: "worktree.config".into(),
                reason: e.to_string(),
            })?;
            let mut stream = stream;
            stream.worktree_path = Some(path);
            self.store.put_stream(stream);
        }
        Ok(())
    }

    fn resolve_branch_tip(&self, branch: &str) -> Result<GitOid, EngineError> {
        let ref_name = RefName::new(&format!("refs/heads/{branch}")).map_err(|e| EngineError::Validation {
            field: "target_branch".into(),
            reason: e.to_string(),
        })?;
        self.repo.resolve_ref(&ref_name).map_err(Into::into)
    }

    fn worktree_path_for(&self, execution: &Execution) -> Result<std::path::PathBuf, EngineError> {
        match execution.mode {
            ExecutionMode::Local => Ok(std::path::PathBuf::from(".")),
            ExecutionMode::Worktree => {
                let stream = self.store.get_stream(&execution.stream_id).ok_or_else(|| not_found("stream", execution.stream_id))?;
                stream.worktree_path.map_or_else(|| self.worktrees.acquire(stream.id, &stream.target_branch), Ok)
            }
        }
    }

    /// Run the session driver's turn, updating the stored execution with
    /// the outcome. Not actually backgrounded onto a detached task here
    /// (the coordinator is already inside the caller's async context); a
    /// real HTTP front end spawns this on its own task per the ordering
    /// guarantee that agent I/O never blocks the request that created it.
    fn run_async(&self, execution: Execution, worktree_path: std::path::PathBuf) {
        let sessions = self.sessions.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut execution = execution;
            execution.status = ExecutionStatus::Running;
            execution.started_at = Some(Utc::now());
            store.put_execution(execution.clone());

            match sessions.run_turn(&execution, &worktree_path).await {
                Ok(outcome) => {
                    execution.status = outcome.status;
                    execution.session_id = outcome.session_id.or(execution.session_id);
                    execution.error = outcome.error;
                    if outcome.status.is_terminal() {
                        execution.completed_at = Some(Utc::now());
                        events.end(execution.id);
                    }
                }
                Err(e) => {
                    execution.status = ExecutionStatus::Failed;
                    execution.error = Some(e.to_string());
                    execution.completed_at = Some(Utc::now());
                    events.end(execution.id);
                }
            }
            store.put_execution(execution);
        });
    }

    /// Create a follow-up execution reusing `parent`'s stream, worktree,
    /// and (if any) agent session id.
    ///
    /// # Errors
    /// [`EngineError::Validation`] if the parent is not in a state that
    /// permits a follow-up (must be terminal-non-failure, or suspended for
    /// a persistent session).
    pub async fn create_follow_up(&self, parent_id: ExecutionId, feedback: String) -> Result<Execution, EngineError> {
        let parent = self.store.get_execution(&parent_id).ok_or_else(|| not_found("execution", parent_id))?;
        let eligible = parent.status == ExecutionStatus::Completed || parent.status.is_suspended();
        if !eligible {
            return Err(EngineError::Validation {
                field: "parent_execution".into(),
                reason: format!("{:?} is not eligible for a follow-up", parent.status),
            });
        }

        let execution = Execution {
            id: ExecutionId::generate(),
            stream_id: parent.stream_id,
            issue_id: parent.issue_id.clone(),
            agent_kind: parent.agent_kind,
            mode: parent.mode,
            prompt: feedback,
            parent_execution_id: Some(parent.id),
            session_id: parent.session_id.clone(),
            before_commit: parent.after_commit.unwrap_or(parent.before_commit),
            after_commit: None,
            status: ExecutionStatus::Pending,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.store.put_execution(execution.clone());

        let worktree_path = self.worktree_path_for(&execution)?;
        self.run_async(execution.clone(), worktree_path);
        Ok(execution)
    }

    /// Cancel `execution_id`. Idempotent: a second call on an already
    /// terminal execution is a no-op.
    ///
    /// Signals the agent session's cancellation token (cooperative: the
    /// drive loop stops reading immediately) and relies on
    /// [`AgentSessionDriver::cancel`] to kill the subprocess after its
    /// grace period if it's still running. The stored status flips to
    /// `Stopped` right away rather than waiting for that teardown to
    /// finish, matching every other terminal transition in this module.
    pub fn cancel(&self, execution_id: ExecutionId) {
        let Some(mut execution) = self.store.get_execution(&execution_id) else {
            return;
        };
        if execution.status.is_terminal() {
            return;
        }
        self.sessions.cancel(execution_id);
        execution.status = ExecutionStatus::Stopped;
        execution.completed_at = Some(Utc::now());
        self.store.put_execution(execution);
        self.events.publish(execution_id, Event::RunFinished { status: "stopped".into() });
        self.events.end(execution_id);
    }

    /// Fetch one execution.
    #[must_use]
    pub fn get(&self, execution_id: ExecutionId) -> Option<Execution> {
        self.store.get_execution(&execution_id)
    }

    /// List executions, optionally scoped to one issue.
    #[must_use]
    pub fn list(&self, filter: ExecutionFilter) -> Vec<Execution> {
        self.store.list_executions(filter.issue_id.as_ref())
    }

    /// The parent-to-leaf chain of follow-ups rooted at `root_id`.
    #[must_use]
    pub fn chain(&self, root_id: ExecutionId) -> Vec<Execution> {
        let all = self.store.list_executions(None);
        let mut chain = Vec::new();
        let Some(mut current) = all.iter().find(|e| e.id == root_id).cloned() else {
            return chain;
        };
        chain.push(current.clone());
        loop {
            let Some(next) = all.iter().find(|e| e.parent_execution_id == Some(current.id)).cloned() else {
                break;
            };
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// Garbage-collect worktrees orphaned since the last run. Intended to
    /// run once at startup.
    ///
    /// # Errors
    /// Propagates a git failure removing an orphaned worktree.
    pub fn collect_orphan_worktrees(&self) -> Result<Vec<std::path::PathBuf>, EngineError> {
        let live: std::collections::HashSet<_> = self.store.list_streams().into_iter().map(|s| s.id).collect();
        self.worktrees.collect_orphans(&live)
    }

    /// The engine configuration this coordinator was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::CascadeEngine;
    use crate::queue_engine::MergeQueue;
    use crate::store::InMemoryStore;
    use crate::sync::SyncEngine;
    use crate::transport::BroadcastEventSink;
    use conduit_agent::AgentRegistry;
    use conduit_git::GixRepo;

    fn build() -> ExecutionCoordinator {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo: Arc<dyn GitRepo> = Arc::new(GixRepo::init(dir.path()).expect("init"));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let config = EngineConfig::default();
        let worktrees = Arc::new(WorktreeManager::new(repo.clone(), dir.path().to_path_buf(), config.worktree.clone()));
        let registry = Arc::new(AgentRegistry::default_registry());
        let events: Arc<dyn EventSink> = Arc::new(BroadcastEventSink::new());
        let sessions = Arc::new(AgentSessionDriver::new(registry, events.clone(), store.clone(), config.session.clone()));
        let sync = Arc::new(SyncEngine::new(repo.clone(), dir.path().to_path_buf(), config.merge.clone()));
        let queue = Arc::new(MergeQueue::new(store.clone(), sync.clone(), events.clone()));
        let cascade = Arc::new(CascadeEngine::new(store.clone(), sync.clone(), repo.clone(), events.clone()));
        let checkpoints = Arc::new(CheckpointFlow::new(
            store.clone(),
            repo.clone(),
            sync,
            queue,
            cascade,
            config.queue.clone(),
            config.cascade.trigger_on_land,
        ));
        ExecutionCoordinator::new(store, repo, worktrees, sessions, events, checkpoints, config)
    }

    #[test]
    fn chain_of_an_unknown_root_is_empty() {
        let coordinator = build();
        assert!(coordinator.chain(ExecutionId::generate()).is_empty());
    }

    #[test]
    fn cancel_of_unknown_execution_is_a_no_op() {
        let coordinator = build();
        coordinator.cancel(ExecutionId::generate());
    }
}
