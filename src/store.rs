//! The persistence contract and an in-memory reference implementation.
//!
//! The real store is an embedded relational database behind this same
//! trait, owned outside the engine; [`InMemoryStore`] is sufficient to
//! drive the engine's own tests and exercises the full public contract.

use crate::error::EngineError;
use crate::model::{
    Checkpoint, CheckpointId, Execution, ExecutionId, Feedback, Issue, IssueId, MergeQueueEntry,
    Relationship, Spec, SpecId, Stream, StreamId,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Narrow repository interface the engine uses for all persistence.
///
/// Every mutating method is documented by the spec as "a single transaction
/// per event"; implementations are expected to provide that atomicity
/// themselves (a real backend wraps each call in a DB transaction). This
/// trait only specifies the read/write surface, not the transaction
/// mechanics.
pub trait Store: Send + Sync {
    /// Fetch an issue by id.
    fn get_issue(&self, id: &IssueId) -> Option<Issue>;
    /// Insert or replace an issue.
    fn put_issue(&self, issue: Issue);
    /// List all issues.
    fn list_issues(&self) -> Vec<Issue>;

    /// Fetch a spec by id.
    fn get_spec(&self, id: &SpecId) -> Option<Spec>;
    /// Insert or replace a spec.
    fn put_spec(&self, spec: Spec);
    /// List all specs.
    fn list_specs(&self) -> Vec<Spec>;

    /// List all relationships.
    fn list_relationships(&self) -> Vec<Relationship>;
    /// Insert or replace a relationship (keyed by its UUID).
    fn put_relationship(&self, relationship: Relationship);

    /// List all feedback records.
    fn list_feedback(&self) -> Vec<Feedback>;
    /// Insert or replace a feedback record (keyed by its UUID).
    fn put_feedback(&self, feedback: Feedback);

    /// Fetch the stream for an issue, if one exists and is not abandoned.
    fn get_active_stream_for_issue(&self, issue_id: &IssueId) -> Option<Stream>;
    /// Fetch a stream by id.
    fn get_stream(&self, id: &StreamId) -> Option<Stream>;
    /// Insert or replace a stream.
    fn put_stream(&self, stream: Stream);
    /// List all streams.
    fn list_streams(&self) -> Vec<Stream>;

    /// Fetch an execution by id.
    fn get_execution(&self, id: &ExecutionId) -> Option<Execution>;
    /// Insert or replace an execution.
    fn put_execution(&self, execution: Execution);
    /// List executions, optionally filtered by issue.
    fn list_executions(&self, issue_id: Option<&IssueId>) -> Vec<Execution>;

    /// Fetch a checkpoint by id.
    fn get_checkpoint(&self, id: &CheckpointId) -> Option<Checkpoint>;
    /// Insert or replace a checkpoint.
    fn put_checkpoint(&self, checkpoint: Checkpoint);
    /// List checkpoints for an issue, most recent first.
    fn list_checkpoints_for_issue(&self, issue_id: &IssueId) -> Vec<Checkpoint>;
    /// Fetch the current checkpoint for an issue.
    fn get_current_checkpoint(&self, issue_id: &IssueId) -> Option<Checkpoint>;
    /// Mark `checkpoint_id` as the current checkpoint for its issue.
    fn set_current_checkpoint(&self, issue_id: &IssueId, checkpoint_id: CheckpointId);

    /// List merge-queue entries for a target branch.
    fn list_queue_entries(&self, target: &str) -> Vec<MergeQueueEntry>;
    /// Insert or replace a queue entry.
    fn put_queue_entry(&self, entry: MergeQueueEntry);
    /// Remove a queue entry by execution id.
    fn remove_queue_entry(&self, execution_id: &ExecutionId);

    /// Append one entry to an execution's session replay log, in emission
    /// order. Each entry is one coalesced agent-session record, serialized.
    fn append_session_log(&self, execution_id: ExecutionId, entry: String);
    /// The full replay log for an execution, in emission order.
    fn get_session_log(&self, execution_id: &ExecutionId) -> Vec<String>;
}

/// Error returned when a store operation references a missing entity, for
/// call sites that want to convert directly into [`EngineError`].
pub fn not_found(kind: &'static str, id: impl ToString) -> EngineError {
    EngineError::NotFound { kind, id: id.to_string() }
}

/// An in-process, `Mutex`-guarded store. Not durable; intended for tests
/// and for driving the engine without an external database.
#[derive(Default)]
pub struct InMemoryStore {
    issues: Mutex<HashMap<IssueId, Issue>>,
    specs: Mutex<HashMap<SpecId, Spec>>,
    relationships: Mutex<HashMap<uuid::Uuid, Relationship>>,
    feedback: Mutex<HashMap<uuid::Uuid, Feedback>>,
    streams: Mutex<HashMap<StreamId, Stream>>,
    executions: Mutex<HashMap<ExecutionId, Execution>>,
    checkpoints: Mutex<HashMap<CheckpointId, Checkpoint>>,
    current_checkpoint: Mutex<HashMap<IssueId, CheckpointId>>,
    queue: Mutex<HashMap<ExecutionId, MergeQueueEntry>>,
    session_log: Mutex<HashMap<ExecutionId, Vec<String>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Store for InMemoryStore {
    fn get_issue(&self, id: &IssueId) -> Option<Issue> {
        Self::lock(&self.issues).get(id).cloned()
    }

    fn put_issue(&self, issue: Issue) {
        Self::lock(&self.issues).insert(issue.id.clone(), issue);
    }

    fn list_issues(&self) -> Vec<Issue> {
        Self::lock(&self.issues).values().cloned().collect()
    }

    fn get_spec(&self, id: &SpecId) -> Option<Spec> {
        Self::lock(&self.specs).get(id).cloned()
    }

    fn put_spec(&self, spec: Spec) {
        Self::lock(&self.specs).insert(spec.id.clone(), spec);
    }

    fn list_specs(&self) -> Vec<Spec> {
        Self::lock(&self.specs).values().cloned().collect()
    }

    fn list_relationships(&self) -> Vec<Relationship> {
        Self::lock(&self.relationships).values().cloned().collect()
    }

    fn put_relationship(&self, relationship: Relationship) {
        Self::lock(&self.relationships).insert(relationship.uuid.inner(), relationship);
    }

    fn list_feedback(&self) -> Vec<Feedback> {
        Self::lock(&self.feedback).values().cloned().collect()
    }

    fn put_feedback(&self, feedback: Feedback) {
        Self::lock(&self.feedback).insert(feedback.uuid.inner(), feedback);
    }

    fn get_active_stream_for_issue(&self, issue_id: &IssueId) -> Option<Stream> {
        Self::lock(&self.streams)
            .values()
            .find(|s| &s.issue_id == issue_id && !s.state.is_terminal())
            .cloned()
    }

    fn get_stream(&self, id: &StreamId) -> Option<Stream> {
        Self::lock(&self.streams).get(id).cloned()
    }

    fn put_stream(&self, stream: Stream) {
        Self::lock(&self.streams).insert(stream.id, stream);
    }

    fn list_streams(&self) -> Vec<Stream> {
        Self::lock(&self.streams).values().cloned().collect()
    }

    fn get_execution(&self, id: &ExecutionId) -> Option<Execution> {
        Self::lock(&self.executions).get(id).cloned()
    }

    fn put_execution(&self, execution: Execution) {
        Self::lock(&self.executions).insert(execution.id, execution);
    }

    fn list_executions(&self, issue_id: Option<&IssueId>) -> Vec<Execution> {
        Self::lock(&self.executions)
            .values()
            .filter(|e| issue_id.is_none_or(|id| e.issue_id.as_ref() == Some(id)))
            .cloned()
            .collect()
    }

    fn get_checkpoint(&self, id: &CheckpointId) -> Option<Checkpoint> {
        Self::lock(&self.checkpoints).get(id).cloned()
    }

    fn put_checkpoint(&self, checkpoint: Checkpoint) {
        Self::lock(&self.checkpoints).insert(checkpoint.id, checkpoint);
    }

    fn list_checkpoints_for_issue(&self, issue_id: &IssueId) -> Vec<Checkpoint> {
        let mut checkpoints: Vec<Checkpoint> = Self::lock(&self.checkpoints)
            .values()
            .filter(|c| &c.issue_id == issue_id)
            .cloned()
            .collect();
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        checkpoints
    }

    fn get_current_checkpoint(&self, issue_id: &IssueId) -> Option<Checkpoint> {
        let current_id = Self::lock(&self.current_checkpoint).get(issue_id).copied()?;
        self.get_checkpoint(&current_id)
    }

    fn set_current_checkpoint(&self, issue_id: &IssueId, checkpoint_id: CheckpointId) {
        Self::lock(&self.current_checkpoint).insert(issue_id.clone(), checkpoint_id);
    }

    fn list_queue_entries(&self, target: &str) -> Vec<MergeQueueEntry> {
        let mut entries: Vec<MergeQueueEntry> = Self::lock(&self.queue)
            .values()
            .filter(|e| e.target == target)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.inserted_at.cmp(&b.inserted_at)));
        entries
    }

    fn put_queue_entry(&self, entry: MergeQueueEntry) {
        Self::lock(&self.queue).insert(entry.execution_id, entry);
    }

    fn remove_queue_entry(&self, execution_id: &ExecutionId) {
        Self::lock(&self.queue).remove(execution_id);
    }

    fn append_session_log(&self, execution_id: ExecutionId, entry: String) {
        Self::lock(&self.session_log).entry(execution_id).or_default().push(entry);
    }

    fn get_session_log(&self, execution_id: &ExecutionId) -> Vec<String> {
        Self::lock(&self.session_log).get(execution_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityUuid, IssueStatus};
    use chrono::Utc;

    fn sample_issue(seq: u64) -> Issue {
        let now = Utc::now();
        Issue {
            id: IssueId::from_sequence(seq),
            uuid: EntityUuid::generate(),
            title: "title".into(),
            content: "content".into(),
            status: IssueStatus::Open,
            priority: 0,
            parent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn put_then_get_issue_roundtrips() {
        let store = InMemoryStore::new();
        let issue = sample_issue(1);
        store.put_issue(issue.clone());
        let fetched = store.get_issue(&issue.id).expect("issue present");
        assert_eq!(fetched.title, "title");
    }

    #[test]
    fn active_stream_lookup_ignores_terminal_streams() {
        let store = InMemoryStore::new();
        let issue_id = IssueId::from_sequence(1);
        let mut stream = Stream::new(issue_id.clone(), "main", conduit_git::GitOid::ZERO);
        stream.state = crate::model::StreamState::Abandoned;
        store.put_stream(stream);
        assert!(store.get_active_stream_for_issue(&issue_id).is_none());
    }

    #[test]
    fn queue_entries_sort_by_priority_then_insertion() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for (priority, offset_secs) in [(1, 10), (0, 5), (0, 1)] {
            store.put_queue_entry(MergeQueueEntry {
                target: "main".into(),
                execution_id: ExecutionId::generate(),
                status: crate::model::QueueStatus::Pending,
                position: 0,
                priority,
                agent_id: "agent".into(),
                inserted_at: now + chrono::Duration::seconds(offset_secs),
            });
        }
        let entries = store.list_queue_entries("main");
        assert_eq!(entries[0].priority, 0);
        assert!(entries[0].inserted_at < entries[1].inserted_at);
    }

    #[test]
    fn session_log_entries_accumulate_in_append_order() {
        let store = InMemoryStore::new();
        let id = ExecutionId::generate();
        store.append_session_log(id, "first".into());
        store.append_session_log(id, "second".into());
        assert_eq!(store.get_session_log(&id), vec!["first".to_owned(), "second".to_owned()]);
    }

    #[test]
    fn session_log_for_unknown_execution_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.get_session_log(&ExecutionId::generate()).is_empty());
    }
}
