//! Per-target priority queue of executions waiting to land.

use crate::error::EngineError;
use crate::model::{ExecutionId, MergeQueueEntry, QueueStatus};
use crate::store::{not_found, Store};
use crate::sync::{SyncEngine, SyncResult, SyncStrategy};
use crate::transport::{Event, EventSink};
use chrono::Utc;
use std::sync::Arc;

/// Outcome of advancing a target's queue by one entry.
#[derive(Clone, Debug)]
pub struct MergeResult {
    /// The execution that was landed or failed.
    pub execution_id: ExecutionId,
    /// `Ok` result of the sync, if landing succeeded.
    pub sync: Option<SyncResult>,
    /// Error text, if landing failed. The entry stays `Failed`, not retried.
    pub error: Option<String>,
}

/// A target's landing queue: at most one `merging` entry at a time, ordered
/// by priority then insertion time.
pub struct MergeQueue {
    store: Arc<dyn Store>,
    sync: Arc<SyncEngine>,
    events: Arc<dyn EventSink>,
}

impl MergeQueue {
    /// Build a queue over a store, the sync engine it drives landings
    /// through, and the sink it reports progress on.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sync: Arc<SyncEngine>, events: Arc<dyn EventSink>) -> Self {
        Self { store, sync, events }
    }

    /// Insert `execution_id` into `target`'s queue at `priority` (lower
    /// wins; default 0), breaking ties by insertion time.
    pub fn enqueue(&self, execution_id: ExecutionId, target: &str, agent_id: &str, priority: Option<i32>) {
        let entry = MergeQueueEntry {
            target: target.to_owned(),
            execution_id,
            status: QueueStatus::Pending,
            position: 0,
            priority: priority.unwrap_or(0),
            agent_id: agent_id.to_owned(),
            inserted_at: Utc::now(),
        };
        self.store.put_queue_entry(entry);
        self.events.publish(execution_id, Event::QueueProgress { detail: format!("enqueued on {target}") });
    }

    /// Remove `execution_id` from whatever queue it sits in. A no-op if it
    /// is not present (idempotent, per the dequeue-twice testable property).
    pub fn dequeue(&self, execution_id: &ExecutionId) {
        self.store.remove_queue_entry(execution_id);
    }

    /// `execution_id`'s 0-based position within `target`'s pending queue, or
    /// `None` if it is not queued there.
    #[must_use]
    pub fn position(&self, execution_id: &ExecutionId, target: &str) -> Option<i64> {
        self.store
            .list_queue_entries(target)
            .iter()
            .position(|e| &e.execution_id == execution_id)
            .map(|i| i as i64)
    }

    /// Advance `target`'s queue: mark the head `merging`, land it, and mark
    /// it `landed` or `failed`. Returns a structured failure (not an error)
    /// if the target has no pending entries, since an empty queue is a
    /// routine outcome, not exceptional.
    ///
    /// # Errors
    /// Propagates a store/sync lookup failure; a landing failure is
    /// reported in the returned [`MergeResult`], not via `Err`.
    pub fn next(&self, target: &str, get_execution: impl Fn(&ExecutionId) -> Option<crate::model::Execution>) -> Result<MergeResult, EngineError> {
        let mut entries = self.store.list_queue_entries(target);
        entries.retain(|e| e.status == QueueStatus::Pending);
        let Some(head) = entries.into_iter().next() else {
            return Err(not_found("queue entry", format!("pending entry for target {target}")));
        };
        if self.store.list_queue_entries(target).iter().any(|e| e.status == QueueStatus::Merging) {
            return Err(EngineError::Conflict {
                reason: format!("target {target} already has an entry merging"),
                blocked_by: vec![],
            });
        }

        let mut merging = head.clone();
        merging.status = QueueStatus::Merging;
        self.store.put_queue_entry(merging.clone());
        self.events.publish(head.execution_id, Event::QueueProgress { detail: "merging".into() });

        let Some(execution) = get_execution(&head.execution_id) else {
            let mut failed = merging;
            failed.status = QueueStatus::Failed;
            self.store.put_queue_entry(failed);
            return Ok(MergeResult { execution_id: head.execution_id, sync: None, error: Some("execution not found".into()) });
        };

        match self.sync.land(&execution, target, SyncStrategy::Squash, &format!("land {}", head.execution_id)) {
            Ok(result) => {
                let mut landed = merging;
                landed.status = QueueStatus::Landed;
                self.store.put_queue_entry(landed);
                self.store.remove_queue_entry(&head.execution_id);
                self.events.publish(head.execution_id, Event::QueueProgress { detail: "landed".into() });
                Ok(MergeResult { execution_id: head.execution_id, sync: Some(result), error: None })
            }
            Err(e) => {
                let mut failed = merging;
                failed.status = QueueStatus::Failed;
                self.store.put_queue_entry(failed);
                self.events.publish(head.execution_id, Event::QueueProgress { detail: format!("failed: {e}") });
                Ok(MergeResult { execution_id: head.execution_id, sync: None, error: Some(e.to_string()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::transport::BroadcastEventSink;
    use conduit_git::GixRepo;

    fn queue() -> (MergeQueue, Arc<InMemoryStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(GixRepo::init(dir.path()).expect("init repo"));
        let store = Arc::new(InMemoryStore::new());
        let sync = Arc::new(SyncEngine::new(repo, dir.path().to_path_buf(), crate::config::MergeConfig::default()));
        let events = Arc::new(BroadcastEventSink::new());
        let q = MergeQueue::new(store.clone(), sync, events);
        (q, store)
    }

    #[test]
    fn enqueue_then_position_reports_zero_for_sole_entry() {
        let (q, _store) = queue();
        let id = ExecutionId::generate();
        q.enqueue(id, "main", "agent", None);
        assert_eq!(q.position(&id, "main"), Some(0));
    }

    #[test]
    fn second_dequeue_is_a_no_op() {
        let (q, _store) = queue();
        let id = ExecutionId::generate();
        q.enqueue(id, "main", "agent", None);
        q.dequeue(&id);
        q.dequeue(&id);
        assert_eq!(q.position(&id, "main"), None);
    }

    #[test]
    fn next_on_empty_target_is_a_structured_failure() {
        let (q, _store) = queue();
        let err = q.next("main", |_| None).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn lower_priority_value_sorts_first() {
        let (q, _store) = queue();
        let low = ExecutionId::generate();
        let high = ExecutionId::generate();
        q.enqueue(high, "main", "agent", Some(5));
        q.enqueue(low, "main", "agent", Some(1));
        assert_eq!(q.position(&low, "main"), Some(0));
        assert_eq!(q.position(&high, "main"), Some(1));
    }
}
