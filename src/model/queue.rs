//! A [`MergeQueueEntry`]: one execution's place in a target branch's
//! landing queue.

use crate::model::ids::ExecutionId;
use chrono::{DateTime, Utc};

/// Status of a [`MergeQueueEntry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueStatus {
    /// Waiting its turn.
    Pending,
    /// Currently being landed; at most one per target at a time.
    Merging,
    /// The landing attempt failed; the entry stays for inspection, does not
    /// auto-retry.
    Failed,
    /// Landed successfully.
    Landed,
    /// Removed before it could land.
    Cancelled,
}

/// `(target branch, execution id)` with queue bookkeeping.
#[derive(Clone, Debug)]
pub struct MergeQueueEntry {
    /// Branch this entry wants to land on.
    pub target: String,
    /// The execution whose checkpoint is queued.
    pub execution_id: ExecutionId,
    /// Current status.
    pub status: QueueStatus,
    /// Position within the target's queue; lower is sooner. Recomputed on
    /// every enqueue/dequeue, not stored densely.
    pub position: i64,
    /// Scheduling priority; lower wins. Ties break by `inserted_at`.
    pub priority: i32,
    /// Which agent/owner enqueued this entry, for attribution in events.
    pub agent_id: String,
    /// Insertion time, used as the priority tiebreaker.
    pub inserted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_variants_are_distinct() {
        assert_ne!(QueueStatus::Pending, QueueStatus::Merging);
    }
}
