//! Data model: the entities the engine persists and reasons about.

pub mod checkpoint;
pub mod execution;
pub mod ids;
pub mod issue;
pub mod queue;
pub mod stream;

pub use checkpoint::{Checkpoint, CheckpointStats, ReviewAction, ReviewState};
pub use execution::{Execution, ExecutionMode, ExecutionStatus};
pub use ids::{CheckpointId, EntityUuid, ErrorKind, ExecutionId, IssueId, SpecId, StreamId, ValidationError};
pub use issue::{EntityKind, Feedback, FeedbackKind, Issue, IssueStatus, Relationship, RelationshipLabel, Spec};
pub use queue::{MergeQueueEntry, QueueStatus};
pub use stream::{Stream, StreamState};
