//! Issue, Spec, Relationship, and Feedback: the user-authored entities
//! persisted as line-delimited records and reconciled by the
//! [structured-file merger](crate::merge).

use crate::model::ids::{EntityUuid, IssueId, SpecId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an [`Issue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Not yet started.
    Open,
    /// An execution is currently underway.
    InProgress,
    /// Waiting on a dependency or external input.
    Blocked,
    /// Landed or abandoned.
    Closed,
}

/// A user-visible unit of work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Issue {
    /// Stable, human-readable identifier (e.g. `ISSUE-42`).
    pub id: IssueId,
    /// Immutable identity, independent of `id`'s renumbering.
    pub uuid: EntityUuid,
    /// Short title.
    pub title: String,
    /// Full description / body.
    pub content: String,
    /// Current status.
    pub status: IssueStatus,
    /// Priority; lower sorts first wherever priority ordering applies.
    pub priority: i32,
    /// Optional parent issue, for sub-tasks.
    pub parent: Option<IssueId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Same shape as [`Issue`] but anchored to a spec file and without
/// status/feedback — a spec describes intended behavior, not work in flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Spec {
    /// Stable, human-readable identifier (e.g. `SPEC-7`).
    pub id: SpecId,
    /// Immutable identity.
    pub uuid: EntityUuid,
    /// Short title.
    pub title: String,
    /// Full description / body.
    pub content: String,
    /// Path to the anchoring spec file in the project, relative to root.
    pub file_path: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Which side of a [`Relationship`] or [`Feedback`] edge an entity plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An [`Issue`].
    Issue,
    /// A [`Spec`].
    Spec,
}

/// The label on a [`Relationship`] edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipLabel {
    /// The dependency edge consumed by the cascade and promote gates:
    /// `blocks(A, B)` means B cannot land before A does.
    Blocks,
    /// Informal dependency, not gating.
    DependsOn,
    /// This entity implements the target spec.
    Implements,
    /// A loose reference, no gating semantics.
    References,
    /// Generic association.
    Related,
}

/// A directed, labeled edge between two entities (issue↔issue, issue↔spec,
/// spec↔spec).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Relationship {
    /// Immutable identity.
    pub uuid: EntityUuid,
    /// Source entity's UUID.
    pub from_uuid: EntityUuid,
    /// Source entity's kind.
    pub from_kind: EntityKind,
    /// Target entity's UUID.
    pub to_uuid: EntityUuid,
    /// Target entity's kind.
    pub to_kind: EntityKind,
    /// The edge label.
    pub label: RelationshipLabel,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    /// The dedup key used when unioning relationships during a three-way
    /// merge: `(from, from_kind, to, to_kind, label)`.
    #[must_use]
    pub fn dedup_key(&self) -> (EntityUuid, EntityKind, EntityUuid, EntityKind, RelationshipLabel) {
        (self.from_uuid, self.from_kind, self.to_uuid, self.to_kind, self.label)
    }
}

/// The kind of a [`Feedback`] record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// A general remark.
    Comment,
    /// A proposed change.
    Suggestion,
    /// Sign-off.
    Approval,
    /// A request for changes before approval.
    RequestChanges,
}

/// A review or discussion record keyed by (from-entity, to-entity).
///
/// Legacy exports may key feedback by `issue_id`/`spec_id` instead of
/// `from_id`/`to_id`; see [`crate::merge::reconcile`] for the import-time
/// remapping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feedback {
    /// Immutable identity.
    pub uuid: EntityUuid,
    /// The entity the feedback is from (typically an agent or reviewer
    /// acting on behalf of an issue).
    pub from_uuid: EntityUuid,
    /// The entity the feedback targets.
    pub to_uuid: EntityUuid,
    /// What kind of feedback this is.
    pub kind: FeedbackKind,
    /// The feedback text.
    pub content: String,
    /// Whether the feedback has been dismissed.
    pub dismissed: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_dedup_key_is_order_sensitive() {
        let a = EntityUuid::generate();
        let b = EntityUuid::generate();
        let now = Utc::now();
        let r1 = Relationship {
            uuid: EntityUuid::generate(),
            from_uuid: a,
            from_kind: EntityKind::Issue,
            to_uuid: b,
            to_kind: EntityKind::Issue,
            label: RelationshipLabel::Blocks,
            created_at: now,
            updated_at: now,
        };
        let mut r2 = r1.clone();
        r2.from_uuid = b;
        r2.to_uuid = a;
        assert_ne!(r1.dedup_key(), r2.dedup_key());
    }
}
