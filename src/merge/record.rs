//! A generic envelope for the line-delimited records the merger reconciles.
//!
//! Specs, issues, relationships, and feedback are all "UUID-keyed records
//! with a few scalar fields and a few array fields"; rather than hand-write
//! three-way merge logic once per concrete entity, the merger operates on
//! this one generic shape and the model types convert to and from it.

use crate::model::{EntityUuid, Feedback, FeedbackKind, Issue, IssueStatus, Relationship, RelationshipLabel, Spec};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// One line of a structured record file, normalized to a shape the merger
/// can reconcile without knowing the concrete entity type.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Immutable identity; the merge key.
    pub uuid: EntityUuid,
    /// Display key, present for entities that have one (issues, specs).
    pub stable_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time; equal `updated_at` with equal `fields` means
    /// "unchanged" for two-way reconcile purposes.
    pub updated_at: DateTime<Utc>,
    /// Every other field, scalar or array, keyed by name.
    pub fields: Map<String, Value>,
}

impl Record {
    /// Build a record from its parts, with an initially-empty field map.
    #[must_use]
    pub fn new(uuid: EntityUuid, stable_id: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { uuid, stable_id, created_at, updated_at, fields: Map::new() }
    }

    /// Set a scalar or array field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_owned(), value);
        self
    }

    /// A field's value, if present.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl From<&Issue> for Record {
    fn from(issue: &Issue) -> Self {
        Self::new(issue.uuid, Some(issue.id.to_string()), issue.created_at, issue.updated_at)
            .with_field("title", Value::String(issue.title.clone()))
            .with_field("content", Value::String(issue.content.clone()))
            .with_field("status", Value::String(format!("{:?}", issue.status)))
            .with_field("priority", Value::from(issue.priority))
            .with_field("parent", issue.parent.as_ref().map_or(Value::Null, |p| Value::String(p.to_string())))
    }
}

impl From<&Spec> for Record {
    fn from(spec: &Spec) -> Self {
        Self::new(spec.uuid, Some(spec.id.to_string()), spec.created_at, spec.updated_at)
            .with_field("title", Value::String(spec.title.clone()))
            .with_field("content", Value::String(spec.content.clone()))
            .with_field("file_path", Value::String(spec.file_path.clone()))
    }
}

impl From<&Relationship> for Record {
    fn from(rel: &Relationship) -> Self {
        Self::new(rel.uuid, None, rel.created_at, rel.updated_at)
            .with_field("from_uuid", Value::String(rel.from_uuid.to_string()))
            .with_field("from_kind", Value::String(format!("{:?}", rel.from_kind)))
            .with_field("to_uuid", Value::String(rel.to_uuid.to_string()))
            .with_field("to_kind", Value::String(format!("{:?}", rel.to_kind)))
            .with_field("label", Value::String(format!("{:?}", rel.label)))
    }
}

impl From<&Feedback> for Record {
    fn from(feedback: &Feedback) -> Self {
        Self::new(feedback.uuid, None, feedback.created_at, feedback.updated_at)
            .with_field("from_uuid", Value::String(feedback.from_uuid.to_string()))
            .with_field("to_uuid", Value::String(feedback.to_uuid.to_string()))
            .with_field("kind", Value::String(format!("{:?}", feedback.kind)))
            .with_field("content", Value::String(feedback.content.clone()))
            .with_field("dismissed", Value::Bool(feedback.dismissed))
    }
}

/// Error converting a generic [`Record`] back into a concrete entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("record {uuid} is missing or has a malformed '{field}' field")]
pub struct RecordShapeError {
    uuid: String,
    field: &'static str,
}

fn string_field(record: &Record, key: &'static str, uuid: &EntityUuid) -> Result<String, RecordShapeError> {
    record
        .field(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(RecordShapeError { uuid: uuid.to_string(), field: key })
}

impl TryFrom<&Record> for Issue {
    type Error = RecordShapeError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let id_str = record.stable_id.clone().ok_or(RecordShapeError { uuid: record.uuid.to_string(), field: "id" })?;
        let id = crate::model::IssueId::new(id_str).map_err(|_| RecordShapeError { uuid: record.uuid.to_string(), field: "id" })?;
        let status = match record.field("status").and_then(Value::as_str) {
            Some("InProgress") => IssueStatus::InProgress,
            Some("Blocked") => IssueStatus::Blocked,
            Some("Closed") => IssueStatus::Closed,
            _ => IssueStatus::Open,
        };
        let priority = record.field("priority").and_then(Value::as_i64).unwrap_or(0) as i32;
        let parent = record
            .field("parent")
            .and_then(Value::as_str)
            .and_then(|s| crate::model::IssueId::new(s).ok());
        Ok(Self {
            id,
            uuid: record.uuid,
            title: string_field(record, "title", &record.uuid)?,
            content: record.field("content").and_then(Value::as_str).unwrap_or_default().to_owned(),
            status,
            priority,
            parent,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl TryFrom<&Record> for Relationship {
    type Error = RecordShapeError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let parse_uuid = |key: &'static str| -> Result<EntityUuid, RecordShapeError> {
            string_field(record, key, &record.uuid)?
                .parse::<uuid::Uuid>()
                .map(EntityUuid::new)
                .map_err(|_| RecordShapeError { uuid: record.uuid.to_string(), field: key })
        };
        let parse_kind = |key: &'static str| -> Result<crate::model::EntityKind, RecordShapeError> {
            match string_field(record, key, &record.uuid)?.as_str() {
                "Issue" => Ok(crate::model::EntityKind::Issue),
                "Spec" => Ok(crate::model::EntityKind::Spec),
                _ => Err(RecordShapeError { uuid: record.uuid.to_string(), field: key }),
            }
        };
        let label = match string_field(record, "label", &record.uuid)?.as_str() {
            "Blocks" => RelationshipLabel::Blocks,
            "DependsOn" => RelationshipLabel::DependsOn,
            "Implements" => RelationshipLabel::Implements,
            "References" => RelationshipLabel::References,
            _ => RelationshipLabel::Related,
        };
        Ok(Self {
            uuid: record.uuid,
            from_uuid: parse_uuid("from_uuid")?,
            from_kind: parse_kind("from_kind")?,
            to_uuid: parse_uuid("to_uuid")?,
            to_kind: parse_kind("to_kind")?,
            label,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl TryFrom<&Record> for Feedback {
    type Error = RecordShapeError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let parse_uuid = |key: &'static str| -> Result<EntityUuid, RecordShapeError> {
            string_field(record, key, &record.uuid)?
                .parse::<uuid::Uuid>()
                .map(EntityUuid::new)
                .map_err(|_| RecordShapeError { uuid: record.uuid.to_string(), field: key })
        };
        let kind = match string_field(record, "kind", &record.uuid)?.as_str() {
            "Suggestion" => FeedbackKind::Suggestion,
            "Approval" => FeedbackKind::Approval,
            "RequestChanges" => FeedbackKind::RequestChanges,
            _ => FeedbackKind::Comment,
        };
        Ok(Self {
            uuid: record.uuid,
            from_uuid: parse_uuid("from_uuid")?,
            to_uuid: parse_uuid("to_uuid")?,
            kind,
            content: record.field("content").and_then(Value::as_str).unwrap_or_default().to_owned(),
            dismissed: record.field("dismissed").and_then(Value::as_bool).unwrap_or(false),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueId;

    fn sample_issue() -> Issue {
        let now = Utc::now();
        Issue {
            id: IssueId::from_sequence(1),
            uuid: EntityUuid::generate(),
            title: "Title".into(),
            content: "Body".into(),
            status: IssueStatus::Open,
            priority: 2,
            parent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issue_roundtrips_through_record() {
        let issue = sample_issue();
        let record = Record::from(&issue);
        let back = Issue::try_from(&record).expect("roundtrip");
        assert_eq!(back.id, issue.id);
        assert_eq!(back.title, issue.title);
        assert_eq!(back.priority, issue.priority);
    }

    #[test]
    fn record_missing_required_field_is_rejected() {
        let issue = sample_issue();
        let mut record = Record::from(&issue);
        record.fields.remove("title");
        assert!(Issue::try_from(&record).is_err());
    }
}
