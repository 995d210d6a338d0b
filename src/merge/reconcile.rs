//! Two-way, UUID-keyed reconcile of an *existing* record set against an
//! *incoming* one, with configurable collision-resolution policy.

use super::record::Record;
use crate::model::EntityUuid;
use std::collections::BTreeMap;

/// One imported or reported outcome of reconciling a single incoming record.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// Present only in `incoming`: imported as-is.
    Added(Record),
    /// Present in both, `updated_at` differs: imported as-is.
    Updated(Record),
    /// Present in both, identical: nothing to do.
    Unchanged,
    /// Present only in `existing`: not touched by reconcile (informational).
    DeletedLocally,
    /// Same stable id, different UUID, `resolveCollisions=false`: nothing
    /// imported for this id.
    CollisionReported {
        /// The contested stable id.
        stable_id: String,
    },
    /// Same stable id, different UUID, `resolveCollisions=true`: the newer
    /// side is renumbered and imported under `new_id`.
    CollisionRenumbered {
        /// The contested stable id.
        stable_id: String,
        /// The freshly allocated id for the newer (renumbered) side.
        new_id: String,
        /// The renumbered record, ready to import.
        record: Record,
    },
}

/// Result of reconciling one file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    /// Records to persist (added, updated, or renumbered-and-imported).
    pub to_import: Vec<Record>,
    /// Every outcome, in UUID order, for reporting/auditing.
    pub outcomes: Vec<ReconcileOutcome>,
}

/// Reconcile `incoming` against `existing`, keyed by UUID.
///
/// `next_id` allocates a fresh stable id for the renumbered side of a
/// collision (e.g. `|prefix| format!("{prefix}-{next_seq}")`).
pub fn reconcile(
    existing: &[Record],
    incoming: &[Record],
    resolve_collisions: bool,
    mut allocate_id: impl FnMut() -> String,
) -> ReconcileReport {
    let existing_by_uuid: BTreeMap<EntityUuid, &Record> = existing.iter().map(|r| (r.uuid, r)).collect();
    let existing_by_stable_id: BTreeMap<&str, &Record> =
        existing.iter().filter_map(|r| r.stable_id.as_deref().map(|id| (id, r))).collect();

    let mut report = ReconcileReport::default();

    for record in incoming {
        if let Some(existing_record) = existing_by_uuid.get(&record.uuid) {
            if existing_record.updated_at == record.updated_at && existing_record.fields == record.fields {
                report.outcomes.push(ReconcileOutcome::Unchanged);
            } else {
                report.to_import.push(record.clone());
                report.outcomes.push(ReconcileOutcome::Updated(record.clone()));
            }
            continue;
        }

        let collision = record
            .stable_id
            .as_deref()
            .and_then(|id| existing_by_stable_id.get(id))
            .filter(|existing_record| existing_record.uuid != record.uuid);

        match collision {
            None => {
                report.to_import.push(record.clone());
                report.outcomes.push(ReconcileOutcome::Added(record.clone()));
            }
            Some(existing_record) => {
                let stable_id = record.stable_id.clone().unwrap_or_default();
                if !resolve_collisions {
                    report.outcomes.push(ReconcileOutcome::CollisionReported { stable_id });
                    continue;
                }
                // The existing (local) side always keeps its stable id; the
                // incoming side is always renumbered, regardless of which
                // `created_at` is actually older. See DESIGN.md's decision
                // on the "reverse collision" open question.
                let new_id = allocate_id();
                let renamed = Record { stable_id: Some(new_id.clone()), ..record.clone() };
                report.to_import.push(renamed.clone());
                report.outcomes.push(ReconcileOutcome::CollisionRenumbered { stable_id, new_id, record: renamed });
            }
        }
    }

    for record in existing {
        if !incoming.iter().any(|r| r.uuid == record.uuid) {
            report.outcomes.push(ReconcileOutcome::DeletedLocally);
        }
    }

    report
}

/// Legacy feedback records key their two sides as `issue_id`/`spec_id`
/// rather than `from_id`/`to_id`; remap before reconciliation.
pub fn remap_legacy_feedback_keys(mut record: Record) -> Record {
    if let Some(issue_id) = record.fields.remove("issue_id") {
        record.fields.entry("from_uuid".to_owned()).or_insert(issue_id);
    }
    if let Some(spec_id) = record.fields.remove("spec_id") {
        record.fields.entry("to_uuid".to_owned()).or_insert(spec_id);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn rec(stable_id: &str, created_offset: i64) -> Record {
        let now = Utc::now();
        Record::new(EntityUuid::generate(), Some(stable_id.into()), now + Duration::seconds(created_offset), now + Duration::seconds(created_offset))
    }

    #[test]
    fn new_uuid_is_added() {
        let incoming = rec("ISSUE-1", 0);
        let report = reconcile(&[], std::slice::from_ref(&incoming), true, || "ISSUE-99".into());
        assert_eq!(report.to_import.len(), 1);
        assert!(matches!(report.outcomes[0], ReconcileOutcome::Added(_)));
    }

    #[test]
    fn identical_record_is_unchanged() {
        let r = rec("ISSUE-1", 0);
        let report = reconcile(std::slice::from_ref(&r), std::slice::from_ref(&r), true, || unreachable!());
        assert!(report.to_import.is_empty());
        assert_eq!(report.outcomes, vec![ReconcileOutcome::Unchanged]);
    }

    #[test]
    fn collision_without_resolution_imports_nothing() {
        let existing = rec("ISSUE-1", 0);
        let mut incoming = rec("ISSUE-1", 5);
        incoming.uuid = EntityUuid::generate();
        let report = reconcile(std::slice::from_ref(&existing), std::slice::from_ref(&incoming), false, || unreachable!());
        assert!(report.to_import.is_empty());
        assert!(matches!(report.outcomes[0], ReconcileOutcome::CollisionReported { .. }));
    }

    #[test]
    fn collision_with_resolution_renumbers_the_newer_side() {
        let existing = rec("ISSUE-1", 0);
        let mut incoming = rec("ISSUE-1", 10);
        incoming.uuid = EntityUuid::generate();
        let report = reconcile(std::slice::from_ref(&existing), std::slice::from_ref(&incoming), true, || "ISSUE-42".into());
        assert_eq!(report.to_import.len(), 1);
        assert_eq!(report.to_import[0].stable_id, Some("ISSUE-42".into()));
    }

    #[test]
    fn legacy_feedback_keys_are_remapped() {
        let mut record = Record::new(EntityUuid::generate(), None, Utc::now(), Utc::now());
        record.fields.insert("issue_id".into(), serde_json::Value::String("x".into()));
        let remapped = remap_legacy_feedback_keys(record);
        assert!(remapped.fields.contains_key("from_uuid"));
        assert!(!remapped.fields.contains_key("issue_id"));
    }
}
