//! Three-way merge of structured record files, per the classification
//! table: for each UUID independently, compare its base/ours/theirs sides
//! and decide add/keep/drop/merge.

use super::record::Record;
use crate::model::EntityUuid;
use serde_json::Value;
use std::collections::BTreeMap;

/// A UUID whose ours/theirs sides both modified scalar fields, requiring
/// latest-wins resolution; reported so callers can surface it even though
/// it was auto-resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeConflict {
    /// The record whose sides diverged.
    pub uuid: EntityUuid,
    /// Human-readable description of what was auto-resolved.
    pub detail: String,
}

/// Outcome of merging one structured record file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThreeWayMergeOutcome {
    /// The merged records, sorted by `created_at` ascending.
    pub records: Vec<Record>,
    /// Auto-resolved divergences worth reporting, not blocking.
    pub conflicts: Vec<MergeConflict>,
}

enum Side<'a> {
    Absent,
    Present(&'a Record),
}

fn index(records: &[Record]) -> BTreeMap<EntityUuid, &Record> {
    records.iter().map(|r| (r.uuid, r)).collect()
}

/// Merge `base`, `ours`, and `theirs` snapshots of one structured file.
#[must_use]
pub fn merge(base: &[Record], ours: &[Record], theirs: &[Record]) -> ThreeWayMergeOutcome {
    let base_idx = index(base);
    let ours_idx = index(ours);
    let theirs_idx = index(theirs);

    let mut all_uuids: Vec<EntityUuid> = base_idx
        .keys()
        .chain(ours_idx.keys())
        .chain(theirs_idx.keys())
        .copied()
        .collect();
    all_uuids.sort();
    all_uuids.dedup();

    let mut outcome = ThreeWayMergeOutcome::default();
    let mut by_stable_id: BTreeMap<String, Vec<EntityUuid>> = BTreeMap::new();

    for uuid in all_uuids {
        let base_rec = base_idx.get(&uuid).copied();
        let ours_rec = ours_idx.get(&uuid).copied();
        let theirs_rec = theirs_idx.get(&uuid).copied();

        if let Some(merged) = merge_one(&uuid, base_rec, ours_rec, theirs_rec, &mut outcome.conflicts) {
            if let Some(stable_id) = merged.stable_id.clone() {
                by_stable_id.entry(stable_id).or_default().push(merged.uuid);
            }
            outcome.records.push(merged);
        }
    }

    resolve_stable_id_collisions(&mut outcome, &by_stable_id);
    outcome.records.sort_by_key(|r| r.created_at);
    outcome
}

fn merge_one(
    uuid: &EntityUuid,
    base: Option<&Record>,
    ours: Option<&Record>,
    theirs: Option<&Record>,
    conflicts: &mut Vec<MergeConflict>,
) -> Option<Record> {
    match (base, ours, theirs) {
        // Present only on one side of base-vs-{ours,theirs}: added.
        (None, Some(o), None) => Some(o.clone()),
        (None, None, Some(t)) => Some(t.clone()),

        // Added on both sides with the same UUID: merge metadata, latest wins.
        (None, Some(o), Some(t)) => Some(merge_scalars(o, t, conflicts)),

        // Unchanged on one side, possibly modified on the other.
        (Some(b), Some(o), Some(t)) => {
            let ours_changed = o.updated_at != b.updated_at || o.fields != b.fields;
            let theirs_changed = t.updated_at != b.updated_at || t.fields != b.fields;
            match (ours_changed, theirs_changed) {
                (false, false) => Some(b.clone()),
                (true, false) => Some(o.clone()),
                (false, true) => Some(t.clone()),
                (true, true) => Some(merge_scalars(o, t, conflicts)),
            }
        }

        // Deleted on one side, unchanged on the other: deleted wins.
        (Some(b), None, Some(t)) if t.updated_at == b.updated_at && t.fields == b.fields => None,
        (Some(b), Some(o), None) if o.updated_at == b.updated_at && o.fields == b.fields => None,

        // Deleted on one side, modified on the other: modification wins, flagged.
        (Some(_), None, Some(t)) => {
            conflicts.push(MergeConflict {
                uuid: *uuid,
                detail: "deleted on one side, modified on the other; modification kept".into(),
            });
            Some(t.clone())
        }
        (Some(_), Some(o), None) => {
            conflicts.push(MergeConflict {
                uuid: *uuid,
                detail: "deleted on one side, modified on the other; modification kept".into(),
            });
            Some(o.clone())
        }

        // Deleted on both sides: absent.
        (Some(_), None, None) => None,

        (None, None, None) => None,
    }
}

/// YAML-style latest-wins on scalar fields, union on array fields.
fn merge_scalars(ours: &Record, theirs: &Record, conflicts: &mut Vec<MergeConflict>) -> Record {
    let (older, newer) = if ours.updated_at <= theirs.updated_at { (ours, theirs) } else { (theirs, ours) };
    let mut merged = newer.clone();

    let mut keys: Vec<&String> = older.fields.keys().chain(newer.fields.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        match (older.fields.get(key), newer.fields.get(key)) {
            (Some(Value::Array(a)), Some(Value::Array(b))) => {
                let mut union: Vec<Value> = a.clone();
                for item in b {
                    if !union.contains(item) {
                        union.push(item.clone());
                    }
                }
                merged.fields.insert(key.clone(), Value::Array(union));
            }
            (Some(a), Some(b)) if a != b => {
                conflicts.push(MergeConflict {
                    uuid: newer.uuid,
                    detail: format!("field '{key}' diverged; kept the latest-updated side"),
                });
            }
            _ => {}
        }
    }
    merged.created_at = older.created_at.min(newer.created_at);
    merged
}

/// Implements "added both with same stable id, different UUIDs: keep both;
/// rename the later as `id.1`, `id.2`, ...".
fn resolve_stable_id_collisions(outcome: &mut ThreeWayMergeOutcome, by_stable_id: &BTreeMap<String, Vec<EntityUuid>>) {
    for (stable_id, uuids) in by_stable_id {
        if uuids.len() <= 1 {
            continue;
        }
        let mut records: Vec<&mut Record> = outcome.records.iter_mut().filter(|r| uuids.contains(&r.uuid)).collect();
        records.sort_by_key(|r| r.created_at);
        for (i, record) in records.into_iter().enumerate().skip(1) {
            record.stable_id = Some(format!("{stable_id}.{i}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn rec(created_offset: i64, updated_offset: i64, title: &str) -> Record {
        let now = Utc::now();
        Record::new(
            EntityUuid::generate(),
            None,
            now + Duration::seconds(created_offset),
            now + Duration::seconds(updated_offset),
        )
        .with_field("title", Value::String(title.into()))
    }

    #[test]
    fn merge_of_identical_sides_is_a_no_op() {
        let r = rec(0, 0, "x");
        let out = merge(&[r.clone()], &[r.clone()], &[r.clone()]);
        assert_eq!(out.records.len(), 1);
        assert!(out.conflicts.is_empty());
    }

    #[test]
    fn disjoint_additions_are_unioned() {
        let a = rec(0, 0, "a");
        let b = rec(1, 1, "b");
        let out = merge(&[], &[a.clone()], &[b.clone()]);
        assert_eq!(out.records.len(), 2);
    }

    #[test]
    fn modification_beats_deletion() {
        let base = rec(0, 0, "x");
        let mut modified = base.clone();
        modified.updated_at += Duration::seconds(5);
        modified.fields.insert("title".into(), Value::String("y".into()));
        let out = merge(&[base], &[], &[modified.clone()]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].field("title"), modified.field("title"));
        assert_eq!(out.conflicts.len(), 1);
    }

    #[test]
    fn mutual_deletion_is_absent() {
        let base = rec(0, 0, "x");
        let out = merge(&[base], &[], &[]);
        assert!(out.records.is_empty());
    }

    #[test]
    fn same_stable_id_different_uuid_renumbers_the_later() {
        let now = Utc::now();
        let older = Record::new(EntityUuid::generate(), Some("SPEC-1".into()), now, now);
        let newer = Record::new(EntityUuid::generate(), Some("SPEC-1".into()), now + Duration::seconds(10), now + Duration::seconds(10));
        let out = merge(&[], &[older.clone()], &[newer]);
        assert_eq!(out.records.len(), 2);
        let ids: Vec<Option<String>> = out.records.iter().map(|r| r.stable_id.clone()).collect();
        assert!(ids.contains(&Some("SPEC-1".to_owned())));
        assert!(ids.contains(&Some("SPEC-1.1".to_owned())));
    }

    #[test]
    fn array_fields_are_unioned_on_double_modification() {
        let now = Utc::now();
        let base = Record::new(EntityUuid::generate(), None, now, now).with_field("tags", Value::Array(vec![Value::String("a".into())]));
        let mut ours = base.clone();
        ours.updated_at += Duration::seconds(1);
        ours.fields.insert("tags".into(), Value::Array(vec![Value::String("a".into()), Value::String("b".into())]));
        let mut theirs = base.clone();
        theirs.updated_at += Duration::seconds(2);
        theirs.fields.insert("tags".into(), Value::Array(vec![Value::String("a".into()), Value::String("c".into())]));
        let out = merge(&[base], &[ours], &[theirs]);
        let tags = out.records[0].field("tags").and_then(Value::as_array).expect("tags");
        assert_eq!(tags.len(), 3);
    }
}
