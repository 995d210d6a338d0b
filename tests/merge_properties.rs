//! Property tests for the three-way structured-record merge: identities
//! that must hold for any base/ours/theirs combination, not just the
//! handful of examples in the unit tests.

use chrono::{TimeZone, Utc};
use conduit::merge::{merge, Record};
use conduit::model::EntityUuid;
use proptest::prelude::*;
use serde_json::Value;

fn uuid_from(seed: u64) -> EntityUuid {
    EntityUuid::new(uuid::Uuid::from_u128(u128::from(seed)))
}

fn timestamp(seed: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seed, 0).single().expect("valid timestamp")
}

fn record(seed: u64, title: &str) -> Record {
    let ts = timestamp(i64::try_from(seed).unwrap_or(0));
    Record::new(uuid_from(seed), None, ts, ts).with_field("title", Value::String(title.to_owned()))
}

fn record_strategy() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((0u64..50, "[a-z]{1,8}"), 0..8)
        .prop_map(|pairs| {
            let mut seen = std::collections::HashSet::new();
            pairs.into_iter().filter(|(seed, _)| seen.insert(*seed)).map(|(seed, title)| record(seed, &title)).collect()
        })
}

proptest! {
    /// Merging a set of records against itself on both sides is a no-op:
    /// nothing is added, dropped, or flagged as a conflict.
    #[test]
    fn merge_of_a_side_with_itself_on_both_branches_is_idempotent(records in record_strategy()) {
        let outcome = merge(&records, &records, &records);
        prop_assert_eq!(outcome.records.len(), records.len());
        prop_assert!(outcome.conflicts.is_empty());
        let merged_uuids: std::collections::HashSet<_> = outcome.records.iter().map(|r| r.uuid).collect();
        let original_uuids: std::collections::HashSet<_> = records.iter().map(|r| r.uuid).collect();
        prop_assert_eq!(merged_uuids, original_uuids);
    }

    /// An addition made on only one side always survives the merge.
    #[test]
    fn an_addition_on_one_side_only_is_always_carried_through(
        base in record_strategy(),
        added_seed in 50u64..100,
    ) {
        let mut ours = base.clone();
        ours.push(record(added_seed, "new"));
        let outcome = merge(&base, &ours, &base);
        prop_assert!(outcome.records.iter().any(|r| r.uuid == uuid_from(added_seed)));
        prop_assert_eq!(outcome.records.len(), base.len() + 1);
    }

    /// A deletion made on only one side always sticks: the record is gone
    /// from the merge even though the other side kept it unchanged.
    #[test]
    fn a_deletion_on_one_side_only_always_sticks(base in record_strategy()) {
        prop_assume!(!base.is_empty());
        let mut ours = base.clone();
        let removed = ours.remove(0);
        let outcome = merge(&base, &ours, &base);
        prop_assert!(!outcome.records.iter().any(|r| r.uuid == removed.uuid));
        prop_assert_eq!(outcome.records.len(), base.len() - 1);
    }

    /// When one side deletes a record and the other modifies it, the
    /// modification wins: the record survives with the newer content.
    #[test]
    fn modification_beats_deletion_on_the_other_side(seed in 0u64..50) {
        let base = vec![record(seed, "original")];
        let mut theirs = base.clone();
        theirs[0].fields.insert("title".into(), Value::String("edited".into()));
        theirs[0].updated_at = timestamp(i64::try_from(seed).unwrap_or(0) + 1);
        let ours = vec![];

        let outcome = merge(&base, &ours, &theirs);
        prop_assert_eq!(outcome.records.len(), 1);
        prop_assert_eq!(outcome.records[0].field("title"), Some(&Value::String("edited".into())));
    }
}
