//! The structured-file merger: three-way and two-way reconciliation of
//! line-delimited, UUID-keyed record files (specs, issues, relationships,
//! feedback).

pub mod reconcile;
pub mod record;
pub mod threeway;

pub use reconcile::{reconcile, remap_legacy_feedback_keys, ReconcileOutcome, ReconcileReport};
pub use record::{Record, RecordShapeError};
pub use threeway::{merge, MergeConflict, ThreeWayMergeOutcome};
