//! Previews and lands a stream's commits onto its target branch.

use crate::config::MergeConfig;
use crate::error::EngineError;
use crate::merge::{self, Record};
use crate::model::Execution;
use conduit_git::{CommitInfo, DiffStats, GitOid, GitRepo, MergeStrategy, RefEdit, RefName};
use std::path::PathBuf;
use std::sync::Arc;

/// Which strategy a sync operation applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Cherry-pick and squash the stream range onto target as one commit.
    Squash,
    /// Fast-forward (or rebase onto) target, preserving the stream's commits.
    Preserve,
    /// Apply resulting changes into target's working tree only; no commit.
    Stage,
}

/// Whether a conflicted path is auto-resolvable by the structured merger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    /// Path lies under the structured-file directory; the merger can resolve it.
    Structured,
    /// Any other path; requires a strategy choice / manual resolution.
    Code,
}

/// One conflicted path in a preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictReportEntry {
    /// The conflicted path.
    pub path: String,
    /// Whether the structured merger can resolve it automatically.
    pub kind: ConflictKind,
}

/// Result of `preview`.
#[derive(Clone, Debug)]
pub struct SyncPreview {
    /// Commits that would land, oldest first.
    pub commits: Vec<GitOid>,
    /// Aggregate diff stats across the whole range.
    pub stats: DiffStats,
    /// Conflicts a land attempt would need to resolve.
    pub conflicts: Vec<ConflictReportEntry>,
}

/// Result of a landing operation.
#[derive(Clone, Debug)]
pub struct SyncResult {
    /// The new tip of the target branch (unset for `Stage`, which moves no ref).
    pub after_commit: Option<GitOid>,
    /// Structured-merge warnings collected along the way.
    pub warnings: Vec<String>,
    /// Whether a cascade request should now be emitted (successful,
    /// ref-moving landings only).
    pub should_cascade: bool,
}

/// Lands stream commits onto a target branch via one of three strategies.
pub struct SyncEngine {
    repo: Arc<dyn GitRepo>,
    config: MergeConfig,
    /// Working directory target branches are checked out in (the project's
    /// primary checkout), used by [`SyncStrategy::Stage`] to materialize
    /// the merged tree without moving a ref.
    project_root: PathBuf,
}

impl SyncEngine {
    /// Build a sync engine over a repo handle, the project's primary
    /// working directory, and the merge configuration.
    #[must_use]
    pub fn new(repo: Arc<dyn GitRepo>, project_root: PathBuf, config: MergeConfig) -> Self {
        Self { repo, config, project_root }
    }

    fn is_structured_path(&self, path: &str) -> bool {
        path.starts_with(self.config.structured_file_dir.to_string_lossy().as_ref())
    }

    /// Compute a non-mutating preview of landing `execution`'s stream onto
    /// `target_branch`.
    ///
    /// # Errors
    /// Propagates a git failure resolving refs or computing the diff.
    pub fn preview(&self, execution: &Execution, target_branch: &str) -> Result<SyncPreview, EngineError> {
        let target_ref = RefName::new(&format!("refs/heads/{target_branch}")).map_err(validation)?;
        let target_tip = self.repo.resolve_ref(&target_ref)?;
        let stream_tip = execution.after_commit.unwrap_or(execution.before_commit);

        let commits = self.repo.commit_range(stream_tip, execution.before_commit)?;
        let entries = self.repo.diff_trees(
            self.repo.read_commit(target_tip)?.tree_oid,
            self.repo.read_commit(stream_tip)?.tree_oid,
        )?;
        let stats = DiffStats::from_entries(&entries);

        let conflict_paths = self.repo.detect_conflicts(
            self.repo.read_commit(execution.before_commit)?.tree_oid,
            self.repo.read_commit(target_tip)?.tree_oid,
            self.repo.read_commit(stream_tip)?.tree_oid,
        )?;
        let conflicts = conflict_paths
            .into_iter()
            .map(|c| ConflictReportEntry {
                kind: if self.is_structured_path(&c.path) { ConflictKind::Structured } else { ConflictKind::Code },
                path: c.path,
            })
            .collect();

        Ok(SyncPreview { commits, stats, conflicts })
    }

    /// Land `execution`'s stream onto `target_branch` using `strategy`,
    /// first tagging target's current tip as a safety net.
    ///
    /// # Errors
    /// Returns [`EngineError::Conflict`] if a code conflict cannot be
    /// resolved automatically, or propagates a git failure. On failure the
    /// target ref is left untouched.
    pub fn land(
        &self,
        execution: &Execution,
        target_branch: &str,
        strategy: SyncStrategy,
        message: &str,
    ) -> Result<SyncResult, EngineError> {
        let target_ref = RefName::new(&format!("refs/heads/{target_branch}")).map_err(validation)?;
        let target_tip = self.repo.resolve_ref(&target_ref)?;
        let stream_tip = execution.after_commit.unwrap_or(execution.before_commit);

        self.repo.create_tag(&safety_tag_name(execution), target_tip)?;

        let base_tree = self.repo.read_commit(execution.before_commit)?.tree_oid;
        let target_tree = self.repo.read_commit(target_tip)?.tree_oid;
        let stream_tree = self.repo.read_commit(stream_tip)?.tree_oid;

        let mut warnings = Vec::new();
        let merged_tree = self.merge_trees_with_structured_fallback(base_tree, target_tree, stream_tree, &mut warnings)?;

        match strategy {
            SyncStrategy::Stage => {
                // No commit is added to target's history and no ref moves;
                // `checkout` still needs a commit object to peel down to a
                // tree, so the merged tree is wrapped in a scratch commit
                // that nothing ever references.
                let scratch_commit = self.repo.write_commit(&CommitInfo {
                    tree_oid: merged_tree,
                    parents: vec![target_tip],
                    author: "conduit <conduit@localhost>".to_owned(),
                    committer: "conduit <conduit@localhost>".to_owned(),
                    message: "conduit: staged merge (not landed)".to_owned(),
                })?;
                self.repo.checkout(&self.project_root, scratch_commit)?;
                Ok(SyncResult { after_commit: None, warnings, should_cascade: false })
            }
            SyncStrategy::Squash => {
                let commit_info = CommitInfo {
                    tree_oid: merged_tree,
                    parents: vec![target_tip],
                    author: "conduit <conduit@localhost>".to_owned(),
                    committer: "conduit <conduit@localhost>".to_owned(),
                    message: message.to_owned(),
                };
                let new_commit = self.repo.write_commit(&commit_info)?;
                self.fast_forward(&target_ref, target_tip, new_commit)?;
                Ok(SyncResult { after_commit: Some(new_commit), warnings, should_cascade: true })
            }
            SyncStrategy::Preserve => {
                self.fast_forward(&target_ref, target_tip, stream_tip)?;
                Ok(SyncResult { after_commit: Some(stream_tip), warnings, should_cascade: true })
            }
        }
    }

    /// Rebase one dependent stream onto a new base tree (the just-landed
    /// target tip), resolving structured-file conflicts the same way a
    /// land does. Used by the cascade engine; public so it isn't
    /// duplicated there.
    ///
    /// # Errors
    /// Returns [`EngineError::Conflict`] on an unresolvable code conflict,
    /// or propagates a git failure. On either, `stream_ref` is left
    /// untouched.
    pub fn rebase_onto(
        &self,
        stream_ref: &RefName,
        expected_stream_tip: GitOid,
        base_tree: GitOid,
        new_base_tip: GitOid,
        new_base_tree: GitOid,
        stream_tree: GitOid,
    ) -> Result<(GitOid, Vec<String>), EngineError> {
        let mut warnings = Vec::new();
        let merged_tree = self.merge_trees_with_structured_fallback(base_tree, new_base_tree, stream_tree, &mut warnings)?;
        let commit_info = CommitInfo {
            tree_oid: merged_tree,
            parents: vec![new_base_tip],
            author: "conduit <conduit@localhost>".to_owned(),
            committer: "conduit <conduit@localhost>".to_owned(),
            message: "cascade: rebase onto landed target".to_owned(),
        };
        let new_commit = self.repo.write_commit(&commit_info)?;
        self.fast_forward(stream_ref, expected_stream_tip, new_commit)?;
        Ok((new_commit, warnings))
    }

    fn fast_forward(&self, target_ref: &RefName, expected: GitOid, new_tip: GitOid) -> Result<(), EngineError> {
        self.repo
            .update_refs(&[RefEdit { name: target_ref.clone(), new_oid: new_tip, expected_old_oid: expected }])
            .map_err(Into::into)
    }

    /// Three-way-merge the trees; any conflicted path under the structured
    /// directory is resolved by parsing both sides as JSONL records and
    /// running the structured three-way merger, then writing the merged
    /// JSONL back as the blob for that path. Any other conflict is fatal.
    fn merge_trees_with_structured_fallback(
        &self,
        base: GitOid,
        ours: GitOid,
        theirs: GitOid,
        warnings: &mut Vec<String>,
    ) -> Result<GitOid, EngineError> {
        let outcome = self.repo.merge_trees(base, ours, theirs, MergeStrategy::Strict)?;
        if let Some(tree) = outcome.tree {
            return Ok(tree);
        }

        let code_conflicts: Vec<_> = outcome.conflicts.iter().filter(|c| !self.is_structured_path(&c.path)).collect();
        if !code_conflicts.is_empty() {
            return Err(EngineError::Conflict {
                reason: format!(
                    "{} code conflict(s) cannot be auto-resolved: {}",
                    code_conflicts.len(),
                    code_conflicts.iter().map(|c| c.path.as_str()).collect::<Vec<_>>().join(", ")
                ),
                blocked_by: vec![],
            });
        }

        // Every conflict is a structured file; resolve each with the merger
        // and re-run with FavorTheirs on those paths as a base for applying
        // our own resolved blobs on top.
        let mut edits = Vec::new();
        for conflict in &outcome.conflicts {
            let base_records = self.read_jsonl(base, &conflict.path)?;
            let ours_records = self.read_jsonl(ours, &conflict.path)?;
            let theirs_records = self.read_jsonl(theirs, &conflict.path)?;
            let merged = merge::merge(&base_records, &ours_records, &theirs_records);
            for c in &merged.conflicts {
                warnings.push(c.detail.clone());
            }
            let blob = self.write_jsonl(&merged.records)?;
            edits.push(conduit_git::TreeEdit::Upsert {
                path: conflict.path.clone(),
                oid: blob,
                mode: conduit_git::EntryMode::Blob,
            });
        }

        let resolved = self.repo.merge_trees(base, ours, theirs, MergeStrategy::FavorOurs)?;
        let resolved_tree = resolved.tree.ok_or_else(|| EngineError::Conflict {
            reason: "structured-file fallback failed to produce a base tree".into(),
            blocked_by: vec![],
        })?;
        self.repo.edit_tree(resolved_tree, &edits).map_err(Into::into)
    }

    /// Resolve a slash-separated path to a blob OID by descending through
    /// tree objects one component at a time.
    fn resolve_blob(&self, tree: GitOid, path: &str) -> Result<Option<GitOid>, EngineError> {
        let mut current = tree;
        let components: Vec<&str> = path.split('/').collect();
        for (i, component) in components.iter().enumerate() {
            let entries = self.repo.read_tree(current)?;
            let Some(entry) = entries.into_iter().find(|e| e.name == *component) else {
                return Ok(None);
            };
            if i + 1 == components.len() {
                return Ok(Some(entry.oid));
            }
            current = entry.oid;
        }
        Ok(None)
    }

    fn read_jsonl(&self, tree: GitOid, path: &str) -> Result<Vec<Record>, EngineError> {
        let Some(blob_oid) = self.resolve_blob(tree, path)? else {
            return Ok(Vec::new());
        };
        let bytes = self.repo.read_blob(blob_oid)?;
        let text = String::from_utf8_lossy(&bytes);
        let mut records = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if let Ok(generic) = serde_json::from_str::<GenericLine>(line) {
                records.push(generic.into_record());
            }
        }
        Ok(records)
    }

    fn write_jsonl(&self, records: &[Record]) -> Result<GitOid, EngineError> {
        let mut out = String::new();
        for record in records {
            let line = GenericLine::from_record(record);
            out.push_str(&serde_json::to_string(&line).unwrap_or_default());
            out.push('\n');
        }
        self.repo.write_blob(out.as_bytes()).map_err(Into::into)
    }
}

fn safety_tag_name(execution: &Execution) -> String {
    format!("conduit-safety-{}", execution.id)
}

fn validation(e: conduit_git::RefNameError) -> EngineError {
    EngineError::Validation { field: "ref".into(), reason: e.to_string() }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct GenericLine {
    uuid: uuid::Uuid,
    stable_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    fields: serde_json::Map<String, serde_json::Value>,
}

impl GenericLine {
    fn into_record(self) -> Record {
        Record {
            uuid: crate::model::EntityUuid::new(self.uuid),
            stable_id: self.stable_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            fields: self.fields,
        }
    }

    fn from_record(record: &Record) -> Self {
        Self {
            uuid: record.uuid.inner(),
            stable_id: record.stable_id.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            fields: record.fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_tag_name_is_stable_per_execution() {
        let exec_id = crate::model::ExecutionId::generate();
        let a = format!("conduit-safety-{exec_id}");
        assert_eq!(a, a.clone());
    }
}
