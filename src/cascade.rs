//! Rebases every stream dependent on a just-landed issue onto the new
//! target tip, auto-merging structured-file conflicts along the way.

use crate::error::EngineError;
use crate::model::{EntityKind, IssueId, RelationshipLabel, StreamId};
use crate::store::Store;
use crate::sync::SyncEngine;
use crate::transport::{Event, EventSink};
use conduit_git::{GitOid, GitRepo, RefName};
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of attempting to rebase one dependent stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CascadeResult {
    /// Rebased cleanly (or auto-merged) onto the new target tip.
    Rebased,
    /// Worktree missing/dirty, or the stream is already terminal.
    Skipped,
    /// An unresolvable code conflict; the stream is left untouched.
    Conflict,
}

/// One dependent stream's outcome within a [`CascadeReport`].
#[derive(Clone, Debug)]
pub struct AffectedStream {
    /// The dependent stream.
    pub stream_id: StreamId,
    /// Its issue.
    pub issue_id: IssueId,
    /// What happened.
    pub result: CascadeResult,
    /// Conflicted paths, populated only when `result` is `Conflict`.
    pub conflict_files: Vec<String>,
}

/// The aggregate result of a cascade run.
#[derive(Clone, Debug)]
pub struct CascadeReport {
    /// The issue whose landing triggered this cascade.
    pub triggered_by: IssueId,
    /// Every dependent stream visited, in topological order.
    pub affected_streams: Vec<AffectedStream>,
    /// `true` if every dependent either rebased or was cleanly skipped (no
    /// conflicts left behind).
    pub complete: bool,
}

/// Walks the dependency graph from a just-landed issue and rebases every
/// reachable, still-active dependent stream.
pub struct CascadeEngine {
    store: Arc<dyn Store>,
    sync: Arc<SyncEngine>,
    repo: Arc<dyn GitRepo>,
    events: Arc<dyn EventSink>,
}

impl CascadeEngine {
    /// Build a cascade engine over the store, sync engine, and raw repo
    /// handle it needs to walk dependents and rebase their branches.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sync: Arc<SyncEngine>, repo: Arc<dyn GitRepo>, events: Arc<dyn EventSink>) -> Self {
        Self { store, sync, repo, events }
    }

    /// Dependent issues of `landed_issue`: those with `blocks(landed, X)` or
    /// `depends-on(X, landed)` edges.
    fn dependents_of(&self, landed_issue_uuid: crate::model::EntityUuid) -> Vec<IssueId> {
        let issues_by_uuid: std::collections::HashMap<_, _> =
            self.store.list_issues().into_iter().map(|i| (i.uuid, i.id)).collect();
        self.store
            .list_relationships()
            .into_iter()
            .filter_map(|r| {
                if r.from_kind != EntityKind::Issue || r.to_kind != EntityKind::Issue {
                    return None;
                }
                match r.label {
                    RelationshipLabel::Blocks if r.from_uuid == landed_issue_uuid => issues_by_uuid.get(&r.to_uuid).cloned(),
                    RelationshipLabel::DependsOn if r.to_uuid == landed_issue_uuid => issues_by_uuid.get(&r.from_uuid).cloned(),
                    _ => None,
                }
            })
            .collect()
    }

    /// Rebase every stream dependent on `landed_issue`, whose stream now
    /// has tip `new_target_tip` on `target_branch`.
    ///
    /// # Errors
    /// Propagates a store/git lookup failure unrelated to an individual
    /// dependent's conflict (conflicts are reported per-stream, not `Err`).
    pub fn cascade(&self, landed_issue: &IssueId, target_branch: &str, new_target_tip: GitOid) -> Result<CascadeReport, EngineError> {
        let Some(issue) = self.store.get_issue(landed_issue) else {
            return Err(crate::store::not_found("issue", landed_issue));
        };

        let mut affected = Vec::new();
        let mut visited: HashSet<IssueId> = HashSet::new();
        let mut frontier = vec![issue.uuid];
        let mut complete = true;

        while let Some(uuid) = frontier.pop() {
            for dependent_issue in self.dependents_of(uuid) {
                if !visited.insert(dependent_issue.clone()) {
                    continue;
                }
                let Some(stream) = self.store.get_active_stream_for_issue(&dependent_issue) else {
                    continue;
                };
                let dependent_uuid = self.store.get_issue(&dependent_issue).map(|i| i.uuid);
                let outcome = self.rebase_one(&stream, target_branch, new_target_tip);
                if outcome.result == CascadeResult::Conflict {
                    complete = false;
                }
                affected.push(outcome);
                if let Some(u) = dependent_uuid {
                    frontier.push(u);
                }
            }
        }

        Ok(CascadeReport { triggered_by: landed_issue.clone(), affected_streams: affected, complete })
    }

    fn rebase_one(&self, stream: &crate::model::Stream, target_branch: &str, new_target_tip: GitOid) -> AffectedStream {
        let base = AffectedStream {
            stream_id: stream.id,
            issue_id: stream.issue_id.clone(),
            result: CascadeResult::Skipped,
            conflict_files: vec![],
        };

        if stream.state.is_terminal() {
            return base;
        }
        let Some(worktree_path) = &stream.worktree_path else {
            return base;
        };
        match self.repo.status(worktree_path) {
            Ok(entries) if entries.is_empty() => {}
            _ => return base,
        }

        let Ok(stream_ref) = RefName::new(&format!("refs/conduit/streams/{}", stream.id)) else {
            return base;
        };

        let rebased = (|| -> Result<(GitOid, Vec<String>), EngineError> {
            let base_commit = self.repo.read_commit(stream.base_commit)?;
            let new_target_commit = self.repo.read_commit(new_target_tip)?;
            let stream_head_commit = self.repo.read_commit(stream.head_commit)?;
            self.sync.rebase_onto(
                &stream_ref,
                stream.head_commit,
                base_commit.tree_oid,
                new_target_tip,
                new_target_commit.tree_oid,
                stream_head_commit.tree_oid,
            )
        })();

        match rebased {
            Ok((new_tip, warnings)) => {
                let mut updated = stream.clone();
                updated.head_commit = new_tip;
                updated.base_commit = new_target_tip;
                updated.target_branch = target_branch.to_owned();
                self.store.put_stream(updated);
                self.events.publish(
                    crate::model::ExecutionId::generate(),
                    Event::CascadeProgress { detail: format!("rebased stream {} ({} warnings)", stream.id, warnings.len()) },
                );
                AffectedStream { result: CascadeResult::Rebased, ..base }
            }
            Err(EngineError::Conflict { .. }) => AffectedStream { result: CascadeResult::Conflict, ..base },
            Err(_) => AffectedStream { result: CascadeResult::Skipped, ..base },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityUuid, Issue, IssueStatus, Relationship, Stream, StreamState};
    use crate::store::InMemoryStore;
    use crate::transport::BroadcastEventSink;
    use chrono::Utc;
    use conduit_git::GixRepo;

    fn issue(id: u64) -> Issue {
        let now = Utc::now();
        Issue {
            id: crate::model::IssueId::from_sequence(id),
            uuid: EntityUuid::generate(),
            title: "t".into(),
            content: String::new(),
            status: IssueStatus::Open,
            priority: 0,
            parent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cascade_with_no_dependents_is_an_empty_complete_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(GixRepo::init(dir.path()).expect("init"));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let parent = issue(1);
        store.put_issue(parent.clone());
        let sync = Arc::new(SyncEngine::new(repo.clone(), dir.path().to_path_buf(), crate::config::MergeConfig::default()));
        let events = Arc::new(BroadcastEventSink::new());
        let cascade = CascadeEngine::new(store, sync, repo, events);
        let report = cascade.cascade(&parent.id, "main", GitOid::ZERO).expect("cascade runs");
        assert!(report.affected_streams.is_empty());
        assert!(report.complete);
    }

    #[test]
    fn dependent_with_no_active_stream_is_skipped_silently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(GixRepo::init(dir.path()).expect("init"));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let parent = issue(1);
        let child = issue(2);
        store.put_issue(parent.clone());
        store.put_issue(child.clone());
        let now = Utc::now();
        store.put_relationship(Relationship {
            uuid: EntityUuid::generate(),
            from_uuid: parent.uuid,
            from_kind: EntityKind::Issue,
            to_uuid: child.uuid,
            to_kind: EntityKind::Issue,
            label: RelationshipLabel::Blocks,
            created_at: now,
            updated_at: now,
        });
        let sync = Arc::new(SyncEngine::new(repo.clone(), dir.path().to_path_buf(), crate::config::MergeConfig::default()));
        let events = Arc::new(BroadcastEventSink::new());
        let cascade = CascadeEngine::new(store, sync, repo, events);
        let report = cascade.cascade(&parent.id, "main", GitOid::ZERO).expect("cascade runs");
        assert!(report.affected_streams.is_empty());
        let _ = StreamState::Active;
    }
}
