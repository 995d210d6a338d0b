//! Landing one issue rebases a blocked dependent's still-active stream onto
//! the new target tip.

mod common;

use chrono::Utc;
use conduit::cascade::{CascadeEngine, CascadeResult};
use conduit::config::MergeConfig;
use conduit::model::{
    EntityKind, EntityUuid, Execution, ExecutionId, ExecutionMode, ExecutionStatus, Issue, IssueId, IssueStatus,
    Relationship, RelationshipLabel, Stream, StreamId, StreamState,
};
use conduit::store::{InMemoryStore, Store};
use conduit::sync::{SyncEngine, SyncStrategy};
use conduit::transport::BroadcastEventSink;
use conduit_agent::AgentKind;
use conduit_git::{GitOid, GitRepo, RefEdit, RefName};
use std::sync::Arc;

fn issue(id: u64, title: &str) -> Issue {
    let now = Utc::now();
    Issue {
        id: IssueId::from_sequence(id),
        uuid: EntityUuid::generate(),
        title: title.into(),
        content: String::new(),
        status: IssueStatus::Open,
        priority: 0,
        parent: None,
        created_at: now,
        updated_at: now,
    }
}

fn execution(before_commit: GitOid, after_commit: GitOid) -> Execution {
    Execution {
        id: ExecutionId::generate(),
        stream_id: StreamId::generate(),
        issue_id: None,
        agent_kind: AgentKind::ClaudeCode,
        mode: ExecutionMode::Worktree,
        prompt: "do the thing".into(),
        parent_execution_id: None,
        session_id: None,
        before_commit,
        after_commit: Some(after_commit),
        status: ExecutionStatus::Completed,
        error: None,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
    }
}

#[test]
fn landing_a_blocker_rebases_its_dependents_active_stream() {
    let fx = common::init();

    let parent = issue(1, "P");
    let child = issue(2, "C");

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
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

    let sync = Arc::new(SyncEngine::new(fx.repo.clone(), fx.dir.path().to_path_buf(), MergeConfig::default()));

    // Land P's stream onto main first.
    let p_head = common::commit_file(&fx.repo, fx.initial_commit, "p.ts", b"export const p = 1;\n", "agent: p.ts");
    let p_exec = execution(fx.initial_commit, p_head);
    let p_result = sync.land(&p_exec, "main", SyncStrategy::Squash, "feat: P").expect("land P");
    let landed_tip = p_result.after_commit.expect("squash moves the ref");

    // C's stream was branched off the same pre-landing base, touching a
    // disjoint file, and is still active.
    let c_head = common::commit_file(&fx.repo, fx.initial_commit, "c.ts", b"export const c = 1;\n", "agent: c.ts");
    let mut child_stream = Stream::new(child.id.clone(), "main", fx.initial_commit);
    child_stream.head_commit = c_head;
    child_stream.state = StreamState::Active;

    let worktree_dir = tempfile::tempdir().expect("worktree tempdir");
    child_stream.worktree_path = Some(worktree_dir.path().to_path_buf());

    // A real worktree for C's stream would already be checked out to
    // `c_head`; for the purposes of the dirty-check that gates a cascade,
    // what matters is that the directory mirrors the repo's current HEAD.
    fx.repo.checkout(worktree_dir.path(), landed_tip).expect("checkout worktree");

    let stream_ref = RefName::new(&format!("refs/conduit/streams/{}", child_stream.id)).expect("valid ref");
    fx.repo
        .update_refs(&[RefEdit { name: stream_ref, new_oid: c_head, expected_old_oid: GitOid::ZERO }])
        .expect("create stream ref");

    store.put_stream(child_stream.clone());

    let events = Arc::new(BroadcastEventSink::new());
    let cascade = CascadeEngine::new(store.clone(), sync, fx.repo.clone(), events);
    let report = cascade.cascade(&parent.id, "main", landed_tip).expect("cascade runs");

    assert!(report.complete);
    assert_eq!(report.affected_streams.len(), 1);
    let affected = &report.affected_streams[0];
    assert_eq!(affected.issue_id, child.id);
    assert_eq!(affected.result, CascadeResult::Rebased);

    let updated = store.get_stream(&child_stream.id).expect("stream still present");
    assert_eq!(updated.base_commit, landed_tip);
    assert_ne!(updated.head_commit, c_head);

    let rebased_commit = fx.repo.read_commit(updated.head_commit).expect("read rebased commit");
    assert_eq!(rebased_commit.parents, vec![landed_tip]);

    let tree = rebased_commit.tree_oid;
    let entries = fx.repo.read_tree(tree).expect("read rebased tree");
    assert!(entries.iter().any(|e| e.name == "p.ts"));
    assert!(entries.iter().any(|e| e.name == "c.ts"));
}
