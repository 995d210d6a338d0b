//! Promoting a checkpoint whose issue is blocked by an unlanded dependency
//! fails closed unless the caller forces it through.

mod common;

use chrono::Utc;
use conduit::cascade::CascadeEngine;
use conduit::checkpoint_flow::{CheckpointFlow, PromoteOptions};
use conduit::config::{MergeConfig, QueueConfig};
use conduit::error::EngineError;
use conduit::model::{
    EntityKind, EntityUuid, Execution, ExecutionId, ExecutionMode, ExecutionStatus, Issue, IssueId, IssueStatus,
    ReviewAction, Relationship, RelationshipLabel, Stream, StreamState,
};
use conduit::queue_engine::MergeQueue;
use conduit::store::{InMemoryStore, Store};
use conduit::sync::SyncEngine;
use conduit::transport::BroadcastEventSink;
use conduit_agent::AgentKind;
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

#[test]
fn promote_is_blocked_by_an_unlanded_dependency_unless_forced() {
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

    // P has no landed stream at all, so it counts as an unlanded blocker.
    let c_head = common::commit_file(&fx.repo, fx.initial_commit, "c.ts", b"export const c = 1;\n", "agent: c.ts");
    let mut child_stream = Stream::new(child.id.clone(), "main", fx.initial_commit);
    child_stream.head_commit = c_head;
    child_stream.state = StreamState::Active;
    store.put_stream(child_stream.clone());

    let execution = Execution {
        id: ExecutionId::generate(),
        stream_id: child_stream.id,
        issue_id: Some(child.id.clone()),
        agent_kind: AgentKind::ClaudeCode,
        mode: ExecutionMode::Worktree,
        prompt: "implement C".into(),
        parent_execution_id: None,
        session_id: None,
        before_commit: fx.initial_commit,
        after_commit: Some(c_head),
        status: ExecutionStatus::Completed,
        error: None,
        created_at: now,
        started_at: None,
        completed_at: None,
    };
    store.put_execution(execution.clone());

    let sync = Arc::new(SyncEngine::new(fx.repo.clone(), fx.dir.path().to_path_buf(), MergeConfig::default()));
    let events = Arc::new(BroadcastEventSink::new());
    let queue = Arc::new(MergeQueue::new(store.clone(), sync.clone(), events.clone()));
    let cascade = Arc::new(CascadeEngine::new(store.clone(), sync.clone(), fx.repo.clone(), events));
    let flow = CheckpointFlow::new(store.clone(), fx.repo.clone(), sync, queue, cascade, QueueConfig::default(), true);

    let checkpoint = flow.create_checkpoint(&execution, "feat: C", false).expect("cut checkpoint");
    flow.review(&child.id, ReviewAction::Approve, Some("reviewer".into()), None).expect("approve");

    let blocked = flow.promote(&child.id, PromoteOptions::default());
    match blocked {
        Err(EngineError::Conflict { blocked_by, .. }) => {
            assert_eq!(blocked_by, vec![parent.id.clone()]);
        }
        other => panic!("expected a blocked conflict, got {other:?}"),
    }
    assert_eq!(store.get_stream(&child_stream.id).expect("stream").state, StreamState::Active);

    let forced = flow
        .promote(&child.id, PromoteOptions { force: true, ..Default::default() })
        .expect("forced promote succeeds");
    assert!(forced.after_commit.is_some());
    assert_eq!(store.get_stream(&child_stream.id).expect("stream").state, StreamState::Landed);
    let _ = checkpoint.id;
}
