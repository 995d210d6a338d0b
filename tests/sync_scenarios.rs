//! End-to-end landing scenarios: basic land, squash collapsing a commit
//! range, and structured-file auto-merge on a divergent path.

mod common;

use chrono::Utc;
use conduit::config::MergeConfig;
use conduit::merge::Record;
use conduit::model::{EntityUuid, Execution, ExecutionId, ExecutionMode, ExecutionStatus, StreamId};
use conduit::sync::{SyncEngine, SyncStrategy};
use conduit_agent::AgentKind;
use conduit_git::GitRepo;
use serde_json::Value;
use std::sync::Arc;

fn execution(before_commit: conduit_git::GitOid, after_commit: conduit_git::GitOid) -> Execution {
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
fn basic_land_moves_main_and_carries_the_streams_file() {
    let fx = common::init();
    let stream_tip = common::commit_file(&fx.repo, fx.initial_commit, "src/a.ts", b"export const a = 1;\n", "agent: add a.ts");
    let exec = execution(fx.initial_commit, stream_tip);

    let sync = SyncEngine::new(fx.repo.clone(), fx.dir.path().to_path_buf(), MergeConfig::default());
    let result = sync.land(&exec, "main", SyncStrategy::Squash, "feat: F").expect("land succeeds");

    let new_tip = result.after_commit.expect("squash always moves the ref");
    assert_ne!(new_tip, fx.initial_commit);
    assert!(result.warnings.is_empty());
    assert!(result.should_cascade);

    let main_tip = fx.repo.resolve_ref(&conduit_git::RefName::new("refs/heads/main").expect("ref")).expect("resolve main");
    assert_eq!(main_tip, new_tip);

    let new_tree = fx.repo.read_commit(new_tip).expect("read commit").tree_oid;
    let stream_tree = fx.repo.read_commit(stream_tip).expect("read commit").tree_oid;
    assert_eq!(new_tree, stream_tree);
}

#[test]
fn squash_collapses_three_commits_into_one() {
    let fx = common::init();
    let c1 = common::commit_file(&fx.repo, fx.initial_commit, "f.txt", b"f1", "f1");
    let c2 = common::commit_file(&fx.repo, c1, "f.txt", b"f1f2", "f2");
    let c3 = common::commit_file(&fx.repo, c2, "f.txt", b"f1f2f3", "f3");
    let exec = execution(fx.initial_commit, c3);

    let sync = SyncEngine::new(fx.repo.clone(), fx.dir.path().to_path_buf(), MergeConfig::default());
    let result = sync.land(&exec, "main", SyncStrategy::Squash, "feat: bundle").expect("land succeeds");
    let new_tip = result.after_commit.expect("squash moves the ref");

    let commits = fx.repo.commit_range(new_tip, fx.initial_commit).expect("range");
    assert_eq!(commits.len(), 1);
    let landed = fx.repo.read_commit(commits[0]).expect("read landed commit");
    assert_eq!(landed.message, "feat: bundle");
    assert_eq!(landed.tree_oid, fx.repo.read_commit(c3).expect("read c3").tree_oid);
}

#[test]
fn structured_conflict_on_the_same_file_auto_merges_both_sides() {
    let fx = common::init();

    let u1 = EntityUuid::generate();
    let u2 = EntityUuid::generate();
    let now = Utc::now();
    let rec1 = Record::new(u1, None, now, now).with_field("title", Value::String("from main".into()));
    let rec2 = Record::new(u2, None, now, now).with_field("title", Value::String("from stream".into()));

    let main_tip = common::commit_structured(&fx.repo, fx.initial_commit, ".conduit/records/issues.jsonl", &[rec1], "main adds U1");
    common::set_branch(&fx.repo, "main", fx.initial_commit, main_tip);

    let stream_tip =
        common::commit_structured(&fx.repo, fx.initial_commit, ".conduit/records/issues.jsonl", &[rec2], "stream adds U2");
    let exec = execution(fx.initial_commit, stream_tip);

    let sync = SyncEngine::new(fx.repo.clone(), fx.dir.path().to_path_buf(), MergeConfig::default());
    let result = sync.land(&exec, "main", SyncStrategy::Squash, "feat: reconcile").expect("structured conflict auto-resolves");
    let new_tip = result.after_commit.expect("squash moves the ref");

    let new_tree = fx.repo.read_commit(new_tip).expect("read commit").tree_oid;
    let entries = fx.repo.read_tree(new_tree).expect("root entries");
    let conduit_dir = entries.iter().find(|e| e.name == ".conduit").expect(".conduit present");
    let conduit_entries = fx.repo.read_tree(conduit_dir.oid).expect("conduit entries");
    let records_dir = conduit_entries.iter().find(|e| e.name == "records").expect("records present");
    let record_entries = fx.repo.read_tree(records_dir.oid).expect("record entries");
    let file = record_entries.iter().find(|e| e.name == "issues.jsonl").expect("issues.jsonl present");
    let contents = String::from_utf8(fx.repo.read_blob(file.oid).expect("read blob")).expect("utf8");

    assert!(contents.contains(&u1.inner().to_string()));
    assert!(contents.contains(&u2.inner().to_string()));
}
