//! Shared fixtures for the end-to-end scenario tests: a bare on-disk repo
//! seeded with an initial commit on `main`, plus small helpers for writing
//! follow-up commits (plain files or structured JSONL records) without
//! going through a real agent subprocess.

use conduit::merge::Record;
use conduit_git::{CommitInfo, EntryMode, GitOid, GitRepo, RefEdit, RefName, TreeEdit};
use std::sync::Arc;
use tempfile::TempDir;

/// The well-known empty-tree object id, valid in any repository.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// An initialized repo with one commit (an empty "initial commit") on
/// `refs/heads/main`.
pub struct Fixture {
    pub dir: TempDir,
    pub repo: Arc<dyn GitRepo>,
    pub initial_commit: GitOid,
}

pub fn init() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo: Arc<dyn GitRepo> = Arc::new(conduit_git::GixRepo::init(dir.path()).expect("init repo"));
    let empty_tree: GitOid = EMPTY_TREE.parse().expect("valid empty-tree oid");
    let initial_commit = repo
        .write_commit(&CommitInfo {
            tree_oid: empty_tree,
            parents: vec![],
            author: "tester <tester@localhost>".into(),
            committer: "tester <tester@localhost>".into(),
            message: "initial commit".into(),
        })
        .expect("write initial commit");
    let main_ref = RefName::new("refs/heads/main").expect("valid ref");
    repo.update_refs(&[RefEdit { name: main_ref, new_oid: initial_commit, expected_old_oid: GitOid::ZERO }])
        .expect("create main");
    Fixture { dir, repo, initial_commit }
}

/// Write one file on top of `parent`'s tree as a new commit with a single
/// parent. Does not move any ref.
pub fn commit_file(repo: &Arc<dyn GitRepo>, parent: GitOid, path: &str, contents: &[u8], message: &str) -> GitOid {
    let parent_tree = repo.read_commit(parent).expect("read parent commit").tree_oid;
    let blob = repo.write_blob(contents).expect("write blob");
    let tree = repo
        .edit_tree(parent_tree, &[TreeEdit::Upsert { path: path.to_owned(), mode: EntryMode::Blob, oid: blob }])
        .expect("edit tree");
    repo.write_commit(&CommitInfo {
        tree_oid: tree,
        parents: vec![parent],
        author: "tester <tester@localhost>".into(),
        committer: "tester <tester@localhost>".into(),
        message: message.to_owned(),
    })
    .expect("write commit")
}

/// Serialize `records` as the structured JSONL format the sync engine's
/// merger reads, and commit them at `path` on top of `parent`.
pub fn commit_structured(repo: &Arc<dyn GitRepo>, parent: GitOid, path: &str, records: &[Record], message: &str) -> GitOid {
    let mut body = String::new();
    for record in records {
        let line = serde_json::json!({
            "uuid": record.uuid.inner(),
            "stable_id": record.stable_id,
            "created_at": record.created_at,
            "updated_at": record.updated_at,
        });
        let mut merged = line.as_object().cloned().expect("object");
        for (k, v) in &record.fields {
            merged.insert(k.clone(), v.clone());
        }
        body.push_str(&serde_json::to_string(&merged).expect("serialize record"));
        body.push('\n');
    }
    commit_file(repo, parent, path, body.as_bytes(), message)
}

/// Move `refs/heads/{branch}` to `target`, asserting it currently points at
/// `expected_old`.
pub fn set_branch(repo: &Arc<dyn GitRepo>, branch: &str, expected_old: GitOid, target: GitOid) {
    let name = RefName::new(&format!("refs/heads/{branch}")).expect("valid ref");
    repo.update_refs(&[RefEdit { name, new_oid: target, expected_old_oid: expected_old }]).expect("move branch");
}
