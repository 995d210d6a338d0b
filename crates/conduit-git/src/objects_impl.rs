//! Blob, tree, and commit object read/write.

use crate::error::GitError;
use crate::types::{CommitInfo, EntryMode, GitOid, TreeEdit, TreeEntry};
use gix::objs::tree::EntryKind;
use std::sync::Mutex;

fn oid_to_gix(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn gix_to_oid(id: gix::ObjectId) -> GitOid {
    let bytes: [u8; 20] = id
        .as_bytes()
        .try_into()
        .unwrap_or_else(|_| panic!("non-SHA1 object id"));
    GitOid::from_bytes(bytes)
}

fn mode_to_kind(mode: EntryMode) -> EntryKind {
    match mode {
        EntryMode::Blob => EntryKind::Blob,
        EntryMode::BlobExecutable => EntryKind::BlobExecutable,
        EntryMode::Tree => EntryKind::Tree,
        EntryMode::Link => EntryKind::Link,
        EntryMode::Commit => EntryKind::Commit,
    }
}

fn kind_to_mode(kind: EntryKind) -> EntryMode {
    match kind {
        EntryKind::Blob => EntryMode::Blob,
        EntryKind::BlobExecutable => EntryMode::BlobExecutable,
        EntryKind::Tree => EntryMode::Tree,
        EntryKind::Link => EntryMode::Link,
        EntryKind::Commit => EntryMode::Commit,
    }
}

pub(crate) fn read_blob(repo: &Mutex<gix::Repository>, oid: GitOid) -> Result<Vec<u8>, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let object = repo
        .find_object(oid_to_gix(oid))
        .map_err(|_| GitError::ObjectNotFound { oid })?;
    Ok(object.data.to_vec())
}

pub(crate) fn write_blob(repo: &Mutex<gix::Repository>, data: &[u8]) -> Result<GitOid, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let id = repo.write_blob(data).map_err(GitError::backend)?;
    Ok(gix_to_oid(id.detach()))
}

pub(crate) fn read_tree(repo: &Mutex<gix::Repository>, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let tree = repo
        .find_tree(oid_to_gix(oid))
        .map_err(|_| GitError::ObjectNotFound { oid })?;
    let mut out = Vec::new();
    for entry in tree.iter() {
        let entry = entry.map_err(GitError::backend)?;
        out.push(TreeEntry {
            name: entry.filename().to_string(),
            mode: kind_to_mode(entry.mode().kind()),
            oid: gix_to_oid(entry.oid().into()),
        });
    }
    Ok(out)
}

pub(crate) fn edit_tree(
    repo: &Mutex<gix::Repository>,
    base: GitOid,
    edits: &[TreeEdit],
) -> Result<GitOid, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let base_tree = repo
        .find_tree(oid_to_gix(base))
        .map_err(|_| GitError::ObjectNotFound { oid: base })?;
    let mut editor = base_tree.edit().map_err(GitError::backend)?;
    for edit in edits {
        match edit {
            TreeEdit::Upsert { path, mode, oid } => {
                editor
                    .upsert(path.as_str(), mode_to_kind(*mode), oid_to_gix(*oid))
                    .map_err(GitError::backend)?;
            }
            TreeEdit::Remove { path } => {
                editor.remove(path.as_str()).map_err(GitError::backend)?;
            }
        }
    }
    let new_tree = editor.write().map_err(GitError::backend)?;
    Ok(gix_to_oid(new_tree.detach()))
}

pub(crate) fn read_commit(repo: &Mutex<gix::Repository>, oid: GitOid) -> Result<CommitInfo, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let commit = repo
        .find_commit(oid_to_gix(oid))
        .map_err(|_| GitError::ObjectNotFound { oid })?;
    let decoded = commit.decode().map_err(GitError::backend)?;
    Ok(CommitInfo {
        tree_oid: gix_to_oid(decoded.tree()),
        parents: decoded.parents().map(gix_to_oid).collect(),
        message: decoded.message.to_string(),
        author: format!("{} <{}>", decoded.author().name, decoded.author().email),
        committer: format!("{} <{}>", decoded.committer().name, decoded.committer().email),
    })
}

pub(crate) fn write_commit(repo: &Mutex<gix::Repository>, info: &CommitInfo) -> Result<GitOid, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let tree = oid_to_gix(info.tree_oid);
    repo.find_tree(tree).map_err(|_| GitError::ObjectNotFound { oid: info.tree_oid })?;

    let mut author_time = String::new();
    let mut committer_time = String::new();
    let author = parse_identity(&info.author, &mut author_time);
    let committer = parse_identity(&info.committer, &mut committer_time);
    let parents: Vec<gix::ObjectId> = info.parents.iter().copied().map(oid_to_gix).collect();

    let id = repo
        .commit_as(
            committer,
            author,
            "HEAD",
            &info.message,
            tree,
            parents,
        )
        .map_err(GitError::backend)?;
    Ok(gix_to_oid(id.detach()))
}

pub(crate) fn commit_range(
    repo: &Mutex<gix::Repository>,
    from: GitOid,
    excluding: GitOid,
) -> Result<Vec<GitOid>, GitError> {
    let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    repo.find_commit(oid_to_gix(from))
        .map_err(|_| GitError::ObjectNotFound { oid: from })?;
    if !excluding.is_zero() {
        repo.find_commit(oid_to_gix(excluding))
            .map_err(|_| GitError::ObjectNotFound { oid: excluding })?;
    }

    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![oid_to_gix(from)];
    let boundary = oid_to_gix(excluding);
    while let Some(id) = stack.pop() {
        if id == boundary || !seen.insert(id) {
            continue;
        }
        let commit = repo.find_commit(id).map_err(GitError::backend)?;
        out.push(gix_to_oid(id));
        let decoded = commit.decode().map_err(GitError::backend)?;
        stack.extend(decoded.parents());
    }
    out.reverse();
    Ok(out)
}

fn parse_identity<'a>(identity: &'a str, time_buf: &'a mut String) -> gix::actor::SignatureRef<'a> {
    let (name, email) = identity
        .split_once('<')
        .map(|(n, rest)| (n.trim(), rest.trim_end_matches('>')))
        .unwrap_or((identity, "unknown@example.com"));
    time_buf.push_str(&gix::date::Time::now_utc().to_string());
    gix::actor::SignatureRef {
        name: name.into(),
        email: email.into(),
        time: time_buf.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parses_name_and_email() {
        let mut time_buf = String::new();
        let sig = parse_identity("Alice <alice@example.com>", &mut time_buf);
        assert_eq!(sig.name, "Alice");
        assert_eq!(sig.email, "alice@example.com");
    }

    #[test]
    fn identity_falls_back_without_angle_brackets() {
        let mut time_buf = String::new();
        let sig = parse_identity("just-a-name", &mut time_buf);
        assert_eq!(sig.name, "just-a-name");
    }
}
