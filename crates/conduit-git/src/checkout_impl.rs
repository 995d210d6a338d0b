//! Materializing a tree into a working directory, and resetting the index.

use crate::error::GitError;
use crate::types::GitOid;
use std::path::Path;
use std::sync::{atomic::AtomicBool, Mutex};

fn oid_to_gix(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

/// Remove files under `path` that are not present in `keep` and are not
/// part of git's own admin state (`.git`).
fn remove_stale_files(path: &Path, keep: &gix::index::State) -> Result<(), GitError> {
    let kept_paths: std::collections::HashSet<String> = keep
        .entries()
        .iter()
        .map(|e| e.path(keep).to_string())
        .collect();

    walk_and_prune(path, path, &kept_paths)
}

fn walk_and_prune(
    root: &Path,
    dir: &Path,
    kept_paths: &std::collections::HashSet<String>,
) -> Result<(), GitError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries.filter_map(Result::ok) {
        let entry_path = entry.path();
        if entry.file_name() == ".git" {
            continue;
        }
        let rel = entry_path
            .strip_prefix(root)
            .unwrap_or(&entry_path)
            .to_string_lossy()
            .replace('\\', "/");
        let file_type = entry.file_type().map_err(GitError::Io)?;
        if file_type.is_dir() {
            walk_and_prune(root, &entry_path, kept_paths)?;
            if std::fs::read_dir(&entry_path).map(|mut i| i.next().is_none()).unwrap_or(false) {
                let _ = std::fs::remove_dir(&entry_path);
            }
        } else if !kept_paths.contains(&rel) {
            std::fs::remove_file(&entry_path).map_err(GitError::Io)?;
        }
    }
    Ok(())
}

pub(crate) fn checkout(repo: &Mutex<gix::Repository>, path: &Path, oid: GitOid) -> Result<(), GitError> {
    let guard = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let commit = guard
        .find_commit(oid_to_gix(oid))
        .map_err(|_| GitError::ObjectNotFound { oid })?;
    let tree = commit.tree().map_err(GitError::backend)?;

    let index = gix::index::State::from_tree(&tree.id, &guard.objects, Default::default())
        .map_err(GitError::backend)?;

    std::fs::create_dir_all(path).map_err(GitError::Io)?;
    remove_stale_files(path, &index)?;

    let object_store = guard.objects.clone().into_arc().map_err(GitError::backend)?;
    let mut index_file = gix::index::File::from_state(index, path.join(".git/index"));

    gix::worktree::state::checkout(
        &mut index_file,
        path,
        object_store,
        &gix::progress::Discard,
        &gix::progress::Discard,
        &AtomicBool::new(false),
        gix::worktree::state::checkout::Options::default(),
    )
    .map_err(|e| GitError::CheckoutFailed {
        tree_oid: GitOid::from_bytes(*tree.id.as_bytes().first_chunk::<20>().unwrap_or(&[0; 20])),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(())
}

pub(crate) fn unstage_all(repo: &Mutex<gix::Repository>, path: &Path) -> Result<(), GitError> {
    let guard = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let head_tree_id = guard.head_commit().map_err(GitError::backend)?.tree_id().map_err(GitError::backend)?;
    let state = gix::index::State::from_tree(&head_tree_id, &guard.objects, Default::default())
        .map_err(GitError::backend)?;
    let index_path = path.join(".git/index");
    let mut index_file = gix::index::File::from_state(state, index_path);
    index_file
        .write(gix::index::write::Options::default())
        .map_err(GitError::backend)?;
    Ok(())
}
