//! Linked worktree lifecycle: add, remove, enumerate.

use crate::checkout_impl;
use crate::error::GitError;
use crate::types::{GitOid, RefName, WorktreeInfo};
use std::path::{Path, PathBuf};
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

pub(crate) fn add_worktree(
    repo: &Mutex<gix::Repository>,
    repo_root: &Path,
    path: &Path,
    branch_ref: &RefName,
    oid: GitOid,
) -> Result<WorktreeInfo, GitError> {
    if path.exists() {
        return Err(GitError::WorktreeFailed {
            path: path.to_path_buf(),
            reason: "target path already exists".into(),
        });
    }
    std::fs::create_dir_all(path).map_err(GitError::Io)?;

    {
        let guard = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .find_commit(oid_to_gix(oid))
            .map_err(|_| GitError::ObjectNotFound { oid })?;
    }

    // Record the linked worktree the way `git worktree add` does: a
    // directory under `$GIT_DIR/worktrees/<name>` holding a gitdir/HEAD
    // pointer, plus a `.git` file in the new worktree pointing back at it.
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("worktree")
        .to_owned();
    let git_dir = repo_root.join(".git");
    let admin_dir = git_dir.join("worktrees").join(&name);
    std::fs::create_dir_all(&admin_dir).map_err(GitError::Io)?;
    std::fs::write(
        admin_dir.join("gitdir"),
        format!("{}\n", path.join(".git").display()),
    )
    .map_err(GitError::Io)?;
    std::fs::write(admin_dir.join("HEAD"), format!("{branch_ref}\n"))
        .map_err(GitError::Io)?;
    std::fs::write(
        path.join(".git"),
        format!("gitdir: {}\n", admin_dir.display()),
    )
    .map_err(GitError::Io)?;

    checkout_impl::checkout(repo, path, oid)?;

    Ok(WorktreeInfo {
        name,
        path: path.to_path_buf(),
        head_oid: Some(oid),
        is_detached: false,
    })
}

pub(crate) fn remove_worktree(
    _repo: &Mutex<gix::Repository>,
    path: &Path,
    force: bool,
) -> Result<(), GitError> {
    if !path.exists() {
        return Ok(());
    }
    if !force {
        let status_clean = std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_none() || entries_are_only_git_dir(path))
            .unwrap_or(true);
        if !status_clean {
            return Err(GitError::WorktreeFailed {
                path: path.to_path_buf(),
                reason: "worktree has uncommitted state; pass force to remove anyway".into(),
            });
        }
    }
    std::fs::remove_dir_all(path).map_err(|e| GitError::WorktreeFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn entries_are_only_git_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .all(|e| e.file_name() == ".git")
        })
        .unwrap_or(false)
}

pub(crate) fn list_worktrees(repo: &Mutex<gix::Repository>) -> Result<Vec<WorktreeInfo>, GitError> {
    let guard = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let work_dir = guard.work_dir().map(Path::to_path_buf);
    let mut out = Vec::new();

    if let Some(main_path) = work_dir {
        let head_oid = guard.head_id().ok().map(|id| gix_to_oid(id.detach()));
        out.push(WorktreeInfo {
            name: "main".to_owned(),
            path: main_path,
            head_oid,
            is_detached: guard.head_ref().ok().flatten().is_none(),
        });
    }

    let git_dir = guard.git_dir();
    let worktrees_dir = git_dir.join("worktrees");
    if let Ok(entries) = std::fs::read_dir(&worktrees_dir) {
        for entry in entries.filter_map(Result::ok) {
            let admin_dir = entry.path();
            let Ok(gitdir_contents) = std::fs::read_to_string(admin_dir.join("gitdir")) else {
                continue;
            };
            let dot_git = PathBuf::from(gitdir_contents.trim());
            let Some(worktree_path) = dot_git.parent().map(Path::to_path_buf) else {
                continue;
            };
            out.push(WorktreeInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: worktree_path,
                head_oid: None,
                is_detached: false,
            });
        }
    }

    Ok(out)
}
