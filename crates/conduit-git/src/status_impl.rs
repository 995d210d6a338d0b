//! Working-tree status relative to HEAD.

use crate::error::GitError;
use crate::types::{FileStatus, StatusEntry};
use std::path::Path;
use std::sync::Mutex;

pub(crate) fn status(repo: &Mutex<gix::Repository>, path: &Path) -> Result<Vec<StatusEntry>, GitError> {
    let guard = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

    let head_tree_id = guard.head_commit().map_err(GitError::backend)?.tree_id().map_err(GitError::backend)?;
    let mut head_files = std::collections::BTreeMap::new();
    crate::diff_impl::flatten(&guard, head_tree_id.detach(), "", &mut head_files)?;

    let mut disk_files = std::collections::BTreeSet::new();
    walk_disk(path, path, &mut disk_files)?;

    let mut out = Vec::new();
    for file in &disk_files {
        if !head_files.contains_key(file) {
            out.push(StatusEntry {
                path: file.clone(),
                status: FileStatus::Untracked,
            });
        }
    }
    for (file, &head_oid) in &head_files {
        let full_path = path.join(file);
        match std::fs::read(&full_path) {
            Ok(contents) => {
                let working_oid = guard.write_blob(&contents).map_err(GitError::backend)?;
                let working_oid_bytes: [u8; 20] = working_oid
                    .as_bytes()
                    .try_into()
                    .unwrap_or_else(|_| panic!("non-SHA1 object id"));
                if crate::types::GitOid::from_bytes(working_oid_bytes) != head_oid {
                    out.push(StatusEntry {
                        path: file.clone(),
                        status: FileStatus::Modified,
                    });
                }
            }
            Err(_) => out.push(StatusEntry {
                path: file.clone(),
                status: FileStatus::Deleted,
            }),
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

fn walk_disk(
    root: &Path,
    dir: &Path,
    out: &mut std::collections::BTreeSet<String>,
) -> Result<(), GitError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries.filter_map(Result::ok) {
        if entry.file_name() == ".git" {
            continue;
        }
        let entry_path = entry.path();
        let file_type = entry.file_type().map_err(GitError::Io)?;
        if file_type.is_dir() {
            walk_disk(root, &entry_path, out)?;
        } else {
            let rel = entry_path
                .strip_prefix(root)
                .unwrap_or(&entry_path)
                .to_string_lossy()
                .replace('\\', "/");
            out.insert(rel);
        }
    }
    Ok(())
}
