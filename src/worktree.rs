//! Allocates, reuses, and deletes per-stream working directories.

use crate::config::WorktreeConfig;
use crate::error::EngineError;
use crate::model::{ExecutionId, StreamId};
use conduit_git::{GitOid, GitRepo, RefName};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Allocates, reuses, and garbage-collects per-stream worktrees.
pub struct WorktreeManager {
    repo: std::sync::Arc<dyn GitRepo>,
    config: WorktreeConfig,
    project_root: PathBuf,
    by_stream: Mutex<std::collections::HashMap<StreamId, PathBuf>>,
}

impl WorktreeManager {
    /// Create a manager rooted at `project_root`, storing worktrees under
    /// `config.storage_root` (resolved relative to `project_root` if it's a
    /// relative path).
    #[must_use]
    pub fn new(repo: std::sync::Arc<dyn GitRepo>, project_root: PathBuf, config: WorktreeConfig) -> Self {
        Self {
            repo,
            config,
            project_root,
            by_stream: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn storage_root(&self) -> PathBuf {
        if self.config.storage_root.is_absolute() {
            self.config.storage_root.clone()
        } else {
            self.project_root.join(&self.config.storage_root)
        }
    }

    fn path_for(&self, stream_id: StreamId) -> PathBuf {
        self.storage_root().join(stream_id.to_string())
    }

    /// Allocate (or return the existing) worktree directory for `stream_id`,
    /// branched from `target_branch`'s current tip.
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] if `config.backend` names a
    /// backend other than `git-worktree` (the only one implemented), or
    /// propagates a git failure.
    pub fn acquire(&self, stream_id: StreamId, target_branch: &str) -> Result<PathBuf, EngineError> {
        if self.config.backend != crate::config::WorktreeBackendKind::GitWorktree
            && self.config.backend != crate::config::WorktreeBackendKind::Auto
        {
            return Err(EngineError::Validation {
                field: "worktree.backend".into(),
                reason: format!("{:?} is reserved for future use; only git-worktree is implemented", self.config.backend),
            });
        }

        {
            let by_stream = self.by_stream.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(path) = by_stream.get(&stream_id) {
                if path.exists() {
                    return Ok(path.clone());
                }
            }
        }

        let path = self.path_for(stream_id);
        if path.exists() {
            self.by_stream
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(stream_id, path.clone());
            return Ok(path);
        }
        if path_is_inside(&self.project_root, &path) || self.is_inside_existing_worktree(&path) {
            return Err(EngineError::Validation {
                field: "worktree.path".into(),
                reason: "refusing to create a worktree inside another worktree or the project root".into(),
            });
        }

        let target_ref = parse_ref_name(&format!("refs/heads/{target_branch}"))?;
        let tip = self.repo.resolve_ref(&target_ref)?;
        let branch_ref = parse_ref_name(&format!("refs/conduit/streams/{stream_id}"))?;
        self.repo.update_refs(&[conduit_git::RefEdit {
            name: branch_ref.clone(),
            new_oid: tip,
            expected_old_oid: GitOid::ZERO,
        }])?;
        self.repo.add_worktree(&path, &branch_ref, tip)?;

        self.by_stream
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(stream_id, path.clone());
        Ok(path)
    }

    fn is_inside_existing_worktree(&self, candidate: &Path) -> bool {
        self.repo
            .list_worktrees()
            .map(|worktrees| worktrees.iter().any(|w| path_is_inside(&w.path, candidate)))
            .unwrap_or(false)
    }

    /// `true` if a worktree directory for `stream_id` currently exists on disk.
    #[must_use]
    pub fn exists(&self, stream_id: StreamId) -> bool {
        self.path_for(stream_id).exists()
    }

    /// Remove the worktree for `stream_id`, if any. Safe to call on a
    /// stream with no worktree.
    ///
    /// # Errors
    /// Propagates a git failure removing the worktree registration.
    pub fn delete(&self, stream_id: StreamId) -> Result<(), EngineError> {
        let path = self.path_for(stream_id);
        if path.exists() {
            self.repo.remove_worktree(&path, true)?;
        }
        self.by_stream
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&stream_id);
        Ok(())
    }

    /// Copy configured dot-files from the project root into a worktree, so
    /// the agent sees the same per-project configuration there. A missing
    /// source file is not an error.
    pub fn propagate_agent_config(&self, worktree_path: &Path) -> std::io::Result<()> {
        for rel in &self.config.propagated_config_files {
            let source = self.project_root.join(rel);
            if !source.exists() {
                continue;
            }
            let dest = worktree_path.join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&source, &dest)?;
        }
        Ok(())
    }

    /// List every worktree directory this manager currently knows about.
    #[must_use]
    pub fn list(&self) -> Vec<PathBuf> {
        self.by_stream
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Remove worktrees on disk under the storage root that are not
    /// referenced by any of `live_streams`. Intended to run once at startup.
    ///
    /// # Errors
    /// Propagates a git failure removing an orphaned worktree.
    pub fn collect_orphans(&self, live_streams: &HashSet<StreamId>) -> Result<Vec<PathBuf>, EngineError> {
        let root = self.storage_root();
        let mut removed = Vec::new();
        let Ok(entries) = std::fs::read_dir(&root) else {
            return Ok(removed);
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else { continue };
            let is_live = live_streams.iter().any(|id| id.to_string() == name);
            if !is_live {
                self.repo.remove_worktree(&path, true)?;
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Also removes the execution's worktree via its owning stream. Exposed
    /// for the coordinator's terminal-execution cleanup path.
    ///
    /// # Errors
    /// Propagates a git failure.
    pub fn delete_for_execution(&self, _execution_id: ExecutionId, stream_id: StreamId) -> Result<(), EngineError> {
        self.delete(stream_id)
    }
}

fn path_is_inside(parent: &Path, candidate: &Path) -> bool {
    candidate.starts_with(parent) && candidate != parent
}

fn parse_ref_name(name: &str) -> Result<RefName, EngineError> {
    RefName::new(name).map_err(|e| EngineError::Validation {
        field: "ref".into(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_inside_detects_nesting() {
        assert!(path_is_inside(Path::new("/a"), Path::new("/a/b")));
        assert!(!path_is_inside(Path::new("/a"), Path::new("/a")));
        assert!(!path_is_inside(Path::new("/a"), Path::new("/b")));
    }
}
