//! Engine configuration: `#[serde(deny_unknown_fields)]` sections with
//! `Default` impls, so a missing config file means "use defaults," never an
//! error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level engine configuration, typically loaded from a TOML file at the
/// project root.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Worktree allocation settings.
    pub worktree: WorktreeConfig,
    /// Structured-file merge behavior.
    pub merge: MergeConfig,
    /// Merge-queue behavior.
    pub queue: QueueConfig,
    /// Cascade behavior.
    pub cascade: CascadeConfig,
    /// Persistent-session idle/disconnect behavior.
    pub session: SessionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worktree: WorktreeConfig::default(),
            merge: MergeConfig::default(),
            queue: QueueConfig::default(),
            cascade: CascadeConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Where and how per-stream worktrees are allocated.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorktreeConfig {
    /// Directory under which all stream worktrees are created.
    pub storage_root: PathBuf,
    /// Backend used to materialize a worktree.
    pub backend: WorktreeBackendKind,
    /// Dot-directory config file names to propagate from the project root
    /// into each new worktree (e.g. `.claude/settings.json`).
    pub propagated_config_files: Vec<String>,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(".conduit/worktrees"),
            backend: WorktreeBackendKind::GitWorktree,
            propagated_config_files: vec![".claude/settings.json".to_owned(), ".mcp.json".to_owned()],
        }
    }
}

fn default_true() -> bool {
    true
}

/// How a stream's working directory is materialized.
///
/// Only [`Self::GitWorktree`] is implemented today; the remaining variants
/// are carried ahead of their implementation the way the teacher's own
/// backend-kind enum carries planned-but-unbuilt variants, and are rejected
/// with [`crate::error::EngineError::Validation`] if selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorktreeBackendKind {
    /// Pick the best backend available on this platform. Currently always
    /// resolves to `GitWorktree`.
    Auto,
    /// `git worktree add`-style linked worktrees (implemented).
    GitWorktree,
    /// Copy-on-write clone of the project root (reserved).
    Reflink,
    /// Union-mount overlay (reserved).
    Overlay,
    /// Plain recursive copy (reserved).
    Copy,
}

/// Structured-file merger behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MergeConfig {
    /// When true, ID collisions are resolved by renumbering the newer
    /// entity; when false, colliding imports are skipped and reported.
    pub resolve_collisions: bool,
    /// Directory (relative to project root) whose files are treated as
    /// structured records rather than code, for conflict classification.
    pub structured_file_dir: PathBuf,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            resolve_collisions: true,
            structured_file_dir: PathBuf::from(".conduit/records"),
        }
    }
}

/// Merge-queue behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QueueConfig {
    /// Whether the merge queue is consulted at all; when false, checkpoints
    /// land synchronously on promote/sync.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Cascade-rebase behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CascadeConfig {
    /// Whether a successful landing automatically triggers cascade of
    /// dependent streams. Recorded as an explicit decision in `DESIGN.md`
    /// since the distilled spec leaves the default undocumented.
    pub trigger_on_land: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self { trigger_on_land: true }
    }
}

/// Persistent-session idle and disconnect behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    /// Milliseconds of inactivity in `waiting` before the session is ended
    /// automatically. `None` disables the idle timer (the default).
    pub idle_timeout_ms: Option<u64>,
    /// End the session automatically when the last transport subscriber
    /// disconnects.
    pub end_on_disconnect: bool,
    /// Milliseconds to wait for the agent subprocess to exit on its own
    /// after a cancel request before killing it outright.
    pub cancel_grace_period_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: None,
            end_on_disconnect: false,
            cancel_grace_period_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let config = EngineConfig::load(std::path::Path::new("/nonexistent/conduit.toml")).expect("defaults");
        assert!(config.queue.enabled);
    }

    #[test]
    fn parses_partial_toml_with_defaults_filling_gaps() {
        let toml_str = "[merge]\nresolve_collisions = false\n";
        let config: EngineConfig = toml::from_str(toml_str).expect("parse");
        assert!(!config.merge.resolve_collisions);
        assert!(config.queue.enabled);
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let toml_str = "[nonsense]\nfoo = 1\n";
        assert!(toml::from_str::<EngineConfig>(toml_str).is_err());
    }
}
