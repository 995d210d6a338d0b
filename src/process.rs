//! Generic child-process lifecycle management used by the agent session
//! driver (and available to any other component that shells out).

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};

/// Everything needed to spawn a managed process.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Executable name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Extra environment variables (merged onto the inherited environment).
    pub env: Vec<(String, String)>,
    /// Maximum time the process may run before the supervisor terminates it.
    pub timeout: Option<Duration>,
}

/// Observed lifecycle status of a managed process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    /// `spawn()` has been called but a pid has not yet been confirmed.
    Spawning,
    /// Running.
    Busy,
    /// Exited with status code 0.
    Completed,
    /// Exited with a non-zero code, was killed, or never produced a pid.
    Crashed,
}

/// Aggregate counters across every process this supervisor has managed.
#[derive(Default)]
pub struct ProcessMetrics {
    spawned: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
}

impl ProcessMetrics {
    /// Total processes spawned.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
    /// Total processes that exited with status code 0.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
    /// Total processes that failed to spawn or exited non-zero.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
    /// Processes currently running.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// A spawned, tracked process.
pub struct ManagedProcess {
    child: Child,
    pid: Option<u32>,
    status: ProcessStatus,
}

impl ManagedProcess {
    /// The OS pid, if one was assigned.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current observed status.
    #[must_use]
    pub const fn status(&self) -> ProcessStatus {
        self.status
    }

    /// Take ownership of the underlying tokio `Child` for direct I/O
    /// access (the agent driver reads stdout/stderr itself).
    pub fn into_child(self) -> Child {
        self.child
    }
}

/// Generic process manager: spawn, track, and terminate child processes,
/// with a SIGTERM-then-SIGKILL grace window on timeout.
#[derive(Default)]
pub struct ProcessSupervisor {
    metrics: ProcessMetrics,
}

impl ProcessSupervisor {
    /// Create a supervisor with zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current aggregate metrics.
    #[must_use]
    pub const fn metrics(&self) -> &ProcessMetrics {
        &self.metrics
    }

    /// Spawn a process per `config`.
    ///
    /// # Errors
    /// Returns an error if the OS fails to fork/exec the program, or if no
    /// pid was assigned within the platform's bound.
    pub fn acquire(&self, config: &ProcessConfig) -> anyhow::Result<ManagedProcess> {
        self.metrics.spawned.fetch_add(1, Ordering::Relaxed);

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .current_dir(&config.cwd)
            .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().inspect_err(|_| {
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
        })?;

        let pid = child.id();
        if pid.is_none() {
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("process for '{}' did not receive a pid", config.program);
        }

        self.metrics.active.fetch_add(1, Ordering::Relaxed);
        Ok(ManagedProcess { child, pid, status: ProcessStatus::Spawning })
    }

    /// Record that a tracked process reached a terminal state, updating
    /// aggregate metrics. Call once, after the process has been waited on.
    pub fn record_terminal(&self, exit_code: Option<i32>) {
        self.metrics.active.fetch_sub(1, Ordering::Relaxed);
        if exit_code == Some(0) {
            self.metrics.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Ask `process` to terminate gracefully (SIGTERM on unix, a plain kill
    /// elsewhere), waiting up to `grace` before escalating to SIGKILL.
    ///
    /// # Errors
    /// Returns an error if even the forceful kill fails.
    pub async fn terminate(&self, process: &mut ManagedProcess, grace: Duration) -> anyhow::Result<()> {
        send_sigterm(&process.child);
        let waited = tokio::time::timeout(grace, process.child.wait()).await;
        if waited.is_err() {
            process.child.start_kill()?;
            process.child.wait().await?;
        }
        process.status = ProcessStatus::Crashed;
        Ok(())
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) {
    // No portable graceful-stop signal outside unix; the timeout's escalation
    // to `start_kill()` handles termination instead.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_start_at_zero() {
        let supervisor = ProcessSupervisor::new();
        assert_eq!(supervisor.metrics().spawned(), 0);
        assert_eq!(supervisor.metrics().active(), 0);
    }

    #[tokio::test]
    async fn acquire_true_spawns_and_completes() {
        let supervisor = ProcessSupervisor::new();
        let config = ProcessConfig {
            program: "true".to_owned(),
            args: vec![],
            cwd: std::env::temp_dir(),
            env: vec![],
            timeout: None,
        };
        let mut process = supervisor.acquire(&config).expect("spawn true");
        assert!(process.pid().is_some());
        let status = process.into_child().wait().await.expect("wait");
        supervisor.record_terminal(status.code());
        assert_eq!(supervisor.metrics().completed(), 1);
    }

    #[test]
    fn acquire_nonexistent_binary_fails() {
        let supervisor = ProcessSupervisor::new();
        let config = ProcessConfig {
            program: "this-binary-does-not-exist-conduit".to_owned(),
            args: vec![],
            cwd: std::env::temp_dir(),
            env: vec![],
            timeout: None,
        };
        assert!(supervisor.acquire(&config).is_err());
        assert_eq!(supervisor.metrics().failed(), 1);
    }
}
