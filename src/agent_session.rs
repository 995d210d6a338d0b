//! Drives one execution's agent subprocess: starts or resumes it, injects
//! the well-known MCP server entry, coalesces its output into events, and
//! tracks discrete-vs-persistent lifecycle (idle timer, pause, interrupt).

use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::model::{Execution, ExecutionId, ExecutionStatus};
use crate::store::Store;
use crate::transport::{Event, EventSink};
use conduit_agent::event::CoalescedRecord;
use conduit_agent::{AgentRegistry, SessionRequest, TurnContext, TurnOutcome, TurnSink};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The MCP server entry every worktree's `.mcp.json` gets, so agents can
/// reach the control-plane tools without per-project configuration.
pub(crate) const MCP_SERVER_NAME: &str = "sudocode-mcp";
const MCP_SERVER_COMMAND: &str = "sudocode-mcp";

/// Outcome of driving one execution's agent turn to completion.
pub struct SessionOutcome {
    /// The status the execution should move to.
    pub status: ExecutionStatus,
    /// The transcript produced by the turn.
    pub transcript: String,
    /// The backend-assigned session id, if one is now known.
    pub session_id: Option<String>,
    /// Error detail, set when `status` is `Failed` or `Crashed`.
    pub error: Option<String>,
}

/// Forwards one execution's turn output to the transport (raw frames, as
/// they arrive) and to the store (coalesced records, as the replay log).
struct Forwarder {
    execution_id: ExecutionId,
    events: Arc<dyn EventSink>,
    store: Arc<dyn Store>,
}

impl TurnSink for Forwarder {
    fn on_frame(&self, raw: &str) {
        self.events.publish(self.execution_id, Event::SessionUpdate { payload: raw.to_owned() });
    }

    fn on_record(&self, record: CoalescedRecord) {
        let entry = serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_owned());
        self.store.append_session_log(self.execution_id, entry);
    }
}

/// Drives agent subprocesses on behalf of the coordinator.
pub struct AgentSessionDriver {
    registry: Arc<AgentRegistry>,
    events: Arc<dyn EventSink>,
    store: Arc<dyn Store>,
    session_config: SessionConfig,
    /// Cancellation tokens for turns currently in flight, keyed by
    /// execution id; removed once the turn returns.
    cancellations: Mutex<HashMap<ExecutionId, CancellationToken>>,
}

impl AgentSessionDriver {
    /// Build a driver over a shared backend registry, event sink, and
    /// store (the replay log lives in the store, alongside everything
    /// else the engine persists).
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>, events: Arc<dyn EventSink>, store: Arc<dyn Store>, session_config: SessionConfig) -> Self {
        Self { registry, events, store, session_config, cancellations: Mutex::new(HashMap::new()) }
    }

    /// Run one turn for `execution`: a fresh session if it has none yet, or
    /// a resumed one via `inject_message` if it does and the backend
    /// supports persistence.
    ///
    /// # Errors
    /// Returns [`EngineError::MissingDependency`] if no backend is
    /// registered for the execution's agent kind, or the MCP tool server
    /// is not on `PATH`; returns [`EngineError::Crashed`] if the subprocess
    /// fails to run.
    pub async fn run_turn(&self, execution: &Execution, worktree: &Path) -> Result<SessionOutcome, EngineError> {
        let backend = self.registry.get(execution.agent_kind).ok_or_else(|| EngineError::MissingDependency {
            tool: execution.agent_kind.as_str().to_owned(),
        })?;

        if !mcp_server_discoverable() {
            return Err(EngineError::MissingDependency { tool: MCP_SERVER_NAME.to_owned() });
        }

        inject_mcp_config(worktree).map_err(|e| EngineError::Validation {
            field: "worktree.mcp_config".into(),
            reason: e.to_string(),
        })?;

        self.events.publish(execution.id, Event::RunStarted);

        let cancel = CancellationToken::new();
        self.cancellations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(execution.id, cancel.clone());

        let ctx = TurnContext {
            sink: Arc::new(Forwarder { execution_id: execution.id, events: self.events.clone(), store: self.store.clone() }),
            cancel,
            grace_period: Duration::from_millis(self.session_config.cancel_grace_period_ms),
        };

        let capabilities = backend.capabilities();
        let outcome: anyhow::Result<TurnOutcome> = match &execution.session_id {
            Some(session_id) if capabilities.persistent_sessions => {
                backend.inject_message(session_id, worktree, &execution.prompt, ctx).await
            }
            _ => {
                backend
                    .run_phase(
                        SessionRequest {
                            cwd: worktree.to_path_buf(),
                            prompt: execution.prompt.clone(),
                            turn_timeout: None,
                        },
                        ctx,
                    )
                    .await
            }
        };

        self.cancellations.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&execution.id);

        match outcome {
            Ok(turn) => {
                let status = self.status_after_turn(execution.id, capabilities.persistent_sessions, turn.exit_code);
                Ok(SessionOutcome {
                    status,
                    transcript: turn.transcript,
                    session_id: turn.session_id,
                    error: None,
                })
            }
            Err(e) => {
                self.events.publish(execution.id, Event::RunFinished { status: "crashed".into() });
                Ok(SessionOutcome {
                    status: ExecutionStatus::Crashed,
                    transcript: String::new(),
                    session_id: None,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    /// Cooperatively cancel `execution_id`'s in-flight turn, if any: the
    /// drive loop stops reading immediately and the subprocess is killed
    /// after the configured grace period if it hasn't exited by then. A
    /// no-op if no turn is currently running for this execution.
    pub fn cancel(&self, execution_id: ExecutionId) {
        if let Some(token) = self.cancellations.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(&execution_id) {
            token.cancel();
        }
    }

    fn status_after_turn(&self, execution_id: ExecutionId, persistent: bool, exit_code: Option<i32>) -> ExecutionStatus {
        if !persistent {
            let status = if exit_code.is_none_or(|c| c == 0) { ExecutionStatus::Completed } else { ExecutionStatus::Failed };
            self.events.publish(execution_id, Event::RunFinished { status: format!("{status:?}").to_lowercase() });
            return status;
        }
        self.events.publish(execution_id, Event::SessionWaiting);
        ExecutionStatus::Waiting
    }

    /// Pause a persistent session: no idle timer runs while paused.
    pub fn pause(&self, execution_id: ExecutionId) {
        self.events.publish(execution_id, Event::SessionPaused);
    }

    /// End a persistent session for good (explicit stop, idle timeout, or
    /// last-subscriber disconnect when `end_on_disconnect` is set).
    pub fn end(&self, execution_id: ExecutionId) {
        self.events.publish(execution_id, Event::SessionEnded);
        self.events.end(execution_id);
    }

    /// Whether ending on last-subscriber-disconnect is enabled.
    #[must_use]
    pub const fn ends_on_disconnect(&self) -> bool {
        self.session_config.end_on_disconnect
    }

    /// The idle timeout before an auto-end of a `waiting` session, if configured.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.session_config.idle_timeout_ms.map(Duration::from_millis)
    }
}

/// Whether the MCP tool server binary is discoverable on `PATH`. Mirrors
/// `conduit doctor`'s probe, so an execution fails the same way a `doctor`
/// run would have warned about, rather than spawning an agent that can
/// never reach its tool server.
pub(crate) fn mcp_server_discoverable() -> bool {
    std::process::Command::new(MCP_SERVER_COMMAND)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

/// Merge the well-known MCP server entry into `<worktree>/.mcp.json`,
/// preserving any entries already present.
fn inject_mcp_config(worktree: &Path) -> std::io::Result<()> {
    let path = worktree.join(".mcp.json");
    let mut doc: Value = match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|_| json!({})),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => json!({}),
        Err(e) => return Err(e),
    };
    if !doc.is_object() {
        doc = json!({});
    }

    let servers = doc
        .as_object_mut()
        .expect("just normalized to an object")
        .entry("mcpServers")
        .or_insert_with(|| json!({}));
    if let Some(servers) = servers.as_object_mut() {
        servers
            .entry(MCP_SERVER_NAME)
            .or_insert_with(|| json!({ "command": MCP_SERVER_COMMAND }));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_mcp_config_creates_file_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        inject_mcp_config(dir.path()).expect("inject");
        let contents = std::fs::read_to_string(dir.path().join(".mcp.json")).expect("read");
        assert!(contents.contains(MCP_SERVER_NAME));
        assert!(contents.contains(MCP_SERVER_COMMAND));
    }

    #[test]
    fn inject_mcp_config_preserves_existing_servers() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(".mcp.json"),
            r#"{"mcpServers":{"other-tool":{"command":"other"}}}"#,
        )
        .expect("seed");
        inject_mcp_config(dir.path()).expect("inject");
        let contents = std::fs::read_to_string(dir.path().join(".mcp.json")).expect("read");
        let doc: Value = serde_json::from_str(&contents).expect("parse");
        let servers = doc["mcpServers"].as_object().expect("servers");
        assert!(servers.contains_key("other-tool"));
        assert!(servers.contains_key(MCP_SERVER_NAME));
    }

    #[test]
    fn inject_mcp_config_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        inject_mcp_config(dir.path()).expect("first");
        inject_mcp_config(dir.path()).expect("second");
        let contents = std::fs::read_to_string(dir.path().join(".mcp.json")).expect("read");
        assert_eq!(contents.matches(MCP_SERVER_NAME).count(), 1);
    }
}
