//! Backend for OpenAI's Codex CLI.

use crate::drive::run_and_collect;
use crate::protocol::{AgentBackend, AgentCapabilities, SessionRequest, TurnContext, TurnOutcome};
use async_trait::async_trait;

/// Drives the `codex` CLI in its experimental JSON-lines mode.
pub struct CodexBackend {
    binary: String,
}

impl CodexBackend {
    /// Create a backend that invokes `codex` (or another binary name, for
    /// tests that stub the CLI).
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for CodexBackend {
    fn default() -> Self {
        Self::new("codex")
    }
}

#[async_trait]
impl AgentBackend for CodexBackend {
    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            persistent_sessions: false,
            mid_turn_injection: false,
            interruptible: true,
        }
    }

    async fn run_phase(&self, request: SessionRequest, ctx: TurnContext) -> anyhow::Result<TurnOutcome> {
        let args = vec![
            "exec".to_owned(),
            "--json".to_owned(),
            "--skip-git-repo-check".to_owned(),
            request.prompt,
        ];
        run_and_collect(&self.binary, &args, &request.cwd, None, request.turn_timeout, &ctx).await
    }

    async fn inject_message(
        &self,
        _session_id: &str,
        _cwd: &std::path::Path,
        _message: &str,
        _ctx: TurnContext,
    ) -> anyhow::Result<TurnOutcome> {
        anyhow::bail!("codex backend does not support resuming a prior session")
    }

    async fn interrupt(&self, child: &mut tokio::process::Child) -> anyhow::Result<()> {
        child.start_kill()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_do_not_advertise_persistent_sessions() {
        let backend = CodexBackend::default();
        assert!(!backend.capabilities().persistent_sessions);
    }
}
