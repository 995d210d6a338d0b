//! Backend for Anthropic's Claude Code CLI.

use crate::drive::run_and_collect;
use crate::protocol::{AgentBackend, AgentCapabilities, SessionRequest, TurnContext, TurnOutcome};
use async_trait::async_trait;

/// Drives the `claude` CLI in `--output-format stream-json` mode.
pub struct ClaudeCodeBackend {
    binary: String,
}

impl ClaudeCodeBackend {
    /// Create a backend that invokes `claude` (or another binary name, for
    /// tests that stub the CLI).
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for ClaudeCodeBackend {
    fn default() -> Self {
        Self::new("claude")
    }
}

fn base_args() -> Vec<String> {
    vec![
        "--output-format".to_owned(),
        "stream-json".to_owned(),
        "--verbose".to_owned(),
    ]
}

#[async_trait]
impl AgentBackend for ClaudeCodeBackend {
    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            persistent_sessions: true,
            mid_turn_injection: false,
            interruptible: true,
        }
    }

    async fn run_phase(&self, request: SessionRequest, ctx: TurnContext) -> anyhow::Result<TurnOutcome> {
        let mut args = base_args();
        args.push("--print".to_owned());
        args.push(request.prompt);
        run_and_collect(&self.binary, &args, &request.cwd, None, request.turn_timeout, &ctx).await
    }

    async fn inject_message(
        &self,
        session_id: &str,
        cwd: &std::path::Path,
        message: &str,
        ctx: TurnContext,
    ) -> anyhow::Result<TurnOutcome> {
        let mut args = base_args();
        args.push("--resume".to_owned());
        args.push(session_id.to_owned());
        args.push("--print".to_owned());
        args.push(message.to_owned());
        run_and_collect(&self.binary, &args, cwd, None, None, &ctx).await
    }

    async fn interrupt(&self, child: &mut tokio::process::Child) -> anyhow::Result<()> {
        // The Claude Code CLI has no graceful SIGINT handshake over a pipe;
        // killing the process is the supported way to stop a turn early.
        child.start_kill()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_args_request_streaming_json() {
        let args = base_args();
        assert!(args.contains(&"stream-json".to_owned()));
    }

    #[test]
    fn capabilities_advertise_persistent_sessions() {
        let backend = ClaudeCodeBackend::default();
        assert!(backend.capabilities().persistent_sessions);
    }
}
