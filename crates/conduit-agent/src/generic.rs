//! Fallback backend shared by agent kinds without a dedicated, protocol-
//! accurate implementation (Copilot, Cursor, Gemini, opencode).
//!
//! Assumes the same NDJSON `stream-json` contract as Claude Code until one
//! of these kinds earns a dedicated backend.

use crate::drive::run_and_collect;
use crate::protocol::{AgentBackend, AgentCapabilities, SessionRequest, TurnContext, TurnOutcome};
use async_trait::async_trait;

/// A backend that invokes an arbitrary CLI binary with a caller-supplied
/// argument template, assuming NDJSON output on stdout.
pub struct GenericBackend {
    binary: String,
    extra_args: Vec<String>,
}

impl GenericBackend {
    /// Create a generic backend for `binary`, passing `extra_args` before
    /// the prompt on every invocation.
    #[must_use]
    pub fn new(binary: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args,
        }
    }
}

#[async_trait]
impl AgentBackend for GenericBackend {
    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            persistent_sessions: false,
            mid_turn_injection: false,
            interruptible: true,
        }
    }

    async fn run_phase(&self, request: SessionRequest, ctx: TurnContext) -> anyhow::Result<TurnOutcome> {
        let mut args = self.extra_args.clone();
        args.push(request.prompt);
        run_and_collect(&self.binary, &args, &request.cwd, None, request.turn_timeout, &ctx).await
    }

    async fn inject_message(
        &self,
        _session_id: &str,
        _cwd: &std::path::Path,
        _message: &str,
        _ctx: TurnContext,
    ) -> anyhow::Result<TurnOutcome> {
        anyhow::bail!("this agent kind does not support resuming a prior session")
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
    fn run_phase_appends_prompt_after_extra_args() {
        let backend = GenericBackend::new("some-cli", vec!["--json".to_owned()]);
        assert_eq!(backend.extra_args, vec!["--json".to_owned()]);
    }
}
