//! The backend-facing contract: what it means to drive an agent session.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Which agent implementation a stream is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentKind {
    /// Anthropic's Claude Code CLI.
    ClaudeCode,
    /// OpenAI's Codex CLI.
    Codex,
    /// GitHub Copilot CLI.
    Copilot,
    /// Cursor's agent CLI.
    Cursor,
    /// Google's Gemini CLI.
    Gemini,
    /// The opencode CLI.
    Opencode,
}

impl AgentKind {
    /// All supported kinds, in registry iteration order.
    pub const ALL: [Self; 6] = [
        Self::ClaudeCode,
        Self::Codex,
        Self::Copilot,
        Self::Cursor,
        Self::Gemini,
        Self::Opencode,
    ];

    /// The canonical lowercase, hyphenated name used in config and CLI args.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::Codex => "codex",
            Self::Copilot => "copilot",
            Self::Cursor => "cursor",
            Self::Gemini => "gemini",
            Self::Opencode => "opencode",
        }
    }
}

/// What a backend supports, so the coordinator can validate a stream's
/// requirements (e.g. persistent sessions) before launching it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AgentCapabilities {
    /// The backend can resume a previous session by id.
    pub persistent_sessions: bool,
    /// The backend can receive injected messages mid-turn, not just at
    /// session start.
    pub mid_turn_injection: bool,
    /// The backend responds promptly to an interrupt signal.
    pub interruptible: bool,
}

/// Parameters for starting a new agent session.
#[derive(Clone, Debug)]
pub struct SessionRequest {
    /// Working directory the agent process should run in (the stream's
    /// worktree).
    pub cwd: PathBuf,
    /// The initial prompt/instructions.
    pub prompt: String,
    /// Maximum wall-clock time to allow a single turn to run, if any.
    pub turn_timeout: Option<std::time::Duration>,
}

/// A live or resumed agent session: the handle the coordinator holds while
/// the subprocess runs.
pub struct AgentSession {
    /// The backend-assigned session id, once known (after the first event).
    pub session_id: Option<String>,
    /// Live event stream receiver, `None` once the process has exited.
    pub events: Option<broadcast::Receiver<String>>,
    /// Channel to send raw text into the agent's stdin (for mid-turn
    /// injection), if the backend supports it.
    pub stdin: Option<tokio::sync::mpsc::Sender<String>>,
    /// Handle to the underlying OS process, for interrupt/kill.
    pub child: tokio::process::Child,
}

/// Outcome of a completed agent turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Plain-text transcript assembled from the turn's assistant messages.
    pub transcript: String,
    /// The session id the backend reported, if any.
    pub session_id: Option<String>,
    /// Process exit code, when the process has exited.
    pub exit_code: Option<i32>,
}

/// Where a running turn forwards its output as it arrives, so watchers see
/// incremental progress instead of one batch update once the whole turn
/// finishes.
pub trait TurnSink: Send + Sync {
    /// One raw NDJSON line, forwarded verbatim in the order the agent
    /// emitted it.
    fn on_frame(&self, raw: &str);
    /// A record the drive loop just finished coalescing (a complete message
    /// or a complete tool call), ready to persist as the next replay-log
    /// entry.
    fn on_record(&self, record: crate::event::CoalescedRecord);
}

/// Everything a turn needs to report progress and respond to cancellation,
/// bundled so adding either doesn't change every backend's call signature.
#[derive(Clone)]
pub struct TurnContext {
    /// Where to forward frames and coalesced records.
    pub sink: Arc<dyn TurnSink>,
    /// Cancelled to request a cooperative stop of the turn in progress.
    pub cancel: CancellationToken,
    /// How long to wait after `cancel` fires before killing the subprocess
    /// outright.
    pub grace_period: std::time::Duration,
}

/// A driver for one kind of coding agent subprocess.
///
/// Implementations own the CLI invocation details (args, env, NDJSON
/// framing) for a specific agent product; the coordinator only depends on
/// this trait.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// What this backend can do.
    fn capabilities(&self) -> AgentCapabilities;

    /// Start a brand-new session and run it to completion (or until
    /// `turn_timeout` elapses).
    async fn run_phase(&self, request: SessionRequest, ctx: TurnContext) -> anyhow::Result<TurnOutcome>;

    /// Resume a previously-created session by id and send it a new message.
    ///
    /// Only called when [`AgentCapabilities::persistent_sessions`] is true.
    async fn inject_message(
        &self,
        session_id: &str,
        cwd: &std::path::Path,
        message: &str,
        ctx: TurnContext,
    ) -> anyhow::Result<TurnOutcome>;

    /// Ask a running session to stop what it's doing without killing the
    /// process outright, when the backend supports it; otherwise this is
    /// equivalent to a hard kill.
    async fn interrupt(&self, child: &mut tokio::process::Child) -> anyhow::Result<()>;
}
