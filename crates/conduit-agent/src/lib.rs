//! Agent session protocol and backends for conduit.
//!
//! [`protocol::AgentBackend`] is the seam between the coordinator and a
//! concrete coding-agent CLI. [`registry::AgentRegistry`] resolves an
//! [`protocol::AgentKind`] to its backend.

mod claude;
mod codex;
mod drive;
pub mod event;
mod generic;
pub mod protocol;
pub mod registry;

pub use claude::ClaudeCodeBackend;
pub use codex::CodexBackend;
pub use generic::GenericBackend;
pub use protocol::{AgentBackend, AgentCapabilities, AgentKind, AgentSession, SessionRequest, TurnContext, TurnOutcome, TurnSink};
pub use registry::AgentRegistry;
