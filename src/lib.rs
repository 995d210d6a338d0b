//! Conduit: a control-plane engine that drives coding-agent subprocesses
//! against isolated git worktrees, merges their structured-record output,
//! and lands reviewed checkpoints through a per-target merge queue with
//! dependent-stream cascade.

pub mod agent_session;
pub mod cascade;
pub mod checkpoint_flow;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod merge;
pub mod model;
pub mod process;
pub mod queue_engine;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod transport;
pub mod worktree;

pub use coordinator::{ExecutionContext, ExecutionCoordinator, ExecutionFilter};
pub use error::EngineError;
