//! `conduit`: a thin command-line front end over the engine library, for
//! local use outside the HTTP/WebSocket transport.

mod doctor;

use clap::{Parser, Subcommand};
use conduit::config::EngineConfig;
use conduit::coordinator::{ExecutionContext, ExecutionCoordinator};
use conduit::store::InMemoryStore;
use conduit::transport::BroadcastEventSink;
use conduit::worktree::WorktreeManager;
use conduit_agent::{AgentKind, AgentRegistry};
use conduit_git::GixRepo;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "conduit", about = "Drive coding agents against isolated git worktrees")]
struct Cli {
    /// Project root; defaults to the current directory.
    #[arg(long, global = true, env = "CONDUIT_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the tools a session needs are installed and on PATH.
    Doctor,
    /// Start a one-shot execution and print its final status.
    Run {
        /// The prompt to give the agent.
        prompt: String,
        /// Which agent product to drive.
        #[arg(long, value_enum, default_value = "claude-code")]
        agent: CliAgentKind,
        /// Branch the stream will eventually land on.
        #[arg(long, default_value = "main")]
        target: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliAgentKind {
    ClaudeCode,
    Codex,
    Copilot,
    Cursor,
    Gemini,
    Opencode,
}

impl From<CliAgentKind> for AgentKind {
    fn from(kind: CliAgentKind) -> Self {
        match kind {
            CliAgentKind::ClaudeCode => Self::ClaudeCode,
            CliAgentKind::Codex => Self::Codex,
            CliAgentKind::Copilot => Self::Copilot,
            CliAgentKind::Cursor => Self::Cursor,
            CliAgentKind::Gemini => Self::Gemini,
            CliAgentKind::Opencode => Self::Opencode,
        }
    }
}

fn main() -> ExitCode {
    let _telemetry = conduit::telemetry::init_noop();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("conduit: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Command::Doctor => doctor::run(),
        Command::Run { prompt, agent, target } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_execution(cli.project_root, prompt, agent.into(), target))
        }
    }
}

async fn run_execution(project_root: Option<PathBuf>, prompt: String, agent: AgentKind, target: String) -> anyhow::Result<bool> {
    let project_root = project_root.unwrap_or(std::env::current_dir()?);
    let repo: Arc<dyn conduit_git::GitRepo> = Arc::new(GixRepo::open(&project_root)?);
    let store: Arc<dyn conduit::store::Store> = Arc::new(InMemoryStore::new());
    let config = EngineConfig::load(&project_root.join("conduit.toml"))?;
    let worktrees = Arc::new(WorktreeManager::new(repo.clone(), project_root.clone(), config.worktree.clone()));
    let registry = Arc::new(AgentRegistry::default_registry());
    let events: Arc<dyn conduit::transport::EventSink> = Arc::new(BroadcastEventSink::new());
    let sessions = Arc::new(conduit::agent_session::AgentSessionDriver::new(registry, events.clone(), store.clone(), config.session.clone()));
    let sync = Arc::new(conduit::sync::SyncEngine::new(repo.clone(), project_root.clone(), config.merge.clone()));
    let queue = Arc::new(conduit::queue_engine::MergeQueue::new(store.clone(), sync.clone(), events.clone()));
    let cascade = Arc::new(conduit::cascade::CascadeEngine::new(store.clone(), sync.clone(), repo.clone(), events.clone()));
    let checkpoints = Arc::new(conduit::checkpoint_flow::CheckpointFlow::new(
        store.clone(),
        repo.clone(),
        sync,
        queue,
        cascade,
        config.queue.clone(),
        config.cascade.trigger_on_land,
    ));
    let coordinator = ExecutionCoordinator::new(store, repo, worktrees, sessions, events, checkpoints, config);

    let execution = coordinator
        .create_execution(None, agent, conduit::model::ExecutionMode::Worktree, prompt, ExecutionContext { target_branch: Some(target) })
        .await?;

    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "execution_id": execution.id.to_string(),
        "status": format!("{:?}", execution.status),
    }))?);

    Ok(true)
}
