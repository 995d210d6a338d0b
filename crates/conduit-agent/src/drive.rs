//! Shared subprocess-driving loop used by every NDJSON-speaking backend.
//!
//! Each backend differs only in binary name and CLI argument shape; the
//! spawn/stream/coalesce/cancel machinery is identical, so it lives here
//! once rather than being copied into `claude.rs`, `codex.rs`, and
//! `generic.rs`.

use crate::event::{parse_line, parse_stream, Coalescer};
use crate::protocol::{TurnContext, TurnOutcome};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Run `program args...` in `cwd`, feeding `stdin_payload` (if any) on
/// stdin, forwarding each NDJSON line to `ctx.sink` as it arrives,
/// coalescing it into a transcript, logging stderr, and enforcing `timeout`
/// over the whole interaction.
///
/// `ctx.cancel` is checked on every iteration of the read loop: firing it
/// stops reading immediately (the cooperative half of cancellation), after
/// which the subprocess is given `ctx.grace_period` to exit on its own
/// before being killed outright.
pub(crate) async fn run_and_collect(
    program: &str,
    args: &[String],
    cwd: &Path,
    stdin_payload: Option<&str>,
    timeout: Option<std::time::Duration>,
    ctx: &TurnContext,
) -> anyhow::Result<TurnOutcome> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(if stdin_payload.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| anyhow::anyhow!("failed to spawn {program}: {e}"))?;

    if let (Some(payload), Some(mut stdin)) = (stdin_payload, child.stdin.take()) {
        use tokio::io::AsyncWriteExt;
        stdin.write_all(payload.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");
    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut raw = String::new();
    let mut coalescer = Coalescer::new();
    let mut cancelled = false;
    let io_loop = async {
        loop {
            tokio::select! {
                line = stdout_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            ctx.sink.on_frame(&line);
                            if let Some(event) = parse_line(&line) {
                                let (records, _session_id) = coalescer.push(&event);
                                for record in records {
                                    ctx.sink.on_record(record);
                                }
                            }
                            raw.push_str(&line);
                            raw.push('\n');
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "error reading agent stdout");
                            break;
                        }
                    }
                }
                line = stderr_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => tracing::debug!(target: "conduit_agent::stderr", "{line}"),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "error reading agent stderr");
                        }
                    }
                }
                () = ctx.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
            }
        }
    };

    match timeout {
        Some(duration) => tokio::time::timeout(duration, io_loop)
            .await
            .map_err(|_| anyhow::anyhow!("agent turn timed out after {duration:?}"))?,
        None => io_loop.await,
    };

    for record in coalescer.finish() {
        ctx.sink.on_record(record);
    }

    let status = if cancelled {
        match tokio::time::timeout(ctx.grace_period, child.wait()).await {
            Ok(status) => status.map_err(|e| anyhow::anyhow!("failed waiting on {program}: {e}"))?,
            Err(_) => {
                child.start_kill().map_err(|e| anyhow::anyhow!("failed to kill {program}: {e}"))?;
                child.wait().await.map_err(|e| anyhow::anyhow!("failed waiting on {program} after kill: {e}"))?
            }
        }
    } else {
        child.wait().await.map_err(|e| anyhow::anyhow!("failed waiting on {program}: {e}"))?
    };

    let (transcript, session_id) = parse_stream(&raw);

    Ok(TurnOutcome {
        transcript,
        session_id,
        exit_code: status.code(),
    })
}
