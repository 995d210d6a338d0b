//! Checks the host for the tools a conduit session needs before it spawns
//! its first agent.

use std::process::Command;

/// Run every check and print a report; returns `false` if any required
/// check failed.
#[allow(clippy::unnecessary_wraps)]
pub fn run() -> anyhow::Result<bool> {
    println!("conduit doctor");
    println!("==============");
    println!();

    let mut all_ok = true;

    all_ok &= check_tool("git", &["--version"], true, "https://git-scm.com/downloads");
    all_ok &= check_tool(
        "sudocode-mcp",
        &["--version"],
        true,
        "install the sudocode-mcp tool server and ensure it is on PATH",
    );

    for agent in conduit_agent::AgentKind::ALL {
        check_tool(agent.as_str(), &["--version"], false, "not required unless a stream uses this agent kind");
    }

    println!();
    if all_ok {
        println!("All required checks passed.");
    } else {
        println!("Some required checks failed. See above for details.");
    }

    Ok(all_ok)
}

fn check_tool(name: &str, args: &[&str], required: bool, install_hint: &str) -> bool {
    let label = if required { "required" } else { "optional" };
    match Command::new(name).args(args).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            let version = version.lines().next().unwrap_or("unknown").trim();
            println!("[OK] {name} ({label}): {version}");
            true
        }
        Ok(_) => {
            println!("[FAIL] {name} ({label}): found but exited with an error");
            println!("       {install_hint}");
            !required
        }
        Err(_) if required => {
            println!("[FAIL] {name} ({label}): not found on PATH");
            println!("       {install_hint}");
            false
        }
        Err(_) => {
            println!("[SKIP] {name} ({label}): not found on PATH");
            true
        }
    }
}
