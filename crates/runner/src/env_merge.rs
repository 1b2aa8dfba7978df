// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actor environment assembly and per-runtime command normalization.
//!
//! Precedence, lowest to highest: actor public env, private env (secret
//! store), then the `CCCC_GROUP_ID`/`CCCC_ACTOR_ID` context pair so
//! downstream MCP tools can identify themselves without configuration.
//! The daemon's own inherited environment is contributed by the spawned
//! process itself.

use cccc_core::Runtime;
use cccc_storage::Home;
use std::collections::BTreeMap;

/// Merge public env, private env, and actor context into the final
/// environment for a runner launch.
pub fn merge_actor_env(
    public_env: &BTreeMap<String, String>,
    private_env: &BTreeMap<String, String>,
    group_id: &str,
    actor_id: &str,
) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = public_env.clone();
    for (k, v) in private_env {
        merged.insert(k.clone(), v.clone());
    }
    merged.insert("CCCC_GROUP_ID".to_string(), group_id.to_string());
    merged.insert("CCCC_ACTOR_ID".to_string(), actor_id.to_string());
    merged.into_iter().collect()
}

/// Add PTY-session env: point readline at the daemon's `inputrc` so
/// bracketed paste never swallows programmatic writes.
pub fn prepare_pty_env(env: &mut Vec<(String, String)>, home: &Home) {
    let path = home.inputrc_path().display().to_string();
    if !env.iter().any(|(k, _)| k == "INPUTRC") {
        env.push(("INPUTRC".to_string(), path));
    }
}

/// Write the daemon-owned `inputrc` file if it does not exist yet.
pub fn ensure_inputrc(home: &Home) -> std::io::Result<()> {
    let path = home.inputrc_path();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, "set enable-bracketed-paste off\n")
}

/// Per-runtime launch-time command adjustments.
///
/// Returns a fresh argv; the persisted `actor.command` is never mutated.
/// Codex gets `-c shell_environment_policy.inherit=all` injected so MCP
/// subprocesses inherit the actor env.
pub fn normalize_runtime_command(runtime: Runtime, command: &[String]) -> Vec<String> {
    let mut argv: Vec<String> = if command.is_empty() {
        default_command(runtime.clone())
    } else {
        command.to_vec()
    };
    if runtime == Runtime::Codex && !argv.is_empty() {
        let flag = "shell_environment_policy.inherit=all".to_string();
        let already = argv.windows(2).any(|w| w[0] == "-c" && w[1] == flag);
        if !already {
            argv.splice(1..1, ["-c".to_string(), flag]);
        }
    }
    argv
}

fn default_command(runtime: Runtime) -> Vec<String> {
    match runtime {
        // Custom runtimes have no default; validation upstream requires an
        // explicit command for them.
        Runtime::Custom => Vec::new(),
        other => vec![other.as_str().to_string()],
    }
}

#[cfg(test)]
#[path = "env_merge_tests.rs"]
mod tests;
