// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tmux-backed terminal sessions.
//!
//! Every actor session is a detached tmux session named
//! `cccc-<group>-<actor>`. The daemon never touches a PTY directly: input
//! goes through `send-keys`, the transcript comes out through `pipe-pane`,
//! and liveness is the exit code of `has-session`.

use super::{SessionAdapter, SessionError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

#[derive(Clone, Default)]
pub struct TmuxAdapter;

impl TmuxAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Run one tmux invocation. Failure to launch the tmux binary at all is a
/// `CommandFailed`; the caller interprets the exit status.
async fn tmux<I, A>(args: I) -> Result<Output, SessionError>
where
    I: IntoIterator<Item = A>,
    A: AsRef<std::ffi::OsStr>,
{
    Command::new("tmux")
        .args(args)
        .output()
        .await
        .map_err(|e| SessionError::CommandFailed(e.to_string()))
}

/// Variant for commands targeting a session id, where a non-zero exit
/// means the session is gone.
async fn tmux_expecting(id: &str, args: &[&str]) -> Result<Output, SessionError> {
    let out = tmux(args).await?;
    if out.status.success() {
        Ok(out)
    } else {
        Err(SessionError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl SessionAdapter for TmuxAdapter {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        if argv.is_empty() {
            return Err(SessionError::SpawnFailed("empty command".to_string()));
        }
        // tmux would exit immediately on a bad -c dir; fail with a clearer
        // message up front.
        if !cwd.is_dir() {
            return Err(SessionError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let session_id = format!("cccc-{name}");

        // A leftover session under this name belongs to a daemon that died
        // without cleanup; replace it rather than attaching to it.
        if tmux(["has-session", "-t", session_id.as_str()])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
        {
            tracing::warn!(session_id, "replacing leftover session with the same name");
            let _ = tmux(["kill-session", "-t", session_id.as_str()]).await;
        }

        let mut args: Vec<String> = vec![
            "new-session".into(),
            "-d".into(),
            "-s".into(),
            session_id.clone(),
            "-c".into(),
            cwd.display().to_string(),
        ];
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.extend(argv.iter().cloned());

        let out = tmux(&args).await.map_err(|e| match e {
            SessionError::CommandFailed(msg) => SessionError::SpawnFailed(msg),
            other => other,
        })?;
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !out.status.success() {
            tracing::error!(session_id, stderr = %stderr, "tmux new-session failed");
            return Err(SessionError::SpawnFailed(stderr.to_string()));
        }
        if !stderr.is_empty() {
            // tmux sometimes grumbles (e.g. about terminfo) and starts anyway.
            tracing::warn!(session_id, stderr = %stderr, "tmux new-session warned");
        }
        Ok(session_id)
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        // `-l` bypasses key-name parsing so the text arrives byte-for-byte;
        // `--` keeps a leading dash in the text from reading as an option.
        tmux_expecting(id, &["send-keys", "-t", id, "-l", "--", text]).await?;
        Ok(())
    }

    async fn send_key(&self, id: &str, key: &str) -> Result<(), SessionError> {
        tmux_expecting(id, &["send-keys", "-t", id, key]).await?;
        Ok(())
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        // Exit status deliberately ignored: killing an already-dead
        // session is a success for every caller we have.
        let _ = tmux(["kill-session", "-t", id]).await?;
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        Ok(tmux(["has-session", "-t", id]).await?.status.success())
    }

    async fn pane_pid(&self, id: &str) -> Result<Option<u32>, SessionError> {
        let out = tmux_expecting(id, &["list-panes", "-t", id, "-F", "#{pane_pid}"]).await?;
        let pid = String::from_utf8_lossy(&out.stdout)
            .lines()
            .next()
            .and_then(|l| l.trim().parse::<u32>().ok());
        Ok(pid)
    }

    async fn pipe_output(&self, id: &str, file: &Path) -> Result<(), SessionError> {
        // `-o` only pipes when nothing is piping yet, so a re-attach after
        // daemon restart does not stack writers onto the capture file.
        let sink = format!("cat >> {}", single_quote(&file.display().to_string()));
        tmux_expecting(id, &["pipe-pane", "-t", id, "-o", &sink]).await?;
        Ok(())
    }

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError> {
        let scrollback = format!("-{lines}");
        let out =
            tmux_expecting(id, &["capture-pane", "-t", id, "-p", "-S", &scrollback]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError> {
        let (x, y) = (cols.to_string(), rows.to_string());
        let out = tmux(["resize-window", "-t", id, "-x", x.as_str(), "-y", y.as_str()]).await?;
        if !out.status.success() {
            // resize-window needs tmux ≥ 2.9; the session works unresized.
            tracing::warn!(id, cols, rows, "tmux resize-window failed");
        }
        Ok(())
    }
}

/// Single-quote a string for the shell command `pipe-pane` runs.
fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
