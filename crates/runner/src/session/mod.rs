// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal session adapters.

mod tmux;

pub use tmux::TmuxAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSessionAdapter, SessionCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Adapter for managing terminal sessions.
///
/// The PTY supervisor is generic over this trait so tests run against a
/// scripted fake instead of a live terminal multiplexer.
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    /// Spawn a new session running `argv` in `cwd` with extra environment.
    /// Returns the session id.
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<String, SessionError>;

    /// Send literal text (no key-name interpretation).
    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError>;

    /// Send a named key chord (`Enter`, escape sequences, …).
    async fn send_key(&self, id: &str, key: &str) -> Result<(), SessionError>;

    /// Kill the session. Killing a dead session is not an error.
    async fn kill(&self, id: &str) -> Result<(), SessionError>;

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError>;

    /// Pid of the session's root process, if available.
    async fn pane_pid(&self, id: &str) -> Result<Option<u32>, SessionError>;

    /// Stream all session output into `file`, appending.
    async fn pipe_output(&self, id: &str, file: &Path) -> Result<(), SessionError>;

    /// Capture the last `lines` of visible output.
    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError>;

    /// Resize the session's terminal.
    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError>;
}
