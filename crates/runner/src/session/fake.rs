// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session adapter for testing

use super::{SessionAdapter, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded session call
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Spawn { name: String, argv: Vec<String> },
    SendLiteral { id: String, text: String },
    SendKey { id: String, key: String },
    Kill { id: String },
    PipeOutput { id: String, file: PathBuf },
    Resize { id: String, cols: u16, rows: u16 },
}

#[derive(Debug, Clone)]
struct FakeSession {
    alive: bool,
    pid: u32,
    capture: String,
    pipe_file: Option<PathBuf>,
}

#[derive(Default)]
struct FakeState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<SessionCall>,
    next_pid: u32,
    fail_spawn: bool,
}

/// Fake session adapter for testing.
///
/// Sessions "run" in memory; tests can append output, flip liveness, and
/// inspect the recorded call log.
#[derive(Clone)]
pub struct FakeSessionAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeSessionAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                next_pid: 1000,
                ..Default::default()
            })),
        }
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.clone()
    }

    pub fn fail_next_spawn(&self) {
        self.inner.lock().fail_spawn = true;
    }

    /// Simulate the session process exiting.
    pub fn mark_dead(&self, id: &str) {
        if let Some(s) = self.inner.lock().sessions.get_mut(id) {
            s.alive = false;
        }
    }

    /// Simulate terminal output: appended to the capture buffer and the
    /// pipe file when one is attached.
    pub fn emit_output(&self, id: &str, text: &str) {
        let pipe = {
            let mut st = self.inner.lock();
            let Some(s) = st.sessions.get_mut(id) else {
                return;
            };
            s.capture.push_str(text);
            s.pipe_file.clone()
        };
        if let Some(path) = pipe {
            use std::io::Write;
            if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
                let _ = f.write_all(text.as_bytes());
            }
        }
    }

    /// Everything typed into the session via send_literal/send_key.
    pub fn typed_input(&self, id: &str) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SessionCall::SendLiteral { id: cid, text } if cid == id => Some(text.clone()),
                SessionCall::SendKey { id: cid, key } if cid == id => Some(format!("<{key}>")),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    async fn spawn(
        &self,
        name: &str,
        _cwd: &Path,
        argv: &[String],
        _env: &[(String, String)],
    ) -> Result<String, SessionError> {
        let mut st = self.inner.lock();
        if st.fail_spawn {
            st.fail_spawn = false;
            return Err(SessionError::SpawnFailed("scripted failure".to_string()));
        }
        let id = format!("cccc-{name}");
        st.next_pid += 1;
        let pid = st.next_pid;
        st.calls.push(SessionCall::Spawn {
            name: name.to_string(),
            argv: argv.to_vec(),
        });
        st.sessions.insert(
            id.clone(),
            FakeSession {
                alive: true,
                pid,
                capture: String::new(),
                pipe_file: None,
            },
        );
        Ok(id)
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        let mut st = self.inner.lock();
        if !st.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        st.calls.push(SessionCall::SendLiteral {
            id: id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_key(&self, id: &str, key: &str) -> Result<(), SessionError> {
        let mut st = self.inner.lock();
        if !st.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        st.calls.push(SessionCall::SendKey {
            id: id.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        let mut st = self.inner.lock();
        st.calls.push(SessionCall::Kill { id: id.to_string() });
        if let Some(s) = st.sessions.get_mut(id) {
            s.alive = false;
        }
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .get(id)
            .map(|s| s.alive)
            .unwrap_or(false))
    }

    async fn pane_pid(&self, id: &str) -> Result<Option<u32>, SessionError> {
        Ok(self.inner.lock().sessions.get(id).map(|s| s.pid))
    }

    async fn pipe_output(&self, id: &str, file: &Path) -> Result<(), SessionError> {
        let mut st = self.inner.lock();
        let Some(s) = st.sessions.get_mut(id) else {
            return Err(SessionError::NotFound(id.to_string()));
        };
        s.pipe_file = Some(file.to_path_buf());
        st.calls.push(SessionCall::PipeOutput {
            id: id.to_string(),
            file: file.to_path_buf(),
        });
        Ok(())
    }

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError> {
        let st = self.inner.lock();
        let Some(s) = st.sessions.get(id) else {
            return Err(SessionError::NotFound(id.to_string()));
        };
        let all: Vec<&str> = s.capture.lines().collect();
        let start = all.len().saturating_sub(lines as usize);
        Ok(all[start..].join("\n"))
    }

    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError> {
        self.inner.lock().calls.push(SessionCall::Resize {
            id: id.to_string(),
            cols,
            rows,
        });
        Ok(())
    }
}
