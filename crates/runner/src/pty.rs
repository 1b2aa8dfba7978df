// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY supervisor: interactive actor sessions with transcript capture.
//!
//! One supervisor instance owns every PTY session in the daemon, keyed by
//! `(group_id, actor_id)`. Session output is piped to a capture file which
//! a poll task folds into a bounded in-memory ring; the ring feeds
//! `tail_output`, idle detection (`idle_seconds` = seconds since the
//! transcript last grew), and `term_attach` subscribers.

use crate::session::{SessionAdapter, SessionError};
use cccc_core::{utc_now_iso, SubmitKey};
use cccc_storage::{remove_pty_state_if_pid, write_pty_state, Home};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const LIVENESS_EVERY_TICKS: u32 = 4;
/// Bracketed paste markers for `submit=paste`.
const PASTE_BEGIN: &str = "\u{1b}[200~";
const PASTE_END: &str = "\u{1b}[201~";
/// CSI-u chord emitted for `submit=ctrl+enter`.
const CTRL_ENTER: &str = "\u{1b}[13;5u";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("actor not running: {0}")]
    NotRunning(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("state error: {0}")]
    State(#[from] cccc_storage::StorageError),
}

/// Result of a successful start.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub session_id: String,
    /// Stamp identifying this session; preamble-sent flags key off it.
    pub session_key: String,
    pub pid: u32,
}

struct Ring {
    buf: VecDeque<u8>,
    cap: usize,
}

impl Ring {
    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().copied());
        while self.buf.len() > self.cap {
            self.buf.pop_front();
        }
    }

    fn tail(&self, max_bytes: usize) -> Vec<u8> {
        let skip = self.buf.len().saturating_sub(max_bytes);
        self.buf.iter().skip(skip).copied().collect()
    }
}

struct PtyInner {
    group_id: String,
    actor_id: String,
    session_id: String,
    session_key: String,
    pid: u32,
    capture_path: PathBuf,
    ring: Mutex<Ring>,
    read_offset: Mutex<u64>,
    last_output: Mutex<Instant>,
    running: AtomicBool,
    subscribers: Mutex<Vec<mpsc::Sender<Vec<u8>>>>,
}

impl PtyInner {
    /// Pull new bytes from the capture file into the ring. Returns the
    /// bytes read so the poll task can fan them out.
    fn drain_capture(&self) -> Vec<u8> {
        let mut offset = self.read_offset.lock();
        let Ok(mut file) = std::fs::File::open(&self.capture_path) else {
            return Vec::new();
        };
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if len < *offset {
            // Capture file was truncated (clear_backlog); restart from 0.
            *offset = 0;
        }
        if len == *offset {
            return Vec::new();
        }
        if file.seek(SeekFrom::Start(*offset)).is_err() {
            return Vec::new();
        }
        let mut bytes = Vec::new();
        if file.read_to_end(&mut bytes).is_err() {
            return Vec::new();
        }
        *offset += bytes.len() as u64;
        drop(offset);

        if !bytes.is_empty() {
            self.ring.lock().push(&bytes);
            *self.last_output.lock() = Instant::now();
        }
        bytes
    }

    fn broadcast(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.try_send(bytes.to_vec()).is_ok());
    }
}

/// Supervisor for all PTY-run actors. Generic over the session adapter so
/// tests run against a fake terminal.
#[derive(Clone)]
pub struct PtySupervisor<S: SessionAdapter> {
    adapter: S,
    home: Home,
    sessions: Arc<Mutex<HashMap<(String, String), Arc<PtyInner>>>>,
    backlog_bytes: usize,
}

impl<S: SessionAdapter> PtySupervisor<S> {
    pub fn new(adapter: S, home: Home, backlog_bytes: usize) -> Self {
        Self {
            adapter,
            home,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            backlog_bytes,
        }
    }

    pub fn adapter(&self) -> &S {
        &self.adapter
    }

    /// Start an actor session. An existing live session is stopped first.
    pub async fn start(
        &self,
        group_id: &str,
        actor_id: &str,
        argv: &[String],
        env: &[(String, String)],
        cwd: &Path,
    ) -> Result<StartOutcome, RunnerError> {
        self.stop(group_id, actor_id).await;

        let capture_path = self.home.terminal_capture_path(group_id, actor_id);
        if let Some(parent) = capture_path.parent() {
            std::fs::create_dir_all(parent).map_err(cccc_storage::StorageError::from)?;
        }
        // Fresh session, fresh transcript.
        let _ = std::fs::write(&capture_path, b"");

        let name = format!("{}-{}", group_id.trim_start_matches("g_"), actor_id);
        let session_id = self.adapter.spawn(&name, cwd, argv, env).await?;
        let pid = self.adapter.pane_pid(&session_id).await?.unwrap_or(0);
        if let Err(e) = self.adapter.pipe_output(&session_id, &capture_path).await {
            warn!(session_id, error = %e, "transcript pipe unavailable");
        }
        write_pty_state(&self.home, group_id, actor_id, pid, &session_id)?;

        let session_key = utc_now_iso();
        let inner = Arc::new(PtyInner {
            group_id: group_id.to_string(),
            actor_id: actor_id.to_string(),
            session_id: session_id.clone(),
            session_key: session_key.clone(),
            pid,
            capture_path,
            ring: Mutex::new(Ring {
                buf: VecDeque::new(),
                cap: self.backlog_bytes,
            }),
            read_offset: Mutex::new(0),
            last_output: Mutex::new(Instant::now()),
            running: AtomicBool::new(true),
            subscribers: Mutex::new(Vec::new()),
        });
        self.sessions
            .lock()
            .insert(key(group_id, actor_id), Arc::clone(&inner));
        self.spawn_poll_task(Arc::clone(&inner));

        Ok(StartOutcome {
            session_id,
            session_key,
            pid,
        })
    }

    fn spawn_poll_task(&self, inner: Arc<PtyInner>) {
        let adapter = self.adapter.clone();
        let home = self.home.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut tick = 0u32;
            loop {
                interval.tick().await;
                if !inner.running.load(Ordering::SeqCst) {
                    return;
                }
                let bytes = inner.drain_capture();
                inner.broadcast(&bytes);

                tick = tick.wrapping_add(1);
                if tick % LIVENESS_EVERY_TICKS != 0 {
                    continue;
                }
                let alive = adapter.is_alive(&inner.session_id).await.unwrap_or(false);
                if !alive {
                    debug!(
                        group_id = %inner.group_id,
                        actor_id = %inner.actor_id,
                        "session exited, reaping"
                    );
                    // Final drain so the tail includes the last output.
                    let bytes = inner.drain_capture();
                    inner.broadcast(&bytes);
                    inner.running.store(false, Ordering::SeqCst);
                    remove_pty_state_if_pid(&home, &inner.group_id, &inner.actor_id, inner.pid);
                    inner.subscribers.lock().clear();
                    return;
                }
            }
        });
    }

    fn get(&self, group_id: &str, actor_id: &str) -> Option<Arc<PtyInner>> {
        self.sessions.lock().get(&key(group_id, actor_id)).cloned()
    }

    fn get_running(&self, group_id: &str, actor_id: &str) -> Option<Arc<PtyInner>> {
        self.get(group_id, actor_id)
            .filter(|i| i.running.load(Ordering::SeqCst))
    }

    pub fn actor_running(&self, group_id: &str, actor_id: &str) -> bool {
        self.get_running(group_id, actor_id).is_some()
    }

    pub fn group_running(&self, group_id: &str) -> bool {
        self.sessions
            .lock()
            .iter()
            .any(|((gid, _), i)| gid == group_id && i.running.load(Ordering::SeqCst))
    }

    /// Stamp identifying the current session (None when not running).
    pub fn session_key(&self, group_id: &str, actor_id: &str) -> Option<String> {
        self.get_running(group_id, actor_id)
            .map(|i| i.session_key.clone())
    }

    /// Seconds since the transcript last grew. The authoritative idle
    /// signal for PTY actors.
    pub fn idle_seconds(&self, group_id: &str, actor_id: &str) -> Option<f64> {
        self.get_running(group_id, actor_id)
            .map(|i| i.last_output.lock().elapsed().as_secs_f64())
    }

    /// Write a text block into the actor's terminal with the configured
    /// submit discipline. Callers serialize per actor.
    pub async fn write_text(
        &self,
        group_id: &str,
        actor_id: &str,
        text: &str,
        submit: SubmitKey,
    ) -> Result<(), RunnerError> {
        let inner = self
            .get_running(group_id, actor_id)
            .ok_or_else(|| RunnerError::NotRunning(actor_id.to_string()))?;
        match submit {
            SubmitKey::Enter => {
                self.adapter.send_literal(&inner.session_id, text).await?;
                self.adapter.send_key(&inner.session_id, "Enter").await?;
            }
            SubmitKey::CtrlEnter => {
                self.adapter.send_literal(&inner.session_id, text).await?;
                self.adapter.send_literal(&inner.session_id, CTRL_ENTER).await?;
            }
            SubmitKey::Paste => {
                let wrapped = format!("{PASTE_BEGIN}{text}{PASTE_END}");
                self.adapter.send_literal(&inner.session_id, &wrapped).await?;
                self.adapter.send_key(&inner.session_id, "Enter").await?;
            }
        }
        Ok(())
    }

    /// Raw passthrough used by `term_attach`: bytes go in unmodified.
    pub async fn write_raw(&self, group_id: &str, actor_id: &str, bytes: &[u8]) -> Result<(), RunnerError> {
        let inner = self
            .get_running(group_id, actor_id)
            .ok_or_else(|| RunnerError::NotRunning(actor_id.to_string()))?;
        let text = String::from_utf8_lossy(bytes);
        self.adapter.send_literal(&inner.session_id, &text).await?;
        Ok(())
    }

    /// Last `max_bytes` of the captured transcript.
    pub fn tail_output(&self, group_id: &str, actor_id: &str, max_bytes: usize) -> Vec<u8> {
        // Pull anything the poll task hasn't folded in yet, then read.
        match self.get(group_id, actor_id) {
            Some(inner) => {
                let bytes = inner.drain_capture();
                inner.broadcast(&bytes);
                inner.ring.lock().tail(max_bytes)
            }
            None => Vec::new(),
        }
    }

    /// Drop the captured backlog (ring and capture file).
    pub fn clear_backlog(&self, group_id: &str, actor_id: &str) {
        if let Some(inner) = self.get(group_id, actor_id) {
            inner.ring.lock().buf.clear();
            *inner.read_offset.lock() = 0;
            let _ = std::fs::write(&inner.capture_path, b"");
        }
    }

    /// Subscribe to live transcript bytes (term_attach). The returned
    /// receiver is dropped from the fan-out list once it lags or closes.
    pub fn subscribe_output(
        &self,
        group_id: &str,
        actor_id: &str,
    ) -> Option<mpsc::Receiver<Vec<u8>>> {
        let inner = self.get_running(group_id, actor_id)?;
        let (tx, rx) = mpsc::channel(64);
        inner.subscribers.lock().push(tx);
        Some(rx)
    }

    pub async fn resize(&self, group_id: &str, actor_id: &str, cols: u16, rows: u16) -> Result<(), RunnerError> {
        let inner = self
            .get_running(group_id, actor_id)
            .ok_or_else(|| RunnerError::NotRunning(actor_id.to_string()))?;
        self.adapter.resize(&inner.session_id, cols, rows).await?;
        Ok(())
    }

    /// Stop one actor's session. Idempotent.
    pub async fn stop(&self, group_id: &str, actor_id: &str) {
        let inner = { self.sessions.lock().remove(&key(group_id, actor_id)) };
        if let Some(inner) = inner {
            inner.running.store(false, Ordering::SeqCst);
            let _ = self.adapter.kill(&inner.session_id).await;
            remove_pty_state_if_pid(&self.home, group_id, actor_id, inner.pid);
        }
    }

    /// Stop every session (daemon shutdown path).
    pub async fn stop_all(&self) {
        let all: Vec<Arc<PtyInner>> = {
            let mut map = self.sessions.lock();
            map.drain().map(|(_, v)| v).collect()
        };
        for inner in all {
            inner.running.store(false, Ordering::SeqCst);
            let _ = self.adapter.kill(&inner.session_id).await;
            remove_pty_state_if_pid(&self.home, &inner.group_id, &inner.actor_id, inner.pid);
        }
    }
}

fn key(group_id: &str, actor_id: &str) -> (String, String) {
    (group_id.to_string(), actor_id.to_string())
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
