// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless supervisor: state tracking for MCP-driven actors.
//!
//! No process is spawned; the actual work is done by an external MCP
//! client polling daemon ops. "Running" only means the daemon considers
//! the actor active and deliverable via inbox polling.

use cccc_storage::{remove_headless_state, write_headless_state, Home};
use cccc_core::utc_now_iso;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct HeadlessHandle {
    pub started_at: String,
    pub status: String,
    pub last_message_id_acked: String,
}

#[derive(Clone, Default)]
pub struct HeadlessSupervisor {
    inner: Arc<Mutex<HashMap<(String, String), HeadlessHandle>>>,
}

impl HeadlessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, home: &Home, group_id: &str, actor_id: &str) -> HeadlessHandle {
        let handle = HeadlessHandle {
            started_at: utc_now_iso(),
            status: "running".to_string(),
            last_message_id_acked: String::new(),
        };
        self.inner
            .lock()
            .insert(key(group_id, actor_id), handle.clone());
        if let Err(e) = write_headless_state(home, group_id, actor_id, &handle.status, "") {
            tracing::warn!(group_id, actor_id, error = %e, "failed to persist headless state");
        }
        handle
    }

    pub fn stop(&self, home: &Home, group_id: &str, actor_id: &str) {
        self.inner.lock().remove(&key(group_id, actor_id));
        remove_headless_state(home, group_id, actor_id);
    }

    pub fn stop_all(&self, home: &Home) {
        let keys: Vec<(String, String)> = self.inner.lock().keys().cloned().collect();
        for (gid, aid) in keys {
            self.stop(home, &gid, &aid);
        }
    }

    pub fn actor_running(&self, group_id: &str, actor_id: &str) -> bool {
        self.inner.lock().contains_key(&key(group_id, actor_id))
    }

    pub fn group_running(&self, group_id: &str) -> bool {
        self.inner.lock().keys().any(|(gid, _)| gid == group_id)
    }

    pub fn get(&self, group_id: &str, actor_id: &str) -> Option<HeadlessHandle> {
        self.inner.lock().get(&key(group_id, actor_id)).cloned()
    }

    /// Record the newest message id the headless client has acknowledged.
    pub fn record_ack(&self, home: &Home, group_id: &str, actor_id: &str, message_id: &str) {
        let mut map = self.inner.lock();
        if let Some(handle) = map.get_mut(&key(group_id, actor_id)) {
            handle.last_message_id_acked = message_id.to_string();
            let status = handle.status.clone();
            drop(map);
            if let Err(e) = write_headless_state(home, group_id, actor_id, &status, message_id) {
                tracing::warn!(group_id, actor_id, error = %e, "failed to persist headless ack");
            }
        }
    }
}

fn key(group_id: &str, actor_id: &str) -> (String, String) {
    (group_id.to_string(), actor_id.to_string())
}

#[cfg(test)]
#[path = "headless_tests.rs"]
mod tests;
