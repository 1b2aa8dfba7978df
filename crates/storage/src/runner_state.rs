// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner state files under `state/runners/{pty,headless}/<actor>.json`.
//!
//! These exist so a restarted daemon can reconcile which sessions it owned.
//! PTY state is removed only when the recorded pid matches, so a new
//! session's file is never clobbered by a stale exit hook.

use crate::atomic::{atomic_write_json, read_json_opt, StorageError};
use crate::home::Home;
use cccc_core::utc_now_iso;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtyState {
    #[serde(default = "default_version")]
    pub v: u32,
    pub kind: String,
    pub group_id: String,
    pub actor_id: String,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub started_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlessState {
    #[serde(default = "default_version")]
    pub v: u32,
    pub kind: String,
    pub group_id: String,
    pub actor_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub last_message_id_acked: String,
    #[serde(default)]
    pub started_at: String,
}

fn default_version() -> u32 {
    1
}

pub fn write_pty_state(
    home: &Home,
    group_id: &str,
    actor_id: &str,
    pid: u32,
    session_id: &str,
) -> Result<PtyState, StorageError> {
    let state = PtyState {
        v: 1,
        kind: "pty".to_string(),
        group_id: group_id.to_string(),
        actor_id: actor_id.to_string(),
        pid,
        session_id: session_id.to_string(),
        started_at: utc_now_iso(),
    };
    atomic_write_json(&home.runner_state_path(group_id, "pty", actor_id), &state)?;
    Ok(state)
}

pub fn read_pty_state(home: &Home, group_id: &str, actor_id: &str) -> Option<PtyState> {
    read_json_opt(&home.runner_state_path(group_id, "pty", actor_id)).ok()?
}

/// Remove the PTY state file, but only if the recorded pid matches (or no
/// pid filter is given).
pub fn remove_pty_state_if_pid(home: &Home, group_id: &str, actor_id: &str, pid: u32) {
    let path = home.runner_state_path(group_id, "pty", actor_id);
    if let Some(state) = read_pty_state(home, group_id, actor_id) {
        if state.pid != 0 && pid != 0 && state.pid != pid {
            return;
        }
    }
    let _ = std::fs::remove_file(path);
}

pub fn write_headless_state(
    home: &Home,
    group_id: &str,
    actor_id: &str,
    status: &str,
    last_message_id_acked: &str,
) -> Result<HeadlessState, StorageError> {
    let state = HeadlessState {
        v: 1,
        kind: "headless".to_string(),
        group_id: group_id.to_string(),
        actor_id: actor_id.to_string(),
        status: status.to_string(),
        last_message_id_acked: last_message_id_acked.to_string(),
        started_at: utc_now_iso(),
    };
    atomic_write_json(
        &home.runner_state_path(group_id, "headless", actor_id),
        &state,
    )?;
    Ok(state)
}

pub fn read_headless_state(home: &Home, group_id: &str, actor_id: &str) -> Option<HeadlessState> {
    read_json_opt(&home.runner_state_path(group_id, "headless", actor_id)).ok()?
}

pub fn remove_headless_state(home: &Home, group_id: &str, actor_id: &str) {
    let _ = std::fs::remove_file(home.runner_state_path(group_id, "headless", actor_id));
}
