// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `state/automation.json`: automation timers and per-rule bookkeeping.
//!
//! Re-read on every tick (never cached across ticks) so external tools see
//! and influence the same state the daemon does.

use crate::atomic::{atomic_write_json, read_json_opt, StorageError};
use crate::home::Home;
use cccc_core::utc_now_iso;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NudgeItem {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub last_nudged_at: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActorAutoState {
    #[serde(default)]
    pub last_nudge_at: String,
    #[serde(default)]
    pub last_nudge_event_id: String,
    #[serde(default)]
    pub nudge_items: BTreeMap<String, NudgeItem>,
    #[serde(default)]
    pub last_idle_notify_at: String,
    #[serde(default)]
    pub keepalive_count: u32,
    #[serde(default)]
    pub last_keepalive_at: String,
    #[serde(default)]
    pub last_keepalive_next: String,
    #[serde(default)]
    pub help_last_nudge_at: String,
    #[serde(default)]
    pub help_msg_count_since: u64,
    #[serde(default)]
    pub help_session_key: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleAutoState {
    #[serde(default)]
    pub last_fired_at: String,
    #[serde(default)]
    pub last_slot_key: String,
    #[serde(default)]
    pub at_fired: bool,
    #[serde(default)]
    pub last_error_at: String,
    #[serde(default)]
    pub last_error: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationStateDoc {
    #[serde(default = "default_version")]
    pub v: u32,
    #[serde(default)]
    pub updated_at: String,
    /// Set on every `idle|paused → active` transition; deadlines never reach
    /// back before it.
    #[serde(default)]
    pub resume_at: String,
    #[serde(default)]
    pub last_silence_notify_at: String,
    /// Byte offset into the ledger for help-nudge message counting.
    /// `None` until the first tick initializes it (no backfill).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_ledger_pos: Option<u64>,
    #[serde(default)]
    pub actors: BTreeMap<String, ActorAutoState>,
    #[serde(default)]
    pub rules: BTreeMap<String, RuleAutoState>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_version() -> u32 {
    5
}

impl Default for AutomationStateDoc {
    fn default() -> Self {
        Self {
            v: 5,
            updated_at: String::new(),
            resume_at: String::new(),
            last_silence_notify_at: String::new(),
            help_ledger_pos: None,
            actors: BTreeMap::new(),
            rules: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl AutomationStateDoc {
    pub fn actor_mut(&mut self, actor_id: &str) -> &mut ActorAutoState {
        self.actors.entry(actor_id.to_string()).or_default()
    }

    pub fn rule_mut(&mut self, rule_id: &str) -> &mut RuleAutoState {
        self.rules.entry(rule_id.to_string()).or_default()
    }
}

pub fn load_automation_state(home: &Home, group_id: &str) -> Result<AutomationStateDoc, StorageError> {
    Ok(read_json_opt(&home.automation_state_path(group_id))?.unwrap_or_default())
}

pub fn save_automation_state(
    home: &Home,
    group_id: &str,
    doc: &mut AutomationStateDoc,
) -> Result<(), StorageError> {
    doc.updated_at = utc_now_iso();
    atomic_write_json(&home.automation_state_path(group_id), doc)
}
