// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global `settings.json`: observability and remote-access knobs.

use crate::atomic::{atomic_write_json, read_json_opt, StorageError};
use crate::home::Home;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_PTY_BACKLOG_BYTES: u64 = 10 * 1024 * 1024;
const MAX_PTY_BACKLOG_BYTES: u64 = 50_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub developer_mode: bool,
    #[serde(default)]
    pub terminal_transcript: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            developer_mode: false,
            terminal_transcript: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl ObservabilitySettings {
    /// Per-actor PTY transcript ring size, defaulted and capped.
    pub fn pty_backlog_bytes(&self) -> u64 {
        let raw = self
            .terminal_transcript
            .get("per_actor_bytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if raw == 0 {
            DEFAULT_PTY_BACKLOG_BYTES
        } else {
            raw.min(MAX_PTY_BACKLOG_BYTES)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SettingsDoc {
    #[serde(default)]
    pub observability: ObservabilitySettings,
    #[serde(default)]
    pub remote_access: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

pub fn load_settings(home: &Home) -> Result<SettingsDoc, StorageError> {
    Ok(read_json_opt(&home.settings_path())?.unwrap_or_default())
}

pub fn save_settings(home: &Home, doc: &SettingsDoc) -> Result<(), StorageError> {
    atomic_write_json(&home.settings_path(), doc)
}
