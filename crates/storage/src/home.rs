// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `CCCC_HOME` directory tree.
//!
//! ```text
//! CCCC_HOME/
//! ├── active.json
//! ├── registry.json
//! ├── settings.json
//! ├── daemon/{ccccd.addr.json, ccccd.sock, ccccd.pid, ccccd.lock, ccccd.log, inputrc}
//! ├── groups/<group_id>/
//! │   ├── group.yaml
//! │   ├── ledger.jsonl (+ rotated ledger.*.jsonl.gz)
//! │   ├── state/{automation.json, cursors/, runners/{pty,headless}/, blobs/, preamble_sent.json}
//! │   └── prompts/
//! └── state/{actor_profiles/profiles.json, secrets/{actors,actor_profiles}/}
//! ```

use std::path::{Path, PathBuf};

/// Resolved `CCCC_HOME` root with typed accessors for every file the daemon
/// touches. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Home {
    root: PathBuf,
}

impl Home {
    /// Resolve from the `CCCC_HOME` env var, defaulting to `~/.cccc`.
    pub fn resolve() -> Self {
        if let Ok(dir) = std::env::var("CCCC_HOME") {
            let dir = dir.trim();
            if !dir.is_empty() {
                return Self::at(PathBuf::from(dir));
            }
        }
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(base.join(".cccc"))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active_path(&self) -> PathBuf {
        self.root.join("active.json")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    // -- daemon --

    pub fn daemon_dir(&self) -> PathBuf {
        self.root.join("daemon")
    }

    pub fn addr_path(&self) -> PathBuf {
        self.daemon_dir().join("ccccd.addr.json")
    }

    pub fn sock_path(&self) -> PathBuf {
        self.daemon_dir().join("ccccd.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.daemon_dir().join("ccccd.pid")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.daemon_dir().join("ccccd.lock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.daemon_dir().join("ccccd.log")
    }

    pub fn inputrc_path(&self) -> PathBuf {
        self.daemon_dir().join("inputrc")
    }

    // -- groups --

    pub fn groups_dir(&self) -> PathBuf {
        self.root.join("groups")
    }

    pub fn group_dir(&self, group_id: &str) -> PathBuf {
        self.groups_dir().join(group_id)
    }

    pub fn group_yaml_path(&self, group_id: &str) -> PathBuf {
        self.group_dir(group_id).join("group.yaml")
    }

    pub fn ledger_path(&self, group_id: &str) -> PathBuf {
        self.group_dir(group_id).join("ledger.jsonl")
    }

    pub fn group_state_dir(&self, group_id: &str) -> PathBuf {
        self.group_dir(group_id).join("state")
    }

    pub fn automation_state_path(&self, group_id: &str) -> PathBuf {
        self.group_state_dir(group_id).join("automation.json")
    }

    pub fn cursor_path(&self, group_id: &str, actor_id: &str) -> PathBuf {
        self.group_state_dir(group_id)
            .join("cursors")
            .join(format!("{actor_id}.json"))
    }

    pub fn runner_state_dir(&self, group_id: &str, runner: &str) -> PathBuf {
        self.group_state_dir(group_id).join("runners").join(runner)
    }

    pub fn runner_state_path(&self, group_id: &str, runner: &str, actor_id: &str) -> PathBuf {
        self.runner_state_dir(group_id, runner)
            .join(format!("{actor_id}.json"))
    }

    pub fn blobs_dir(&self, group_id: &str) -> PathBuf {
        self.group_state_dir(group_id).join("blobs")
    }

    pub fn preamble_sent_path(&self, group_id: &str) -> PathBuf {
        self.group_state_dir(group_id).join("preamble_sent.json")
    }

    /// Raw PTY transcript stream for one actor (fed by the session pipe).
    pub fn terminal_capture_path(&self, group_id: &str, actor_id: &str) -> PathBuf {
        self.group_state_dir(group_id)
            .join("term")
            .join(format!("{actor_id}.log"))
    }

    pub fn prompts_dir(&self, group_id: &str) -> PathBuf {
        self.group_dir(group_id).join("prompts")
    }

    // -- global state --

    pub fn profiles_path(&self) -> PathBuf {
        self.root
            .join("state")
            .join("actor_profiles")
            .join("profiles.json")
    }

    pub fn actor_secrets_dir(&self, group_id: &str) -> PathBuf {
        self.root
            .join("state")
            .join("secrets")
            .join("actors")
            .join(group_id)
    }

    pub fn profile_secrets_path(&self, profile_id: &str) -> PathBuf {
        self.root
            .join("state")
            .join("secrets")
            .join("actor_profiles")
            .join(format!("{profile_id}.json"))
    }
}

#[cfg(test)]
#[path = "home_tests.rs"]
mod tests;
