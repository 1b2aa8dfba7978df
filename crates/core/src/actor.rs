// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actor definitions as persisted inside `group.yaml`.

use crate::id::{ActorId, ProfileId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Branded CLI runtimes the daemon knows how to launch.
pub const SUPPORTED_RUNTIMES: &[&str] = &[
    "amp", "auggie", "claude", "codex", "cursor", "droid", "gemini", "kilocode", "neovate",
    "opencode", "copilot", "custom",
];

/// The CLI behind an actor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    Amp,
    Auggie,
    Claude,
    #[default]
    Codex,
    Cursor,
    Droid,
    Gemini,
    Kilocode,
    Neovate,
    Opencode,
    Copilot,
    Custom,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Amp => "amp",
            Runtime::Auggie => "auggie",
            Runtime::Claude => "claude",
            Runtime::Codex => "codex",
            Runtime::Cursor => "cursor",
            Runtime::Droid => "droid",
            Runtime::Gemini => "gemini",
            Runtime::Kilocode => "kilocode",
            Runtime::Neovate => "neovate",
            Runtime::Opencode => "opencode",
            Runtime::Copilot => "copilot",
            Runtime::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "amp" => Some(Runtime::Amp),
            "auggie" => Some(Runtime::Auggie),
            "claude" => Some(Runtime::Claude),
            "codex" => Some(Runtime::Codex),
            "cursor" => Some(Runtime::Cursor),
            "droid" => Some(Runtime::Droid),
            "gemini" => Some(Runtime::Gemini),
            "kilocode" => Some(Runtime::Kilocode),
            "neovate" => Some(Runtime::Neovate),
            "opencode" => Some(Runtime::Opencode),
            "copilot" => Some(Runtime::Copilot),
            "custom" => Some(Runtime::Custom),
            _ => None,
        }
    }
}

/// Execution attachment for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    #[default]
    Pty,
    Headless,
}

impl RunnerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerKind::Pty => "pty",
            RunnerKind::Headless => "headless",
        }
    }
}

/// Key discipline the PTY driver uses to dispatch typed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitKey {
    #[default]
    Enter,
    #[serde(rename = "ctrl+enter")]
    CtrlEnter,
    Paste,
}

/// Explicit role tag on an actor. The effective role also accounts for the
/// first-enabled-actor default; see [`GroupDoc::foreman_id`].
///
/// [`GroupDoc::foreman_id`]: crate::group::GroupDoc::foreman_id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Foreman,
    Peer,
}

/// One actor entry inside `group.yaml`.
///
/// `id` is stable for the life of the actor; renames are modeled as
/// remove + re-add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorDef {
    pub id: ActorId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub runner: RunnerKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default)]
    pub submit: SubmitKey,
    #[serde(default)]
    pub default_scope_key: String,
    /// Public environment. Secrets live in the private env store, never here.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<ProfileId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_revision_applied: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    /// Unknown fields from older/newer schemas, preserved on round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl ActorDef {
    pub fn new(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            role: None,
            runtime: Runtime::default(),
            runner: RunnerKind::default(),
            command: Vec::new(),
            submit: SubmitKey::default(),
            default_scope_key: String::new(),
            env: BTreeMap::new(),
            profile_id: None,
            profile_revision_applied: None,
            enabled: true,
            created_at: String::new(),
            updated_at: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
#[path = "actor_tests.rs"]
mod tests;
