// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group document: the single source of truth persisted as
//! `groups/<gid>/group.yaml`.

use crate::actor::{ActorDef, Role};
use crate::id::{ActorId, GroupId};
use crate::rules::AutomationSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runtime gate for delivery and automation.
///
/// A fourth *stopped* action tears down runners but is not persisted as a
/// state; a stopped group re-loads as whatever state it had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    #[default]
    Active,
    Idle,
    Paused,
}

impl GroupState {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupState::Active => "active",
            GroupState::Idle => "idle",
            GroupState::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "active" => Some(GroupState::Active),
            "idle" => Some(GroupState::Idle),
            "paused" => Some(GroupState::Paused),
            _ => None,
        }
    }
}

/// A filesystem workspace attached to the group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScopeDef {
    pub scope_key: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub git_remote: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Default routing when a message names no recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendTarget {
    #[default]
    Foreman,
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessagingSettings {
    #[serde(default)]
    pub default_send_to: SendTarget,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySettings {
    /// Minimum seconds between deliveries to one actor. 0 = no throttle.
    #[serde(default)]
    pub min_interval_seconds: u64,
    /// Append `chat.read` (and `chat.ack` for attention) as soon as the
    /// runner confirms receipt.
    #[serde(default)]
    pub auto_mark_on_delivery: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            min_interval_seconds: 0,
            auto_mark_on_delivery: false,
            extra: BTreeMap::new(),
        }
    }
}

/// Who may read another actor's terminal transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptVisibility {
    Off,
    #[default]
    Foreman,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalTranscriptSettings {
    #[serde(default)]
    pub visibility: TranscriptVisibility,
    /// Include a terminal tail in actor-idle notifies.
    #[serde(default)]
    pub notify_tail: bool,
    /// Lines of tail to include, clamped to 1..=80.
    #[serde(default = "default_notify_lines")]
    pub notify_lines: u32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_notify_lines() -> u32 {
    20
}

impl Default for TerminalTranscriptSettings {
    fn default() -> Self {
        Self {
            visibility: TranscriptVisibility::default(),
            notify_tail: false,
            notify_lines: default_notify_lines(),
            extra: BTreeMap::new(),
        }
    }
}

/// The group document. All mutating ops round-trip `load → mutate → save`;
/// there is no in-memory cache between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDoc {
    #[serde(default = "default_version")]
    pub v: u32,
    pub group_id: GroupId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub scopes: Vec<ScopeDef>,
    #[serde(default)]
    pub active_scope_key: String,
    #[serde(default)]
    pub actors: Vec<ActorDef>,
    #[serde(default)]
    pub messaging: MessagingSettings,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub automation: AutomationSettings,
    #[serde(default)]
    pub terminal_transcript: TerminalTranscriptSettings,
    /// IM bridge configuration, owned by external bridge processes.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub im: serde_json::Value,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub state: GroupState,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_version() -> u32 {
    1
}

impl GroupDoc {
    pub fn new(group_id: GroupId, title: impl Into<String>, now_iso: &str) -> Self {
        Self {
            v: 1,
            group_id,
            title: title.into(),
            topic: String::new(),
            scopes: Vec::new(),
            active_scope_key: String::new(),
            actors: Vec::new(),
            messaging: MessagingSettings::default(),
            delivery: DeliverySettings::default(),
            automation: AutomationSettings::default(),
            terminal_transcript: TerminalTranscriptSettings::default(),
            im: serde_json::Value::Null,
            running: false,
            state: GroupState::Active,
            created_at: now_iso.to_string(),
            updated_at: now_iso.to_string(),
            extra: BTreeMap::new(),
        }
    }

    pub fn find_actor(&self, actor_id: &str) -> Option<&ActorDef> {
        self.actors.iter().find(|a| a.id == actor_id)
    }

    pub fn find_actor_mut(&mut self, actor_id: &str) -> Option<&mut ActorDef> {
        self.actors.iter_mut().find(|a| a.id == actor_id)
    }

    pub fn find_scope(&self, scope_key: &str) -> Option<&ScopeDef> {
        self.scopes.iter().find(|s| s.scope_key == scope_key)
    }

    /// The foreman: the explicitly tagged actor, else the first enabled one.
    pub fn foreman(&self) -> Option<&ActorDef> {
        self.actors
            .iter()
            .find(|a| a.enabled && a.role == Some(Role::Foreman))
            .or_else(|| self.actors.iter().find(|a| a.enabled))
    }

    pub fn foreman_id(&self) -> Option<ActorId> {
        self.foreman().map(|a| a.id.clone())
    }

    /// Effective role for an id: `user` for the human pseudo-actor, foreman
    /// for the single foreman, peer for everything else in the roster.
    pub fn effective_role(&self, actor_id: &str) -> Option<&'static str> {
        if actor_id == "user" {
            return Some("user");
        }
        self.find_actor(actor_id)?;
        match self.foreman_id() {
            Some(fid) if fid == actor_id => Some("foreman"),
            _ => Some("peer"),
        }
    }

    /// Enabled non-user actors, in roster order.
    pub fn enabled_actors(&self) -> impl Iterator<Item = &ActorDef> {
        self.actors.iter().filter(|a| a.enabled && !a.id.is_user())
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
