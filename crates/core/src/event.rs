// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ledger event model.
//!
//! Events are single-line JSON records in the per-group ledger:
//! `{"id": "ev_…", "ts": "…Z", "kind": "chat.message", "group_id": "g_…",
//! "scope_key": "…", "by": "…", "data": {…}}`.
//!
//! The envelope keeps `data` as raw JSON so unknown kinds round-trip
//! unchanged; the typed payload structs below decode the kinds the daemon
//! acts on.

use crate::id::{EventId, GroupId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event kind discriminator.
///
/// Serializes as the canonical dotted string. Unknown kinds deserialize to
/// `Other` so old or foreign ledgers stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChatMessage,
    ChatRead,
    ChatAck,
    SystemNotify,
    SystemNotifyAck,
    /// Group lifecycle kinds (`group.create`, `group.update`, …); stores the
    /// full dotted name.
    Group(String),
    /// Actor lifecycle kinds (`actor.add`, `actor.start`, …); stores the
    /// full dotted name.
    Actor(String),
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ChatMessage => "chat.message",
            EventKind::ChatRead => "chat.read",
            EventKind::ChatAck => "chat.ack",
            EventKind::SystemNotify => "system.notify",
            EventKind::SystemNotifyAck => "system.notify_ack",
            EventKind::Group(s) | EventKind::Actor(s) | EventKind::Other(s) => s,
        }
    }

    /// `group.<op>` lifecycle kind.
    pub fn group(op: &str) -> Self {
        EventKind::Group(format!("group.{op}"))
    }

    /// `actor.<op>` lifecycle kind.
    pub fn actor(op: &str) -> Self {
        EventKind::Actor(format!("actor.{op}"))
    }

    /// Top-level family of the kind (`chat`, `system`, `group`, `actor`, …).
    pub fn family(&self) -> &str {
        let s = self.as_str();
        s.split('.').next().unwrap_or(s)
    }

    pub fn is_chat_message(&self) -> bool {
        matches!(self, EventKind::ChatMessage)
    }

    pub fn is_notify(&self) -> bool {
        matches!(self, EventKind::SystemNotify)
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "chat.message" => EventKind::ChatMessage,
            "chat.read" => EventKind::ChatRead,
            "chat.ack" => EventKind::ChatAck,
            "system.notify" => EventKind::SystemNotify,
            "system.notify_ack" => EventKind::SystemNotifyAck,
            other if other.starts_with("group.") => EventKind::Group(other.to_string()),
            other if other.starts_with("actor.") => EventKind::Actor(other.to_string()),
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EventKind::from(s.as_str()))
    }
}

/// One record in the append-only ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: EventId,
    /// RFC3339 UTC timestamp.
    pub ts: String,
    pub kind: EventKind,
    pub group_id: GroupId,
    #[serde(default)]
    pub scope_key: String,
    /// Author: `"user"`, `"system"`, or an actor id.
    pub by: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl LedgerEvent {
    /// Decode the payload of a `chat.message` event. `None` for other kinds
    /// or malformed payloads.
    pub fn chat_message(&self) -> Option<ChatMessageData> {
        if !self.kind.is_chat_message() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }

    /// Decode the payload of a `system.notify` event.
    pub fn notify(&self) -> Option<NotifyData> {
        if !self.kind.is_notify() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }

    /// Decode the payload of a `chat.read` or `chat.ack` event.
    pub fn chat_ref(&self) -> Option<ChatAckData> {
        match self.kind {
            EventKind::ChatRead | EventKind::ChatAck => {
                serde_json::from_value(self.data.clone()).ok()
            }
            _ => None,
        }
    }
}

/// Chat priority. `attention` messages carry an ack obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    Attention,
}

impl Priority {
    pub fn is_attention(self) -> bool {
        matches!(self, Priority::Attention)
    }
}

/// An attachment reference stored with a chat message. The blob itself lives
/// under `state/blobs/`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub bytes: u64,
}

/// Payload of `chat.message`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatMessageData {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub reply_required: bool,
    /// Canonical recipient tokens (`@all`, `@peers`, `@foreman`, actor ids,
    /// `user`). Empty means "group default".
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Cross-group provenance: set on the destination copy of a relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_event_id: Option<String>,
    /// Cross-group routing: set on the source copy of a relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_to: Option<Vec<String>>,
}

fn default_format() -> String {
    "plain".to_string()
}

/// Payload of `chat.read` (cursor advance marker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReadData {
    pub actor_id: String,
    pub event_id: String,
}

/// Payload of `chat.ack` (attention acknowledgement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAckData {
    pub actor_id: String,
    pub event_id: String,
}

/// Sub-kind of a `system.notify` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    Nudge,
    Keepalive,
    HelpNudge,
    ActorIdle,
    SilenceCheck,
    Automation,
    StatusChange,
    Error,
    Info,
}

impl NotifyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyKind::Nudge => "nudge",
            NotifyKind::Keepalive => "keepalive",
            NotifyKind::HelpNudge => "help_nudge",
            NotifyKind::ActorIdle => "actor_idle",
            NotifyKind::SilenceCheck => "silence_check",
            NotifyKind::Automation => "automation",
            NotifyKind::StatusChange => "status_change",
            NotifyKind::Error => "error",
            NotifyKind::Info => "info",
        }
    }

    /// Kinds produced by the automation manager; these are the ones cleared
    /// from pending delivery queues on resume.
    pub fn is_automation_owned(self) -> bool {
        matches!(
            self,
            NotifyKind::Nudge
                | NotifyKind::Keepalive
                | NotifyKind::HelpNudge
                | NotifyKind::ActorIdle
                | NotifyKind::SilenceCheck
                | NotifyKind::Automation
        )
    }
}

/// Notification urgency, independent of chat priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Payload of `system.notify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyData {
    pub kind: NotifyKind,
    #[serde(default)]
    pub priority: NotifyPriority,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_actor_id: Option<String>,
    #[serde(default)]
    pub requires_ack: bool,
    /// Free-form context (e.g. `{"rule_id": …}` for rule-owned notifies,
    /// `{"event_id": …, "from": …}` for headless inbox pointers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl NotifyData {
    pub fn new(kind: NotifyKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            priority: NotifyPriority::Normal,
            title: title.into(),
            message: message.into(),
            target_actor_id: None,
            requires_ack: false,
            context: None,
        }
    }

    pub fn target(mut self, actor_id: impl Into<String>) -> Self {
        self.target_actor_id = Some(actor_id.into());
        self
    }

    /// Rule id recorded in `context` for rule-owned automation notifies.
    pub fn rule_id(&self) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|c| c.get("rule_id"))
            .and_then(|v| v.as_str())
    }
}

/// Payload of `system.notify_ack`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyAckData {
    pub actor_id: String,
    pub event_id: String,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
