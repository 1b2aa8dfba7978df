// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::{EventId, GroupId};

fn chat_event(data: ChatMessageData) -> LedgerEvent {
    LedgerEvent {
        id: EventId::new("ev_0001"),
        ts: "2026-01-02T03:04:05.000Z".to_string(),
        kind: EventKind::ChatMessage,
        group_id: GroupId::new("g_demo"),
        scope_key: String::new(),
        by: "user".to_string(),
        data: serde_json::to_value(&data).unwrap(),
    }
}

#[yare::parameterized(
    chat_message = { "chat.message" },
    chat_read    = { "chat.read" },
    chat_ack     = { "chat.ack" },
    notify       = { "system.notify" },
    notify_ack   = { "system.notify_ack" },
    group_update = { "group.update" },
    actor_start  = { "actor.start" },
    unknown      = { "mystery.kind" },
)]
fn kind_round_trips_through_string(name: &str) {
    let kind = EventKind::from(name);
    assert_eq!(kind.as_str(), name);
    let json = serde_json::to_string(&kind).unwrap();
    assert_eq!(json, format!("{:?}", name));
    let back: EventKind = serde_json::from_str(&json).unwrap();
    assert_eq!(back, kind);
}

#[test]
fn kind_families() {
    assert_eq!(EventKind::ChatMessage.family(), "chat");
    assert_eq!(EventKind::group("set_state").family(), "group");
    assert_eq!(EventKind::actor("restart").as_str(), "actor.restart");
}

#[test]
fn unknown_kind_survives_envelope_round_trip() {
    let ev = LedgerEvent {
        id: EventId::new("ev_0001"),
        ts: "2026-01-02T03:04:05.000Z".to_string(),
        kind: EventKind::from("future.kind"),
        group_id: GroupId::new("g_demo"),
        scope_key: String::new(),
        by: "system".to_string(),
        data: serde_json::json!({"anything": [1, 2, 3]}),
    };
    let line = serde_json::to_string(&ev).unwrap();
    let back: LedgerEvent = serde_json::from_str(&line).unwrap();
    assert_eq!(back, ev);
}

#[test]
fn chat_message_payload_decodes() {
    let data = ChatMessageData {
        text: "hi".to_string(),
        priority: Priority::Attention,
        reply_required: true,
        to: vec!["@all".to_string()],
        ..Default::default()
    };
    let ev = chat_event(data.clone());
    let decoded = ev.chat_message().unwrap();
    assert_eq!(decoded, data);
    assert!(decoded.priority.is_attention());
}

#[test]
fn chat_message_accessor_rejects_other_kinds() {
    let mut ev = chat_event(ChatMessageData::default());
    ev.kind = EventKind::SystemNotify;
    assert!(ev.chat_message().is_none());
}

#[test]
fn chat_message_defaults_are_lenient() {
    let data: ChatMessageData = serde_json::from_value(serde_json::json!({
        "text": "bare"
    }))
    .unwrap();
    assert_eq!(data.format, "plain");
    assert_eq!(data.priority, Priority::Normal);
    assert!(!data.reply_required);
    assert!(data.to.is_empty());
}

#[test]
fn notify_payload_round_trips() {
    let notify = NotifyData {
        kind: NotifyKind::Nudge,
        priority: NotifyPriority::High,
        title: "Action items pending".to_string(),
        message: "line".to_string(),
        target_actor_id: Some("peer-a".to_string()),
        requires_ack: false,
        context: Some(serde_json::json!({"rule_id": "r1"})),
    };
    let v = serde_json::to_value(&notify).unwrap();
    assert_eq!(v.get("kind").unwrap(), "nudge");
    let back: NotifyData = serde_json::from_value(v).unwrap();
    assert_eq!(back, notify);
    assert_eq!(back.rule_id(), Some("r1"));
}

#[test]
fn notify_kind_automation_owned_set() {
    assert!(NotifyKind::Nudge.is_automation_owned());
    assert!(NotifyKind::Automation.is_automation_owned());
    assert!(!NotifyKind::Info.is_automation_owned());
    assert!(!NotifyKind::StatusChange.is_automation_owned());
}

#[test]
fn priority_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&Priority::Attention).unwrap(),
        "\"attention\""
    );
    assert_eq!(
        serde_json::to_string(&NotifyPriority::Urgent).unwrap(),
        "\"urgent\""
    );
}
