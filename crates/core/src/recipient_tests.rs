// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::actor::ActorDef;
use crate::event::{ChatMessageData, EventKind, NotifyData, NotifyKind};
use crate::group::GroupDoc;
use crate::id::{EventId, GroupId};

fn group() -> GroupDoc {
    let mut g = GroupDoc::new(GroupId::new("g_demo"), "demo", "2026-01-01T00:00:00.000Z");
    g.actors.push(ActorDef::new("fore"));
    g.actors.push(ActorDef::new("peer-a"));
    let mut disabled = ActorDef::new("peer-off");
    disabled.enabled = false;
    g.actors.push(disabled);
    g
}

fn chat(by: &str, to: &[&str]) -> LedgerEvent {
    let data = ChatMessageData {
        text: "hi".to_string(),
        to: to.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };
    LedgerEvent {
        id: EventId::new("ev_0001"),
        ts: "2026-01-01T00:00:01.000Z".to_string(),
        kind: EventKind::ChatMessage,
        group_id: GroupId::new("g_demo"),
        scope_key: String::new(),
        by: by.to_string(),
        data: serde_json::to_value(data).unwrap(),
    }
}

#[test]
fn resolve_canonicalizes_and_dedupes() {
    let g = group();
    let tokens = vec![
        "@all".to_string(),
        "@peer-a".to_string(),
        "peer-a".to_string(),
        "@user".to_string(),
    ];
    let out = resolve_recipient_tokens(&g, &tokens).unwrap();
    assert_eq!(out, vec!["@all", "peer-a", "user"]);
}

#[test]
fn resolve_rejects_unknown_actor() {
    let g = group();
    let err = resolve_recipient_tokens(&g, &["ghost".to_string()]).unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn targets_any_agent_logic() {
    assert!(targets_any_agent(&[]));
    assert!(targets_any_agent(&["@all".to_string()]));
    assert!(targets_any_agent(&["peer-a".to_string(), "user".to_string()]));
    assert!(!targets_any_agent(&["user".to_string()]));
}

#[test]
fn enabled_recipients_expand_tokens() {
    let g = group();
    assert_eq!(
        enabled_recipient_actor_ids(&g, &["@all".to_string()]),
        vec!["fore", "peer-a"]
    );
    assert_eq!(
        enabled_recipient_actor_ids(&g, &["@peers".to_string()]),
        vec!["peer-a"]
    );
    assert_eq!(
        enabled_recipient_actor_ids(&g, &["@foreman".to_string()]),
        vec!["fore"]
    );
    // Disabled actors never match, even when named directly.
    assert!(enabled_recipient_actor_ids(&g, &["peer-off".to_string()]).is_empty());
}

#[test]
fn sender_never_sees_own_message() {
    let g = group();
    let ev = chat("peer-a", &["@all"]);
    assert!(!is_message_for_actor(&g, "peer-a", &ev));
    assert!(is_message_for_actor(&g, "fore", &ev));
}

#[test]
fn broadcast_includes_user() {
    let g = group();
    let ev = chat("fore", &["@all"]);
    assert!(is_message_for_actor(&g, "user", &ev));
    assert!(is_message_for_actor(&g, "peer-a", &ev));
    assert!(!is_message_for_actor(&g, "peer-off", &ev));
}

#[test]
fn peers_token_excludes_foreman() {
    let g = group();
    let ev = chat("user", &["@peers"]);
    assert!(!is_message_for_actor(&g, "fore", &ev));
    assert!(is_message_for_actor(&g, "peer-a", &ev));
}

#[test]
fn foreman_token_matches_only_foreman() {
    let g = group();
    let ev = chat("user", &["@foreman"]);
    assert!(is_message_for_actor(&g, "fore", &ev));
    assert!(!is_message_for_actor(&g, "peer-a", &ev));
}

#[test]
fn empty_to_is_broadcast() {
    let g = group();
    let ev = chat("user", &[]);
    assert!(is_message_for_actor(&g, "fore", &ev));
    assert!(is_message_for_actor(&g, "peer-a", &ev));
}

#[test]
fn user_token_addresses_only_user() {
    let g = group();
    let ev = chat("fore", &["user"]);
    assert!(is_message_for_actor(&g, "user", &ev));
    assert!(!is_message_for_actor(&g, "peer-a", &ev));
}

#[test]
fn notify_targets_one_actor_or_broadcasts() {
    let g = group();
    let mut ev = chat("system", &[]);
    ev.kind = EventKind::SystemNotify;
    ev.data = serde_json::to_value(
        NotifyData::new(NotifyKind::Nudge, "t", "m").target("peer-a"),
    )
    .unwrap();
    assert!(is_message_for_actor(&g, "peer-a", &ev));
    assert!(!is_message_for_actor(&g, "fore", &ev));

    ev.data = serde_json::to_value(NotifyData::new(NotifyKind::Info, "t", "m")).unwrap();
    assert!(is_message_for_actor(&g, "fore", &ev));
    assert!(!is_message_for_actor(&g, "user", &ev));
}

#[test]
fn lifecycle_events_are_never_inbox_messages() {
    let g = group();
    let mut ev = chat("user", &["@all"]);
    ev.kind = EventKind::group("update");
    assert!(!is_message_for_actor(&g, "peer-a", &ev));
}

#[test]
fn reply_defaults_to_original_author() {
    let g = group();
    let ev = chat("fore", &["peer-a"]);
    assert_eq!(default_reply_recipients(&g, "peer-a", &ev), vec!["fore"]);
}

#[test]
fn reply_to_own_message_falls_back_to_recipients() {
    let g = group();
    let ev = chat("peer-a", &["fore", "user"]);
    assert_eq!(
        default_reply_recipients(&g, "peer-a", &ev),
        vec!["fore", "user"]
    );
}
