// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::actor::{ActorDef, Role};
use crate::id::GroupId;

fn group_with_actors(actors: Vec<ActorDef>) -> GroupDoc {
    let mut g = GroupDoc::new(GroupId::new("g_demo"), "demo", "2026-01-01T00:00:00.000Z");
    g.actors = actors;
    g
}

#[test]
fn foreman_defaults_to_first_enabled_actor() {
    let mut a = ActorDef::new("peer-a");
    a.enabled = false;
    let b = ActorDef::new("peer-b");
    let c = ActorDef::new("peer-c");
    let g = group_with_actors(vec![a, b, c]);
    assert_eq!(g.foreman_id().unwrap(), "peer-b");
}

#[test]
fn explicit_foreman_tag_wins() {
    let a = ActorDef::new("peer-a");
    let mut b = ActorDef::new("peer-b");
    b.role = Some(Role::Foreman);
    let g = group_with_actors(vec![a, b]);
    assert_eq!(g.foreman_id().unwrap(), "peer-b");
}

#[test]
fn no_enabled_actors_means_no_foreman() {
    let mut a = ActorDef::new("peer-a");
    a.enabled = false;
    let g = group_with_actors(vec![a]);
    assert!(g.foreman_id().is_none());
}

#[test]
fn effective_role_resolution() {
    let a = ActorDef::new("peer-a");
    let b = ActorDef::new("peer-b");
    let g = group_with_actors(vec![a, b]);
    assert_eq!(g.effective_role("peer-a"), Some("foreman"));
    assert_eq!(g.effective_role("peer-b"), Some("peer"));
    assert_eq!(g.effective_role("user"), Some("user"));
    assert_eq!(g.effective_role("ghost"), None);
}

#[test]
fn group_state_parse() {
    assert_eq!(GroupState::parse("active"), Some(GroupState::Active));
    assert_eq!(GroupState::parse("idle"), Some(GroupState::Idle));
    assert_eq!(GroupState::parse("paused"), Some(GroupState::Paused));
    assert_eq!(GroupState::parse("stopped"), None);
}

#[test]
fn doc_round_trip_preserves_unknown_fields() {
    let v = serde_json::json!({
        "group_id": "g_demo",
        "title": "demo",
        "future_section": {"x": 1},
        "actors": [{"id": "peer-a", "mystery": true}]
    });
    let doc: GroupDoc = serde_json::from_value(v).unwrap();
    assert!(doc.extra.contains_key("future_section"));
    let back = serde_json::to_value(&doc).unwrap();
    assert_eq!(back.get("future_section").unwrap(), &serde_json::json!({"x": 1}));
    assert_eq!(
        back.get("actors").unwrap()[0].get("mystery").unwrap(),
        &serde_json::json!(true)
    );
}

#[test]
fn delivery_settings_defaults() {
    let d: DeliverySettings = serde_json::from_value(serde_json::json!({})).unwrap();
    assert_eq!(d.min_interval_seconds, 0);
    assert!(!d.auto_mark_on_delivery);
}

#[test]
fn transcript_settings_defaults() {
    let t: TerminalTranscriptSettings = serde_json::from_value(serde_json::json!({})).unwrap();
    assert_eq!(t.visibility, TranscriptVisibility::Foreman);
    assert_eq!(t.notify_lines, 20);
    assert!(!t.notify_tail);
}

#[test]
fn find_scope_by_key() {
    let mut g = group_with_actors(vec![]);
    g.scopes.push(ScopeDef {
        scope_key: "fs:/tmp/proj".to_string(),
        url: "/tmp/proj".to_string(),
        ..Default::default()
    });
    assert!(g.find_scope("fs:/tmp/proj").is_some());
    assert!(g.find_scope("fs:/elsewhere").is_none());
}
