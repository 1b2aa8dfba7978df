// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::id::RuleId;

#[test]
fn interval_trigger_round_trips() {
    let r: AutomationRule = serde_json::from_value(serde_json::json!({
        "id": "r1",
        "to": ["@foreman"],
        "trigger": {"kind": "interval", "every_seconds": 900},
        "action": {"kind": "notify", "message": "standup"}
    }))
    .unwrap();
    assert!(r.enabled);
    assert_eq!(r.scope, RuleScope::Group);
    assert_eq!(
        r.trigger,
        RuleTrigger::Interval { every_seconds: 900 }
    );
}

#[test]
fn cron_trigger_defaults_to_utc() {
    let t: RuleTrigger = serde_json::from_value(serde_json::json!({
        "kind": "cron", "cron": "0 9 * * 1-5"
    }))
    .unwrap();
    match t {
        RuleTrigger::Cron { cron, timezone } => {
            assert_eq!(cron, "0 9 * * 1-5");
            assert_eq!(timezone, "UTC");
        }
        other => panic!("unexpected trigger: {other:?}"),
    }
}

#[test]
fn at_trigger_parses() {
    let t: RuleTrigger = serde_json::from_value(serde_json::json!({
        "kind": "at", "at": "2026-03-01T09:00:00Z"
    }))
    .unwrap();
    assert_eq!(
        t,
        RuleTrigger::At {
            at: "2026-03-01T09:00:00Z".to_string()
        }
    );
}

#[test]
fn action_kinds_parse() {
    let a: RuleAction = serde_json::from_value(serde_json::json!({
        "kind": "group_state", "state": "paused"
    }))
    .unwrap();
    assert_eq!(a, RuleAction::GroupState { state: "paused".to_string() });

    let a: RuleAction = serde_json::from_value(serde_json::json!({
        "kind": "actor_control", "operation": "restart", "targets": ["@peers"]
    }))
    .unwrap();
    assert_eq!(
        a,
        RuleAction::ActorControl {
            operation: "restart".to_string(),
            targets: vec!["@peers".to_string()]
        }
    );
}

#[test]
fn knob_reads_numbers_and_strings_with_default() {
    let mut s = AutomationSettings::default();
    s.extra
        .insert("silence_timeout_seconds".to_string(), serde_json::json!(120));
    s.extra
        .insert("keepalive_delay_seconds".to_string(), serde_json::json!("45"));
    s.extra
        .insert("bad_value".to_string(), serde_json::json!([1]));
    assert_eq!(s.knob("silence_timeout_seconds", 600), 120);
    assert_eq!(s.knob("keepalive_delay_seconds", 120), 45);
    assert_eq!(s.knob("bad_value", 7), 7);
    assert_eq!(s.knob("absent", 300), 300);
}

#[test]
fn knob_clamps_negative_to_zero() {
    let mut s = AutomationSettings::default();
    s.extra.insert("x".to_string(), serde_json::json!(-5));
    assert_eq!(s.knob("x", 10), 0);
}

#[test]
fn find_rule_by_id() {
    let mut s = AutomationSettings::default();
    s.rules.push(AutomationRule {
        id: RuleId::new("r1"),
        enabled: true,
        scope: RuleScope::Group,
        owner_actor_id: None,
        to: vec![],
        trigger: RuleTrigger::Interval { every_seconds: 60 },
        action: RuleAction::Notify {
            title: String::new(),
            message: "m".to_string(),
            snippet_ref: String::new(),
            priority: Default::default(),
            requires_ack: false,
        },
        extra: Default::default(),
    });
    assert!(s.find_rule("r1").is_some());
    assert!(s.find_rule("r2").is_none());
}
