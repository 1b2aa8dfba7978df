// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automation ops: state inspection, knob updates, rule management.

use super::groups::append_group_event;
use super::{arg_by, caller_of, load_group_for, require_admin, Caller, DaemonCtx};
use crate::protocol::{codes, Response};
use cccc_core::{AutomationRule, RuleAction, RuleScope};
use cccc_engine::AutomationConfig;
use cccc_runner::SessionAdapter;
use cccc_storage::{load_automation_state, save_group};

pub(crate) fn handle_state<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    let state = load_automation_state(&ctx.home, group.group_id.as_str()).unwrap_or_default();
    let cfg = AutomationConfig::from_group(&group);
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "version": group.automation.version,
        "config": {
            "reply_required_nudge_after_seconds": cfg.reply_required_nudge_after_seconds,
            "attention_ack_nudge_after_seconds": cfg.attention_ack_nudge_after_seconds,
            "unread_nudge_after_seconds": cfg.unread_nudge_after_seconds,
            "nudge_digest_min_interval_seconds": cfg.nudge_digest_min_interval_seconds,
            "nudge_max_repeats_per_obligation": cfg.nudge_max_repeats_per_obligation,
            "nudge_escalate_after_repeats": cfg.nudge_escalate_after_repeats,
            "actor_idle_timeout_seconds": cfg.actor_idle_timeout_seconds,
            "keepalive_delay_seconds": cfg.keepalive_delay_seconds,
            "keepalive_max_per_actor": cfg.keepalive_max_per_actor,
            "silence_timeout_seconds": cfg.silence_timeout_seconds,
            "help_nudge_interval_seconds": cfg.help_nudge_interval_seconds,
            "help_nudge_min_messages": cfg.help_nudge_min_messages,
        },
        "rules": group.automation.rules,
        "snippets": group.automation.snippets,
        "state": serde_json::to_value(&state).unwrap_or(serde_json::Value::Null),
    }))
}

pub(crate) fn handle_update<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let mut group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_admin(&group, &by) {
        return resp;
    }

    // Optimistic concurrency: callers send the version they edited.
    if let Some(expected) = args.get("expected_version").and_then(|v| v.as_u64()) {
        if expected != group.automation.version {
            return Response::error_with_details(
                codes::VERSION_CONFLICT,
                "automation settings changed concurrently",
                serde_json::json!({
                    "expected_version": expected,
                    "current_version": group.automation.version,
                }),
            );
        }
    }

    let Some(patch) = args.get("automation").and_then(|v| v.as_object()) else {
        return Response::error(codes::INVALID_PATCH, "missing automation object");
    };

    let mut merged = match serde_json::to_value(&group.automation) {
        Ok(v) => v,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    if let Some(obj) = merged.as_object_mut() {
        for (k, v) in patch {
            if k == "version" {
                continue;
            }
            obj.insert(k.clone(), v.clone());
        }
    }
    let mut automation: cccc_core::AutomationSettings = match serde_json::from_value(merged) {
        Ok(a) => a,
        Err(e) => return Response::error(codes::INVALID_PATCH, e.to_string()),
    };
    automation.version = group.automation.version + 1;
    group.automation = automation;

    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    let _ = append_group_event(
        ctx,
        &group,
        "update",
        &by,
        serde_json::json!({"automation_version": group.automation.version}),
    );
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "version": group.automation.version,
    }))
}

/// Rule-level permission: user always; foreman for group-scope rules;
/// peers only their own personal rules; agents may only manage `notify`
/// actions.
fn check_rule_permission(
    group: &cccc_core::GroupDoc,
    by: &str,
    rule: &AutomationRule,
) -> Result<(), Response> {
    let caller = caller_of(group, by);
    match caller {
        Some(Caller::User) => {}
        Some(Caller::Foreman) => {
            if rule.scope == RuleScope::Personal
                && rule.owner_actor_id.as_ref().is_some_and(|o| o.as_str() != by)
            {
                // Foreman may still see personal rules but not rewrite
                // someone else's control rules.
                if !matches!(rule.action, RuleAction::Notify { .. }) {
                    return Err(Response::error(
                        codes::PERMISSION_DENIED,
                        "foreman may not manage another actor's control rules",
                    ));
                }
            }
        }
        Some(Caller::Peer) => {
            if rule.scope != RuleScope::Personal
                || rule.owner_actor_id.as_ref().map(|o| o.as_str()) != Some(by)
            {
                return Err(Response::error(
                    codes::PERMISSION_DENIED,
                    "peers may only manage their own personal rules",
                ));
            }
        }
        None => {
            return Err(Response::error(
                codes::PERMISSION_DENIED,
                format!("unknown caller: {by}"),
            ))
        }
    }
    // Agent writes (foreman included) are restricted to notify actions.
    if caller != Some(Caller::User) && !matches!(rule.action, RuleAction::Notify { .. }) {
        return Err(Response::error(
            codes::PERMISSION_DENIED,
            "agents may only manage notify rules",
        ));
    }
    Ok(())
}

pub(crate) fn handle_manage<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let mut group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    if caller_of(&group, &by).is_none() {
        return Response::error(codes::PERMISSION_DENIED, format!("unknown caller: {by}"));
    }

    let Some(actions) = args.get("actions").and_then(|v| v.as_array()) else {
        return Response::error(codes::INVALID_REQUEST, "missing actions list");
    };

    let mut applied = Vec::new();
    for action in actions {
        let action_type = action
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        match action_type {
            "add_rule" | "update_rule" => {
                let Some(rule_value) = action.get("rule") else {
                    return Response::error(codes::INVALID_REQUEST, "missing rule");
                };
                let rule: AutomationRule = match serde_json::from_value(rule_value.clone()) {
                    Ok(r) => r,
                    Err(e) => {
                        return Response::error(
                            codes::INVALID_REQUEST,
                            format!("invalid rule: {e}"),
                        )
                    }
                };
                if rule.id.is_empty() {
                    return Response::error(codes::INVALID_REQUEST, "rule id cannot be empty");
                }
                // Personal rules address exactly their owner.
                if rule.scope == RuleScope::Personal {
                    let Some(owner) = &rule.owner_actor_id else {
                        return Response::error(
                            codes::INVALID_REQUEST,
                            "personal rules require owner_actor_id",
                        );
                    };
                    let owner_only =
                        rule.to.len() == 1 && rule.to[0].as_str() == owner.as_str();
                    if !rule.to.is_empty() && !owner_only {
                        return Response::error(
                            codes::INVALID_REQUEST,
                            "personal rules may only address their owner",
                        );
                    }
                }
                if let Err(resp) = check_rule_permission(&group, &by, &rule) {
                    return resp;
                }
                let rid = rule.id.as_str().to_string();
                let exists = group.automation.find_rule(&rid).is_some();
                if action_type == "add_rule" && exists {
                    return Response::error(
                        codes::INVALID_REQUEST,
                        format!("rule already exists: {rid}"),
                    );
                }
                if action_type == "update_rule" && !exists {
                    return Response::error(
                        codes::INVALID_REQUEST,
                        format!("rule not found: {rid}"),
                    );
                }
                group.automation.rules.retain(|r| r.id != rid.as_str());
                group.automation.rules.push(rule);
                applied.push(serde_json::json!({"type": action_type, "rule_id": rid}));
            }
            "remove_rule" | "set_rule_enabled" => {
                let rid = action
                    .get("rule_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .trim()
                    .to_string();
                let Some(existing) = group.automation.find_rule(&rid).cloned() else {
                    return Response::error(
                        codes::INVALID_REQUEST,
                        format!("rule not found: {rid}"),
                    );
                };
                if let Err(resp) = check_rule_permission(&group, &by, &existing) {
                    return resp;
                }
                if action_type == "remove_rule" {
                    group.automation.rules.retain(|r| r.id != rid.as_str());
                } else {
                    let enabled = action
                        .get("enabled")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    if let Some(rule) = group.automation.find_rule_mut(&rid) {
                        rule.enabled = enabled;
                    }
                }
                applied.push(serde_json::json!({"type": action_type, "rule_id": rid}));
            }
            "set_snippet" => {
                if caller_of(&group, &by) == Some(Caller::Peer) {
                    return Response::error(
                        codes::PERMISSION_DENIED,
                        "peers may not edit shared snippets",
                    );
                }
                let name = action
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if name.is_empty() {
                    return Response::error(codes::INVALID_REQUEST, "missing snippet name");
                }
                match action.get("text").and_then(|v| v.as_str()) {
                    Some(text) if !text.is_empty() => {
                        group.automation.snippets.insert(name.clone(), text.to_string());
                    }
                    _ => {
                        group.automation.snippets.remove(&name);
                    }
                }
                applied.push(serde_json::json!({"type": "set_snippet", "name": name}));
            }
            other => {
                return Response::error(
                    codes::INVALID_REQUEST,
                    format!("unknown action type: {other}"),
                )
            }
        }
    }

    group.automation.version += 1;
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    let _ = append_group_event(
        ctx,
        &group,
        "update",
        &by,
        serde_json::json!({"automation_actions": applied.len()}),
    );
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "version": group.automation.version,
        "applied": applied,
    }))
}

pub(crate) fn handle_reset_baseline<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_admin(&group, &by) {
        return resp;
    }
    ctx.automation.on_resume(&group);
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "reset": true}))
}
