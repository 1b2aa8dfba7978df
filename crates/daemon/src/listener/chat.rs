// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat send/reply ops and cross-group relay.

use super::groups::automation_notify_kinds;
use super::{arg_bool, arg_by, arg_str, arg_str_list, load_group_for, runner_ops, DaemonCtx};
use crate::protocol::{codes, Response};
use cccc_core::{
    default_reply_recipients, enabled_recipient_actor_ids, is_message_for_actor,
    resolve_recipient_tokens, targets_any_agent, Attachment, ChatMessageData, EventKind, GroupDoc,
    GroupState, LedgerEvent, NotifyData, NotifyKind, NotifyPriority, Priority, RunnerKind,
};
use cccc_engine::render_delivery_text;
use cccc_runner::{effective_runner_kind, SessionAdapter};
use cccc_storage::{find_event, load_registry, normalize_attachments, save_group};
use tracing::debug;

/// A human message to an idle group wakes it; agent chatter and throttled
/// deliveries never do.
fn wake_group_on_human_message<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group: &mut GroupDoc,
    by: &str,
) {
    if group.state != GroupState::Idle {
        return;
    }
    if by.is_empty() || by == "system" || group.find_actor(by).is_some() {
        return;
    }
    group.state = GroupState::Active;
    if save_group(&ctx.home, group).is_err() {
        return;
    }
    ctx.automation.on_resume(group);
    ctx.delivery
        .clear_pending_system_notifies(group.group_id.as_str(), &automation_notify_kinds());
}

/// Disabled actors covered by the recipient tokens.
fn disabled_recipient_actor_ids(group: &GroupDoc, to: &[String]) -> Vec<String> {
    let foreman_id = group.foreman_id();
    let mut out = Vec::new();
    let tokens: Vec<&str> = if to.is_empty() {
        vec!["@all"]
    } else {
        to.iter().map(|s| s.as_str()).collect()
    };
    for actor in &group.actors {
        if actor.enabled || actor.id.is_user() {
            continue;
        }
        let aid = actor.id.as_str();
        let hit = tokens.iter().any(|t| match *t {
            "@all" => true,
            "@peers" => foreman_id.as_ref().map(|f| f.as_str()) != Some(aid),
            "@foreman" => foreman_id.as_ref().map(|f| f.as_str()) == Some(aid),
            "user" | "@user" => false,
            other => other == aid,
        });
        if hit && !out.contains(&aid.to_string()) {
            out.push(aid.to_string());
        }
    }
    out
}

/// Auto-start disabled actors that match the recipient list. Returns the
/// ids actually woken (started and re-enabled).
async fn auto_wake_recipients<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group: &mut GroupDoc,
    to: &[String],
) -> Vec<String> {
    let mut woken = Vec::new();
    for actor_id in disabled_recipient_actor_ids(group, to) {
        match runner_ops::start_actor_process(ctx, group, &actor_id).await {
            Ok(_) => {
                if let Some(actor) = group.find_actor_mut(&actor_id) {
                    actor.enabled = true;
                }
                woken.push(actor_id);
            }
            Err(e) => {
                debug!(actor_id, error = %e, "auto-wake start failed");
            }
        }
    }
    if !woken.is_empty() {
        let _ = save_group(&ctx.home, group);
    }
    woken
}

/// Resolve `to` tokens with the original's fallbacks: explicit tokens,
/// then `@`-mentions scanned from the text, then the group default.
fn resolve_effective_to(
    group: &GroupDoc,
    to_tokens: &[String],
    text: &str,
) -> Result<Vec<String>, Response> {
    let mut to = resolve_recipient_tokens(group, to_tokens)
        .map_err(|e| Response::error(codes::INVALID_RECIPIENT, e.to_string()))?;

    if to.is_empty() {
        let mentions = scan_mentions(group, text);
        if !mentions.is_empty() {
            to = resolve_recipient_tokens(group, &mentions)
                .map_err(|e| Response::error(codes::INVALID_RECIPIENT, e.to_string()))?;
        }
    }
    if to.is_empty() && group.messaging.default_send_to == cccc_core::SendTarget::Foreman {
        to = vec!["@foreman".to_string()];
    }
    Ok(to)
}

/// `@name` tokens in the body that resolve to known actors or group tokens.
fn scan_mentions(group: &GroupDoc, text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find('@') {
        rest = &rest[at + 1..];
        let word: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if word.is_empty() {
            continue;
        }
        let token = match word.as_str() {
            "all" | "peers" | "foreman" | "user" => format!("@{word}"),
            other if group.find_actor(other).is_some() => other.to_string(),
            _ => continue,
        };
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// Fan a freshly appended chat event out: PTY queues for pty recipients,
/// inbox-pointer notifies for headless ones.
async fn fan_out_chat<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group: &GroupDoc,
    event: &LedgerEvent,
    effective_to: &[String],
    delivery_text: &str,
) {
    let mut event_for_match = event.clone();
    if let Some(obj) = event_for_match.data.as_object_mut() {
        obj.insert("to".to_string(), serde_json::json!(effective_to));
    }

    let data = event.chat_message().unwrap_or_default();
    for actor in &group.actors {
        let actor_id = actor.id.as_str();
        if actor_id == event.by || actor.id.is_user() {
            continue;
        }
        if !is_message_for_actor(group, actor_id, &event_for_match) {
            continue;
        }
        match effective_runner_kind(actor.runner) {
            RunnerKind::Pty => {
                ctx.delivery.queue_chat_message(
                    group,
                    actor_id,
                    &event_for_match,
                    delivery_text.to_string(),
                );
            }
            RunnerKind::Headless => {
                // Headless actors poll their inbox; they get a pointer.
                if !ctx.headless.actor_running(group.group_id.as_str(), actor_id) {
                    continue;
                }
                let (title, priority) = if data.reply_required {
                    ("Task message", NotifyPriority::Urgent)
                } else if data.priority.is_attention() {
                    ("Important message", NotifyPriority::Urgent)
                } else {
                    ("New message", NotifyPriority::High)
                };
                let notify = NotifyData {
                    kind: NotifyKind::Info,
                    priority,
                    title: title.to_string(),
                    message: format!("New message from {}. Check your inbox.", event.by),
                    target_actor_id: Some(actor_id.to_string()),
                    requires_ack: false,
                    context: Some(serde_json::json!({
                        "event_id": event.id.as_str(),
                        "from": event.by,
                    })),
                };
                if let Ok(v) = serde_json::to_value(&notify) {
                    let _ = ctx.ledger.append(
                        &ctx.home.ledger_path(group.group_id.as_str()),
                        EventKind::SystemNotify,
                        &group.group_id,
                        "",
                        "system",
                        v,
                    );
                }
            }
        }
    }
    ctx.delivery.tick_delivery(group).await;
}

fn touch_registry_updated_at<S: SessionAdapter>(ctx: &DaemonCtx<S>, group_id: &str, ts: &str) {
    if let Ok(mut reg) = load_registry(&ctx.home) {
        reg.touch_group(group_id, ts);
        let _ = reg.save(&ctx.home);
    }
}

fn parse_priority(args: &serde_json::Value) -> Result<Priority, Response> {
    match arg_str(args, "priority").as_str() {
        "" | "normal" => Ok(Priority::Normal),
        "attention" => Ok(Priority::Attention),
        other => Err(Response::error(
            codes::INVALID_PRIORITY,
            format!("priority must be 'normal' or 'attention', got: {other}"),
        )),
    }
}

fn attachments_for(
    ctx_home: &cccc_storage::Home,
    group: &GroupDoc,
    args: &serde_json::Value,
) -> Result<Vec<Attachment>, Response> {
    normalize_attachments(ctx_home, group, args.get("attachments"))
        .map_err(|e| Response::error(codes::INVALID_ATTACHMENTS, e.to_string()))
}

pub(crate) async fn handle_send<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let text = args
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let priority = match parse_priority(args) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let reply_required = arg_bool(args, "reply_required");

    let mut group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    wake_group_on_human_message(ctx, &mut group, &by);

    // Cross-group provenance/routing must come in pairs.
    let mut src_group_id = arg_str(args, "src_group_id");
    let mut src_event_id = arg_str(args, "src_event_id");
    if src_group_id.is_empty() != src_event_id.is_empty() {
        src_group_id.clear();
        src_event_id.clear();
    }
    let dst_group_id = arg_str(args, "dst_group_id");
    let dst_to = arg_str_list(args, "dst_to");

    let to = match resolve_effective_to(&group, &arg_str_list(args, "to"), &text) {
        Ok(to) => to,
        Err(resp) => return resp,
    };

    if targets_any_agent(&to) {
        let mut matched: Vec<String> = enabled_recipient_actor_ids(&group, &to);
        matched.retain(|aid| aid != &by);
        if matched.is_empty() {
            let woken = auto_wake_recipients(ctx, &mut group, &to).await;
            if woken.is_empty() {
                let wanted = if to.is_empty() {
                    "@all".to_string()
                } else {
                    to.join(" ")
                };
                return Response::error_with_details(
                    codes::NO_ENABLED_RECIPIENTS,
                    format!("no enabled agents match recipients: {wanted}"),
                    serde_json::json!({"to": to}),
                );
            }
        }
    }

    // Scope: explicit path must already be attached; else the active scope.
    let scope_key = {
        let path = arg_str(args, "path");
        if !path.is_empty() {
            let (scope_key, _, _) = super::groups::detect_scope(std::path::Path::new(&path));
            if group.find_scope(&scope_key).is_none() {
                return Response::error_with_details(
                    codes::SCOPE_NOT_ATTACHED,
                    format!("scope not attached: {scope_key}"),
                    serde_json::json!({"hint": "cccc attach <path> --group <id>"}),
                );
            }
            scope_key
        } else {
            group.active_scope_key.clone()
        }
    };

    let attachments = match attachments_for(&ctx.home, &group, args) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    if text.trim().is_empty() && attachments.is_empty() {
        return Response::error(codes::EMPTY_MESSAGE, "message text cannot be empty");
    }

    let data = ChatMessageData {
        text: text.clone(),
        priority,
        reply_required,
        to: to.clone(),
        attachments: attachments.clone(),
        src_group_id: (!src_group_id.is_empty()).then_some(src_group_id.clone()),
        src_event_id: (!src_event_id.is_empty()).then_some(src_event_id.clone()),
        dst_group_id: (!dst_group_id.is_empty()).then_some(dst_group_id.clone()),
        dst_to: (!dst_group_id.is_empty()).then_some(dst_to),
        ..Default::default()
    };
    let payload = match serde_json::to_value(&data) {
        Ok(v) => v,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let event = match ctx.ledger.append(
        &ctx.home.ledger_path(group.group_id.as_str()),
        EventKind::ChatMessage,
        &group.group_id,
        &scope_key,
        &by,
        payload,
    ) {
        Ok(ev) => ev,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    touch_registry_updated_at(ctx, group.group_id.as_str(), &event.ts);

    let effective_to = if to.is_empty() {
        vec!["@all".to_string()]
    } else {
        to
    };
    let delivery_text = render_delivery_text(
        &text,
        priority,
        reply_required,
        event.id.as_str(),
        &attachments,
        (!src_group_id.is_empty()).then_some(src_group_id.as_str()),
        (!src_event_id.is_empty()).then_some(src_event_id.as_str()),
    );
    fan_out_chat(ctx, &group, &event, &effective_to, &delivery_text).await;

    match serde_json::to_value(&event) {
        Ok(ev) => Response::ok(serde_json::json!({"event": ev})),
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

pub(crate) async fn handle_reply<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let text = args
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let reply_to = arg_str(args, "reply_to");
    if reply_to.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing reply_to event_id");
    }
    let priority = match parse_priority(args) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let reply_required = arg_bool(args, "reply_required");

    let mut group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    wake_group_on_human_message(ctx, &mut group, &by);

    let ledger_path = ctx.home.ledger_path(group.group_id.as_str());
    let Some(original) = find_event(&ledger_path, &reply_to) else {
        return Response::error(codes::EVENT_NOT_FOUND, format!("event not found: {reply_to}"));
    };
    let quote = cccc_engine::quote_text(&ctx.home, &group, &reply_to, 100);

    let mut to_tokens = arg_str_list(args, "to");
    if to_tokens.is_empty() {
        to_tokens = default_reply_recipients(&group, &by, &original);
    }
    let to = match resolve_recipient_tokens(&group, &to_tokens) {
        Ok(to) => to,
        Err(e) => return Response::error(codes::INVALID_RECIPIENT, e.to_string()),
    };

    if targets_any_agent(&to) {
        let mut matched = enabled_recipient_actor_ids(&group, &to);
        matched.retain(|aid| aid != &by);
        if matched.is_empty() {
            let woken = auto_wake_recipients(ctx, &mut group, &to).await;
            if woken.is_empty() {
                let wanted = if to.is_empty() {
                    "@all".to_string()
                } else {
                    to.join(" ")
                };
                return Response::error_with_details(
                    codes::NO_ENABLED_RECIPIENTS,
                    format!("no enabled agents match recipients: {wanted}"),
                    serde_json::json!({"to": to}),
                );
            }
        }
    }

    let attachments = match attachments_for(&ctx.home, &group, args) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    if text.trim().is_empty() && attachments.is_empty() {
        return Response::error(codes::EMPTY_MESSAGE, "message text cannot be empty");
    }

    let data = ChatMessageData {
        text: text.clone(),
        priority,
        reply_required,
        to: to.clone(),
        reply_to: Some(reply_to.clone()),
        quote_text: quote,
        attachments: attachments.clone(),
        ..Default::default()
    };
    let payload = match serde_json::to_value(&data) {
        Ok(v) => v,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let event = match ctx.ledger.append(
        &ledger_path,
        EventKind::ChatMessage,
        &group.group_id,
        &group.active_scope_key.clone(),
        &by,
        payload,
    ) {
        Ok(ev) => ev,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };

    // Replying to someone else's attention message implies the ack.
    let mut ack_event = None;
    if original.kind.is_chat_message() && original.by != by {
        let original_attention = original
            .chat_message()
            .map(|d| d.priority.is_attention())
            .unwrap_or(false);
        if original_attention
            && is_message_for_actor(&group, &by, &original)
            && !cccc_engine::has_chat_ack(&ctx.home, &group, &reply_to, &by)
        {
            ack_event = ctx
                .ledger
                .append(
                    &ledger_path,
                    EventKind::ChatAck,
                    &group.group_id,
                    "",
                    &by,
                    serde_json::json!({"actor_id": by, "event_id": reply_to}),
                )
                .ok();
        }
    }

    touch_registry_updated_at(ctx, group.group_id.as_str(), &event.ts);

    let effective_to = if to.is_empty() {
        vec!["@all".to_string()]
    } else {
        to
    };
    let delivery_text = render_delivery_text(
        &text,
        priority,
        reply_required,
        event.id.as_str(),
        &attachments,
        None,
        None,
    );
    fan_out_chat(ctx, &group, &event, &effective_to, &delivery_text).await;

    Response::ok(serde_json::json!({
        "event": serde_json::to_value(&event).ok(),
        "ack_event": ack_event.and_then(|e| serde_json::to_value(e).ok()),
    }))
}

pub(crate) async fn handle_send_cross_group<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let src_group_id = arg_str(args, "group_id");
    let dst_group_id = arg_str(args, "dst_group_id");
    let text = args
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if args.get("attachments").map(|v| !v.is_null()).unwrap_or(false) {
        return Response::error(
            "attachments_not_supported",
            "attachments are not supported for cross-group messages yet",
        );
    }
    if let Err(resp) = parse_priority(args) {
        return resp;
    }
    if src_group_id.is_empty() {
        return Response::error(codes::MISSING_GROUP_ID, "missing group_id");
    }
    if dst_group_id.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing dst_group_id");
    }
    if src_group_id == dst_group_id {
        return Response::error(
            codes::INVALID_REQUEST,
            "dst_group_id must be different from group_id",
        );
    }

    // Both group mutexes, sorted by id so concurrent opposite-direction
    // relays cannot deadlock.
    let mut lock_order = [src_group_id.clone(), dst_group_id.clone()];
    lock_order.sort();
    let _first = ctx.group_lock(&lock_order[0]).lock_owned().await;
    let _second = ctx.group_lock(&lock_order[1]).lock_owned().await;

    let dst_group = match cccc_storage::load_group(&ctx.home, &dst_group_id) {
        Ok(Some(g)) => g,
        Ok(None) => {
            return Response::error(
                codes::GROUP_NOT_FOUND,
                format!("group not found: {dst_group_id}"),
            )
        }
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let dst_to = match resolve_recipient_tokens(&dst_group, &arg_str_list(args, "to")) {
        Ok(to) => to,
        Err(e) => return Response::error(codes::INVALID_RECIPIENT, e.to_string()),
    };

    // Source copy: addressed to the user, records where it went.
    let src_resp = handle_send(
        ctx,
        &serde_json::json!({
            "group_id": src_group_id,
            "text": text,
            "by": by,
            "to": ["user"],
            "priority": arg_str(args, "priority"),
            "reply_required": arg_bool(args, "reply_required"),
            "dst_group_id": dst_group_id,
            "dst_to": dst_to,
        }),
    )
    .await;
    if !src_resp.ok {
        return src_resp;
    }
    let src_event = src_resp
        .result
        .as_ref()
        .and_then(|r| r.get("event"))
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    let src_event_id = src_event
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if src_event_id.is_empty() {
        return Response::error(codes::INTERNAL_ERROR, "missing source event id");
    }

    // Destination copy carries provenance.
    let dst_resp = handle_send(
        ctx,
        &serde_json::json!({
            "group_id": dst_group_id,
            "text": text,
            "by": by,
            "to": dst_to,
            "priority": arg_str(args, "priority"),
            "reply_required": arg_bool(args, "reply_required"),
            "src_group_id": src_group_id,
            "src_event_id": src_event_id,
        }),
    )
    .await;
    if !dst_resp.ok {
        return dst_resp;
    }
    let dst_event = dst_resp
        .result
        .as_ref()
        .and_then(|r| r.get("event"))
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    Response::ok(serde_json::json!({"src_event": src_event, "dst_event": dst_event}))
}
