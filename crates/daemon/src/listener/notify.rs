// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System notify ops: out-of-band reminders and their acks.

use super::{arg_bool, arg_by, arg_str, load_group_for, runner_ops, DaemonCtx};
use crate::protocol::{codes, Response};
use cccc_core::{EventKind, NotifyData, NotifyKind, NotifyPriority, RunnerKind};
use cccc_runner::{effective_runner_kind, SessionAdapter};
use cccc_storage::find_event;

fn parse_notify_kind(raw: &str) -> Option<NotifyKind> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

fn parse_notify_priority(raw: &str) -> Option<NotifyPriority> {
    if raw.is_empty() {
        return Some(NotifyPriority::Normal);
    }
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

pub(crate) async fn handle_system_notify<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    let kind_arg = arg_str(args, "kind");
    let kind = if kind_arg.is_empty() {
        NotifyKind::Info
    } else {
        match parse_notify_kind(&kind_arg) {
            Some(k) => k,
            None => {
                return Response::error(
                    codes::INVALID_REQUEST,
                    format!("unknown notify kind: {kind_arg}"),
                )
            }
        }
    };
    // Agent-originated notifies are confined to informational kinds.
    if by != "user" && by != "system" && kind.is_automation_owned() {
        return Response::error(
            codes::PERMISSION_DENIED,
            format!("agents may not emit {} notifies", kind.as_str()),
        );
    }
    let Some(priority) = parse_notify_priority(&arg_str(args, "priority")) else {
        return Response::error(codes::INVALID_PRIORITY, "unknown notify priority");
    };

    let message = args
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if message.trim().is_empty() {
        return Response::error(codes::EMPTY_MESSAGE, "notify message cannot be empty");
    }
    let target_actor_id = arg_str(args, "target_actor_id");
    if !target_actor_id.is_empty()
        && target_actor_id != "user"
        && group.find_actor(&target_actor_id).is_none()
    {
        return Response::error(
            codes::ACTOR_NOT_FOUND,
            format!("actor not found: {target_actor_id}"),
        );
    }

    let notify = NotifyData {
        kind,
        priority,
        title: arg_str(args, "title"),
        message,
        target_actor_id: (!target_actor_id.is_empty()).then_some(target_actor_id.clone()),
        requires_ack: arg_bool(args, "requires_ack"),
        context: args.get("context").filter(|v| !v.is_null()).cloned(),
    };
    let payload = match serde_json::to_value(&notify) {
        Ok(v) => v,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let event = match ctx.ledger.append(
        &ctx.home.ledger_path(group.group_id.as_str()),
        EventKind::SystemNotify,
        &group.group_id,
        "",
        &by,
        payload,
    ) {
        Ok(ev) => ev,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };

    // Queue for PTY targets right away.
    if !target_actor_id.is_empty() {
        if let Some(actor) = group.find_actor(&target_actor_id) {
            if effective_runner_kind(actor.runner) == RunnerKind::Pty
                && runner_ops::actor_running(ctx, group.group_id.as_str(), actor)
            {
                ctx.delivery
                    .queue_system_notify(&group, &target_actor_id, &event, &notify);
                ctx.delivery.flush_pending(&group, &target_actor_id).await;
            }
        }
    }

    Response::ok(serde_json::json!({"event": serde_json::to_value(&event).ok()}))
}

pub(crate) fn handle_notify_ack<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    let actor_id = arg_str(args, "actor_id");
    if actor_id.is_empty() {
        return Response::error(codes::MISSING_ACTOR_ID, "missing actor_id");
    }
    let event_id = arg_str(args, "event_id");
    if event_id.is_empty() {
        return Response::error(codes::MISSING_EVENT_ID, "missing event_id");
    }
    if by != actor_id {
        return Response::error(
            codes::PERMISSION_DENIED,
            "ack must be performed by the recipient (by must equal actor_id)",
        );
    }

    let ledger_path = ctx.home.ledger_path(group.group_id.as_str());
    let Some(target) = find_event(&ledger_path, &event_id) else {
        return Response::error(codes::EVENT_NOT_FOUND, format!("event not found: {event_id}"));
    };
    let Some(notify) = target.notify() else {
        return Response::error(codes::INVALID_REQUEST, "event kind must be system.notify");
    };
    if let Some(target_actor) = &notify.target_actor_id {
        if target_actor != &actor_id {
            return Response::error(
                codes::INVALID_REQUEST,
                format!("notify is not addressed to actor: {actor_id}"),
            );
        }
    }

    // Idempotent: a second ack reports `already`.
    let already = cccc_storage::iter_events(&ledger_path).any(|ev| {
        ev.kind == EventKind::SystemNotifyAck
            && ev.data.get("event_id").and_then(|v| v.as_str()) == Some(event_id.as_str())
            && ev.data.get("actor_id").and_then(|v| v.as_str()) == Some(actor_id.as_str())
    });
    if already {
        return Response::ok(serde_json::json!({
            "acked": true,
            "already": true,
            "event": serde_json::Value::Null,
        }));
    }

    let ack_event = ctx
        .ledger
        .append(
            &ledger_path,
            EventKind::SystemNotifyAck,
            &group.group_id,
            "",
            &by,
            serde_json::json!({"actor_id": actor_id, "event_id": event_id}),
        )
        .ok();
    Response::ok(serde_json::json!({
        "acked": true,
        "already": false,
        "event": ack_event,
    }))
}
