// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbox read/ack ops: listing, cursor movement, attention acks.

use super::{arg_by, arg_str, arg_u64, load_group_for, require_inbox_permission, DaemonCtx};
use crate::protocol::{codes, Response};
use cccc_core::{is_message_for_actor, parse_utc_iso, EventKind};
use cccc_engine::{has_chat_ack, latest_unread_event, unread_messages, KindFilter};
use cccc_runner::SessionAdapter;
use cccc_storage::{find_event, get_cursor, set_cursor};

pub(crate) fn handle_inbox_list<S: SessionAdapter>(
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
    if let Err(resp) = require_inbox_permission(&group, &by, &actor_id) {
        return resp;
    }
    let limit = arg_u64(args, "limit", 50) as usize;
    let filter = KindFilter::parse(&arg_str(args, "kind_filter"));

    let messages = unread_messages(&ctx.home, &group, &actor_id, limit, filter);
    let cursor = get_cursor(&ctx.home, group.group_id.as_str(), &actor_id).unwrap_or_default();
    Response::ok(serde_json::json!({
        "messages": messages,
        "cursor": {"event_id": cursor.event_id, "ts": cursor.ts},
    }))
}

pub(crate) fn handle_inbox_mark_read<S: SessionAdapter>(
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
    if let Err(resp) = require_inbox_permission(&group, &by, &actor_id) {
        return resp;
    }

    let gid = group.group_id.as_str();
    let ledger_path = ctx.home.ledger_path(gid);
    let Some(event) = find_event(&ledger_path, &event_id) else {
        return Response::error(codes::EVENT_NOT_FOUND, format!("event not found: {event_id}"));
    };
    if !(event.kind.is_chat_message() || event.kind.is_notify()) {
        return Response::error(
            codes::INVALID_REQUEST,
            "event kind must be chat.message or system.notify",
        );
    }
    if !is_message_for_actor(&group, &actor_id, &event) {
        return Response::error(
            codes::INVALID_REQUEST,
            format!("event is not addressed to actor: {actor_id}"),
        );
    }

    let cursor = match set_cursor(&ctx.home, gid, &actor_id, event.id.as_str(), &event.ts) {
        Ok(c) => c,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let read_event = ctx
        .ledger
        .append(
            &ledger_path,
            EventKind::ChatRead,
            &group.group_id,
            "",
            &by,
            serde_json::json!({"actor_id": actor_id, "event_id": event_id}),
        )
        .ok();

    // Marking your own attention chat read implies the ack.
    let mut ack_event = None;
    if by == actor_id && event.kind.is_chat_message() {
        let attention = event
            .chat_message()
            .map(|d| d.priority.is_attention())
            .unwrap_or(false);
        if attention
            && !event.by.is_empty()
            && event.by != actor_id
            && !has_chat_ack(&ctx.home, &group, &event_id, &actor_id)
        {
            ack_event = ctx
                .ledger
                .append(
                    &ledger_path,
                    EventKind::ChatAck,
                    &group.group_id,
                    "",
                    &by,
                    serde_json::json!({"actor_id": actor_id, "event_id": event_id}),
                )
                .ok();
        }
    }

    Response::ok(serde_json::json!({
        "cursor": {"event_id": cursor.event_id, "ts": cursor.ts},
        "event": read_event,
        "ack_event": ack_event,
    }))
}

pub(crate) fn handle_inbox_mark_all_read<S: SessionAdapter>(
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
    if let Err(resp) = require_inbox_permission(&group, &by, &actor_id) {
        return resp;
    }
    let filter = KindFilter::parse(&arg_str(args, "kind_filter"));
    let gid = group.group_id.as_str();

    let Some(last) = latest_unread_event(&ctx.home, &group, &actor_id, filter) else {
        let cursor = get_cursor(&ctx.home, gid, &actor_id).unwrap_or_default();
        return Response::ok(serde_json::json!({
            "cursor": {"event_id": cursor.event_id, "ts": cursor.ts},
            "event": serde_json::Value::Null,
        }));
    };

    let cursor = match set_cursor(&ctx.home, gid, &actor_id, last.id.as_str(), &last.ts) {
        Ok(c) => c,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let read_event = ctx
        .ledger
        .append(
            &ctx.home.ledger_path(gid),
            EventKind::ChatRead,
            &group.group_id,
            "",
            &by,
            serde_json::json!({"actor_id": actor_id, "event_id": last.id.as_str()}),
        )
        .ok();
    Response::ok(serde_json::json!({
        "cursor": {"event_id": cursor.event_id, "ts": cursor.ts},
        "event": read_event,
    }))
}

pub(crate) fn handle_chat_ack<S: SessionAdapter>(
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
    // Acks are personal: only the recipient may perform them.
    if by != actor_id {
        return Response::error(
            codes::PERMISSION_DENIED,
            "ack must be performed by the recipient (by must equal actor_id)",
        );
    }
    if actor_id != "user" && group.find_actor(&actor_id).is_none() {
        return Response::error(codes::ACTOR_NOT_FOUND, format!("unknown actor: {actor_id}"));
    }

    let gid = group.group_id.as_str();
    let ledger_path = ctx.home.ledger_path(gid);
    let Some(target) = find_event(&ledger_path, &event_id) else {
        return Response::error(codes::EVENT_NOT_FOUND, format!("event not found: {event_id}"));
    };
    if !target.kind.is_chat_message() {
        return Response::error(codes::INVALID_REQUEST, "event kind must be chat.message");
    }
    if target.by == actor_id {
        return Response::error(
            codes::INVALID_REQUEST,
            "cannot acknowledge your own message",
        );
    }
    let Some(data) = target.chat_message() else {
        return Response::error(codes::INVALID_REQUEST, "invalid message data");
    };
    if !data.priority.is_attention() {
        return Response::error(
            codes::INVALID_REQUEST,
            "message priority is not attention",
        );
    }

    if actor_id == "user" {
        let addressed = data.to.iter().any(|t| t == "user" || t == "@user");
        if !addressed {
            return Response::error(
                codes::INVALID_REQUEST,
                "message is not addressed to user",
            );
        }
    } else {
        // An actor created after the message never owned the obligation.
        if let (Some(actor), Some(msg_dt)) =
            (group.find_actor(&actor_id), parse_utc_iso(&target.ts))
        {
            if let Some(created_dt) = parse_utc_iso(&actor.created_at) {
                if created_dt > msg_dt {
                    return Response::error(
                        codes::INVALID_REQUEST,
                        format!("actor did not exist at message time: {actor_id}"),
                    );
                }
            }
        }
        if !is_message_for_actor(&group, &actor_id, &target) {
            return Response::error(
                codes::INVALID_REQUEST,
                format!("event is not addressed to actor: {actor_id}"),
            );
        }
    }

    if has_chat_ack(&ctx.home, &group, &event_id, &actor_id) {
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
            EventKind::ChatAck,
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
