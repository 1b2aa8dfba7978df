// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maintenance, IM settings, group context, and headless-loop ops.

use super::{arg_bool, arg_by, arg_str, arg_u64, load_group_for, require_admin, DaemonCtx};
use crate::protocol::{codes, Response};
use cccc_engine::{unread_messages, KindFilter};
use cccc_runner::SessionAdapter;
use cccc_storage::{compact_ledger, save_group, snapshot_ledger, CompactOptions};

pub(crate) async fn handle_term_resize<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    let actor_id = arg_str(args, "actor_id");
    if actor_id.is_empty() {
        return Response::error(codes::MISSING_ACTOR_ID, "missing actor_id");
    }
    let cols = arg_u64(args, "cols", 0) as u16;
    let rows = arg_u64(args, "rows", 0) as u16;
    if cols == 0 || rows == 0 {
        return Response::error(codes::INVALID_REQUEST, "cols and rows must be positive");
    }
    if let Err(e) = ctx
        .pty
        .resize(group.group_id.as_str(), &actor_id, cols, rows)
        .await
    {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "actor_id": actor_id,
        "cols": cols,
        "rows": rows,
    }))
}

pub(crate) fn handle_ledger_snapshot<S: SessionAdapter>(
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
    let reason = {
        let r = arg_str(args, "reason");
        if r.is_empty() {
            "manual".to_string()
        } else {
            r
        }
    };
    let snapshot = snapshot_ledger(&ctx.home, &group, &reason);
    Response::ok(serde_json::json!({"snapshot": snapshot}))
}

pub(crate) fn handle_ledger_compact<S: SessionAdapter>(
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
    let opts = CompactOptions {
        force: arg_bool(args, "force"),
        ..CompactOptions::default()
    };
    match compact_ledger(&ctx.home, &group, opts) {
        Ok(result) => match serde_json::to_value(&result) {
            Ok(v) => Response::ok(v),
            Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
        },
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

// -- IM bridge settings (bridges themselves are external processes) -----

pub(crate) fn handle_im_get<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "im": group.im}))
}

pub(crate) fn handle_im_update<S: SessionAdapter>(
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
    let Some(im) = args.get("im") else {
        return Response::error(codes::INVALID_PATCH, "missing im object");
    };
    group.im = im.clone();
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    let _ = super::groups::append_group_event(ctx, &group, "update", &by, serde_json::json!({"fields": ["im"]}));
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "im": group.im}))
}

// -- Group context (free-form shared markdown) --------------------------

fn context_path<S: SessionAdapter>(ctx: &DaemonCtx<S>, group_id: &str) -> std::path::PathBuf {
    ctx.home.group_dir(group_id).join("context.md")
}

pub(crate) fn handle_context_show<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    let text = std::fs::read_to_string(context_path(ctx, group.group_id.as_str()))
        .unwrap_or_default();
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "text": text}))
}

pub(crate) fn handle_context_update<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    // Any roster member (or the user) may edit the shared context.
    if super::caller_of(&group, &by).is_none() {
        return Response::error(codes::PERMISSION_DENIED, format!("unknown caller: {by}"));
    }
    let Some(text) = args.get("text").and_then(|v| v.as_str()) else {
        return Response::error(codes::INVALID_PATCH, "missing text");
    };
    if let Err(e) =
        cccc_storage::atomic::atomic_write_bytes(&context_path(ctx, group.group_id.as_str()), text.as_bytes())
    {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    let _ = super::groups::append_group_event(
        ctx,
        &group,
        "update",
        &by,
        serde_json::json!({"fields": ["context"]}),
    );
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "bytes": text.len()}))
}

// -- Headless loop support ----------------------------------------------

/// The headless worker's poll: unread messages plus its tracked state.
pub(crate) fn handle_headless_poll<S: SessionAdapter>(
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
    if by != actor_id && by != "user" {
        return Response::error(
            codes::PERMISSION_DENIED,
            "headless poll must come from the actor itself",
        );
    }
    let gid = group.group_id.as_str();
    let limit = arg_u64(args, "limit", 20) as usize;
    let messages = unread_messages(&ctx.home, &group, &actor_id, limit, KindFilter::All);
    let handle = ctx.headless.get(gid, &actor_id);
    Response::ok(serde_json::json!({
        "group_id": gid,
        "actor_id": actor_id,
        "running": handle.is_some(),
        "state": handle.map(|h| serde_json::json!({
            "started_at": h.started_at,
            "status": h.status,
            "last_message_id_acked": h.last_message_id_acked,
        })),
        "messages": messages,
    }))
}

/// Record the newest message id the headless client processed.
pub(crate) fn handle_headless_ack<S: SessionAdapter>(
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
            "headless ack must come from the actor itself",
        );
    }
    let gid = group.group_id.as_str();
    if !ctx.headless.actor_running(gid, &actor_id) {
        return Response::error(
            codes::INVALID_REQUEST,
            format!("headless actor not running: {actor_id}"),
        );
    }
    ctx.headless.record_ack(&ctx.home, gid, &actor_id, &event_id);
    Response::ok(serde_json::json!({"group_id": gid, "actor_id": actor_id, "event_id": event_id}))
}
