// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon core + diagnostics ops.

use super::{arg_bool, arg_by, arg_str, arg_u64, load_group_for, runner_ops, DaemonCtx};
use crate::protocol::{codes, Response, DAEMON_VERSION, IPC_VERSION};
use cccc_core::{utc_now_iso, TranscriptVisibility};
use cccc_runner::SessionAdapter;
use cccc_storage::{load_settings, save_settings};

pub(crate) fn handle_ping<S: SessionAdapter>(ctx: &DaemonCtx<S>) -> Response {
    Response::ok(serde_json::json!({
        "version": DAEMON_VERSION,
        "pid": std::process::id(),
        "ts": utc_now_iso(),
        "ipc_v": IPC_VERSION,
        "uptime_seconds": ctx.start_time.elapsed().as_secs(),
        "capabilities": ["events_stream", "term_attach", "headless", "profiles"],
    }))
}

pub(crate) async fn handle_shutdown<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    // --kill tears sessions down before the ack so the client's exit
    // timer never races the kills.
    if arg_bool(args, "kill") {
        ctx.pty.stop_all().await;
        ctx.headless.stop_all(&ctx.home);
    }
    Response::ok(serde_json::json!({"stopping": true}))
}

pub(crate) fn handle_observability_get<S: SessionAdapter>(ctx: &DaemonCtx<S>) -> Response {
    match load_settings(&ctx.home) {
        Ok(settings) => Response::ok(serde_json::json!({"observability": settings.observability})),
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

pub(crate) fn handle_observability_update<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let Some(patch) = args.get("observability").and_then(|v| v.as_object()) else {
        return Response::error(codes::INVALID_PATCH, "missing observability object");
    };
    let mut settings = match load_settings(&ctx.home) {
        Ok(s) => s,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let mut merged = match serde_json::to_value(&settings.observability) {
        Ok(v) => v,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    if let Some(obj) = merged.as_object_mut() {
        for (k, v) in patch {
            obj.insert(k.clone(), v.clone());
        }
    }
    settings.observability = match serde_json::from_value(merged) {
        Ok(o) => o,
        Err(e) => return Response::error(codes::INVALID_PATCH, e.to_string()),
    };
    if let Err(e) = save_settings(&ctx.home, &settings) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    Response::ok(serde_json::json!({"observability": settings.observability}))
}

pub(crate) fn handle_remote_access_get<S: SessionAdapter>(ctx: &DaemonCtx<S>) -> Response {
    match load_settings(&ctx.home) {
        Ok(settings) => Response::ok(serde_json::json!({"remote_access": settings.remote_access})),
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

pub(crate) fn handle_remote_access_update<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let Some(patch) = args.get("remote_access").and_then(|v| v.as_object()) else {
        return Response::error(codes::INVALID_PATCH, "missing remote_access object");
    };
    let mut settings = match load_settings(&ctx.home) {
        Ok(s) => s,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    for (k, v) in patch {
        if v.is_null() {
            settings.remote_access.remove(k);
        } else {
            settings.remote_access.insert(k.clone(), v.clone());
        }
    }
    if let Err(e) = save_settings(&ctx.home, &settings) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    Response::ok(serde_json::json!({"remote_access": settings.remote_access}))
}

/// Transcript read permission: the user always, the actor itself always,
/// others per `terminal_transcript.visibility`.
fn can_read_transcript(group: &cccc_core::GroupDoc, by: &str, target_actor_id: &str) -> bool {
    if target_actor_id.is_empty() {
        return false;
    }
    if by.is_empty() || by == "user" || by == target_actor_id {
        return true;
    }
    if group.find_actor(by).is_none() {
        return false;
    }
    match group.terminal_transcript.visibility {
        TranscriptVisibility::All => true,
        TranscriptVisibility::Foreman => group.effective_role(by) == Some("foreman"),
        TranscriptVisibility::Off => false,
    }
}

pub(crate) fn handle_terminal_tail<S: SessionAdapter>(
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
    if !can_read_transcript(&group, &by, &actor_id) {
        return Response::error(
            codes::PERMISSION_DENIED,
            format!("{by} may not read {actor_id}'s terminal"),
        );
    }
    let max_bytes = arg_u64(args, "max_bytes", 65536).min(1_000_000) as usize;
    let bytes = ctx
        .pty
        .tail_output(group.group_id.as_str(), &actor_id, max_bytes);
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "actor_id": actor_id,
        "running": ctx.pty.actor_running(group.group_id.as_str(), &actor_id),
        "text": String::from_utf8_lossy(&bytes),
    }))
}

pub(crate) fn handle_terminal_clear<S: SessionAdapter>(
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
    if !can_read_transcript(&group, &by, &actor_id) {
        return Response::error(
            codes::PERMISSION_DENIED,
            format!("{by} may not clear {actor_id}'s terminal"),
        );
    }
    ctx.pty.clear_backlog(group.group_id.as_str(), &actor_id);
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "actor_id": actor_id, "cleared": true}))
}

fn developer_mode_enabled<S: SessionAdapter>(ctx: &DaemonCtx<S>) -> bool {
    load_settings(&ctx.home)
        .map(|s| s.observability.developer_mode)
        .unwrap_or(false)
}

pub(crate) fn handle_debug_snapshot<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    if !developer_mode_enabled(ctx) {
        return Response::error(codes::PERMISSION_DENIED, "developer mode is disabled");
    }
    let gid = arg_str(args, "group_id");
    let mut groups = Vec::new();
    for group_id in cccc_storage::list_group_ids(&ctx.home) {
        if !gid.is_empty() && group_id != gid {
            continue;
        }
        let Ok(Some(group)) = cccc_storage::load_group(&ctx.home, &group_id) else {
            continue;
        };
        let actors: Vec<serde_json::Value> = group
            .actors
            .iter()
            .map(|a| runner_ops::actor_summary(ctx, &group_id, a))
            .collect();
        groups.push(serde_json::json!({
            "group_id": group_id,
            "state": group.state.as_str(),
            "running": group.running,
            "actors": actors,
            "subscribers": ctx.broadcaster.subscriber_count(&group_id),
        }));
    }
    Response::ok(serde_json::json!({
        "version": DAEMON_VERSION,
        "uptime_seconds": ctx.start_time.elapsed().as_secs(),
        "groups": groups,
        "delivery": ctx.delivery.debug_summary(),
    }))
}

pub(crate) fn handle_debug_tail_logs<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    if !developer_mode_enabled(ctx) {
        return Response::error(codes::PERMISSION_DENIED, "developer mode is disabled");
    }
    let max_bytes = arg_u64(args, "max_bytes", 65536).min(1_000_000) as usize;
    let path = ctx.home.log_path();
    let text = match std::fs::read(&path) {
        Ok(bytes) => {
            let skip = bytes.len().saturating_sub(max_bytes);
            String::from_utf8_lossy(&bytes[skip..]).into_owned()
        }
        Err(_) => String::new(),
    };
    Response::ok(serde_json::json!({"path": path.display().to_string(), "text": text}))
}

pub(crate) fn handle_debug_clear_logs<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    _args: &serde_json::Value,
) -> Response {
    if !developer_mode_enabled(ctx) {
        return Response::error(codes::PERMISSION_DENIED, "developer mode is disabled");
    }
    let path = ctx.home.log_path();
    if let Err(e) = std::fs::write(&path, b"") {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    Response::ok(serde_json::json!({"cleared": true}))
}
