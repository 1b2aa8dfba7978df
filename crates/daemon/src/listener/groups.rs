// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry and group lifecycle ops.

use super::{
    arg_bool, arg_by, arg_str, load_group_for, require_admin, runner_ops, DaemonCtx,
};
use crate::protocol::{codes, Response};
use cccc_core::{utc_now_iso, EventKind, GroupDoc, GroupId, GroupState, ScopeDef};
use cccc_runner::SessionAdapter;
use cccc_storage::{
    delete_group, list_group_ids, load_active, load_group, load_registry, reconcile_registry,
    save_group, set_active_group_id,
};
use std::path::Path;

/// Append a `group.<op>` lifecycle event. Best-effort: ops never fail on
/// journal trouble alone, they log through the ledger service instead.
pub(crate) fn append_group_event<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group: &GroupDoc,
    op: &str,
    by: &str,
    data: serde_json::Value,
) -> Option<cccc_core::LedgerEvent> {
    ctx.ledger
        .append(
            &ctx.home.ledger_path(group.group_id.as_str()),
            EventKind::group(op),
            &group.group_id,
            "",
            by,
            data,
        )
        .ok()
}

pub(crate) fn handle_groups<S: SessionAdapter>(ctx: &DaemonCtx<S>) -> Response {
    let active = load_active(&ctx.home).map(|a| a.active_group_id).unwrap_or_default();
    let mut entries = Vec::new();
    for gid in list_group_ids(&ctx.home) {
        let Ok(Some(group)) = load_group(&ctx.home, &gid) else {
            continue;
        };
        entries.push(serde_json::json!({
            "group_id": gid,
            "title": group.title,
            "topic": group.topic,
            "running": group.running,
            "state": group.state.as_str(),
            "actors": group.actors.len(),
            "scopes": group.scopes.len(),
            "updated_at": group.updated_at,
            "active": gid == active,
        }));
    }
    Response::ok(serde_json::json!({"groups": entries, "active_group_id": active}))
}

pub(crate) fn handle_registry_reconcile<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let remove_missing = arg_bool(args, "remove_missing");
    match reconcile_registry(&ctx.home, remove_missing) {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(v) => Response::ok(v),
            Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
        },
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

/// Derive a stable scope key for a workspace path. When the workspace has
/// a git remote the key survives directory moves.
pub(crate) fn detect_scope(path: &Path) -> (String, String, String) {
    let url = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();
    let git_remote = read_git_remote(path).unwrap_or_default();
    let scope_key = if git_remote.is_empty() {
        format!("fs:{url}")
    } else {
        format!("git:{git_remote}")
    };
    (scope_key, url, git_remote)
}

fn read_git_remote(path: &Path) -> Option<String> {
    let config = std::fs::read_to_string(path.join(".git").join("config")).ok()?;
    let mut in_remote = false;
    for line in config.lines() {
        let line = line.trim();
        if line.starts_with("[remote ") {
            in_remote = true;
            continue;
        }
        if line.starts_with('[') {
            in_remote = false;
            continue;
        }
        if in_remote {
            if let Some(url) = line.strip_prefix("url") {
                let url = url.trim_start_matches(['=', ' ', '\t']).trim();
                if !url.is_empty() {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

pub(crate) fn handle_attach<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let path_arg = arg_str(args, "path");
    if path_arg.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing path");
    }
    let path = Path::new(&path_arg);
    if !path.is_dir() {
        return Response::error(
            codes::INVALID_PROJECT_ROOT,
            format!("not a directory: {path_arg}"),
        );
    }
    let (scope_key, url, git_remote) = detect_scope(path);
    let label = arg_str(args, "label");

    let mut reg = match load_registry(&ctx.home) {
        Ok(r) => r,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };

    // Explicit group wins; otherwise the registry default for this scope.
    let gid = {
        let explicit = arg_str(args, "group_id");
        if !explicit.is_empty() {
            explicit
        } else {
            reg.default_group_for_scope(&scope_key).unwrap_or("").to_string()
        }
    };
    if gid.is_empty() {
        // Nothing to attach to yet; report the detected scope so the
        // client can create a group and attach again.
        return Response::ok(serde_json::json!({
            "scope_key": scope_key,
            "url": url,
            "git_remote": git_remote,
            "group_id": serde_json::Value::Null,
        }));
    }

    let mut group = match load_group(&ctx.home, &gid) {
        Ok(Some(g)) => g,
        Ok(None) => {
            return Response::error(codes::GROUP_NOT_FOUND, format!("group not found: {gid}"))
        }
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };

    if group.find_scope(&scope_key).is_none() {
        group.scopes.push(ScopeDef {
            scope_key: scope_key.clone(),
            url: url.clone(),
            label,
            git_remote: git_remote.clone(),
            extra: Default::default(),
        });
    }
    group.active_scope_key = scope_key.clone();
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    reg.defaults.insert(scope_key.clone(), gid.clone());
    if let Err(e) = reg.save(&ctx.home) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    let _ = set_active_group_id(&ctx.home, &gid);
    let _ = append_group_event(
        ctx,
        &group,
        "attach_scope",
        &by,
        serde_json::json!({"scope_key": scope_key, "url": url}),
    );

    Response::ok(serde_json::json!({
        "scope_key": scope_key,
        "url": url,
        "git_remote": git_remote,
        "group_id": gid,
    }))
}

pub(crate) fn handle_group_create<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let title = arg_str(args, "title");
    if title.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing title");
    }
    let gid = GroupId::generate();
    let mut group = GroupDoc::new(gid.clone(), title.clone(), &utc_now_iso());
    group.topic = arg_str(args, "topic");
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    match load_registry(&ctx.home) {
        Ok(mut reg) => {
            reg.register_group(gid.as_str(), &title);
            if let Err(e) = reg.save(&ctx.home) {
                return Response::error(codes::INTERNAL_ERROR, e.to_string());
            }
        }
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
    let _ = set_active_group_id(&ctx.home, gid.as_str());
    let _ = append_group_event(ctx, &group, "create", &by, serde_json::json!({"title": title}));
    Response::ok(serde_json::json!({"group_id": gid.as_str(), "title": title}))
}

pub(crate) fn handle_group_create_from_template<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let template_id = arg_str(args, "template_group_id");
    if template_id.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing template_group_id");
    }
    let template = match load_group(&ctx.home, &template_id) {
        Ok(Some(g)) => g,
        Ok(None) => {
            return Response::error(
                codes::GROUP_NOT_FOUND,
                format!("group not found: {template_id}"),
            )
        }
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let title = {
        let t = arg_str(args, "title");
        if t.is_empty() {
            format!("{} (copy)", template.title)
        } else {
            t
        }
    };

    let gid = GroupId::generate();
    let now = utc_now_iso();
    let mut group = GroupDoc::new(gid.clone(), title.clone(), &now);
    group.topic = template.topic.clone();
    group.messaging = template.messaging.clone();
    group.delivery = template.delivery.clone();
    group.terminal_transcript = template.terminal_transcript.clone();
    group.automation = template.automation.clone();
    // Fresh groups never inherit runtime state: rules re-arm, nothing runs.
    group.automation.version = 0;
    group.actors = template
        .actors
        .iter()
        .map(|a| {
            let mut a = a.clone();
            a.created_at = now.clone();
            a.updated_at = now.clone();
            a
        })
        .collect();

    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    match load_registry(&ctx.home) {
        Ok(mut reg) => {
            reg.register_group(gid.as_str(), &title);
            let _ = reg.save(&ctx.home);
        }
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
    let _ = append_group_event(
        ctx,
        &group,
        "create",
        &by,
        serde_json::json!({"title": title, "template_group_id": template_id}),
    );
    Response::ok(serde_json::json!({"group_id": gid.as_str(), "title": title}))
}

pub(crate) fn handle_group_show<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    let gid = group.group_id.as_str();
    let actors: Vec<serde_json::Value> = group
        .actors
        .iter()
        .map(|a| runner_ops::actor_summary(ctx, gid, a))
        .collect();
    match serde_json::to_value(&group) {
        Ok(mut doc) => {
            if let Some(obj) = doc.as_object_mut() {
                obj.insert("actors_runtime".to_string(), serde_json::Value::Array(actors));
            }
            Response::ok(serde_json::json!({"group": doc}))
        }
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

pub(crate) fn handle_group_update<S: SessionAdapter>(
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
    let mut changed = Vec::new();
    if let Some(title) = args.get("title").and_then(|v| v.as_str()) {
        group.title = title.trim().to_string();
        changed.push("title");
    }
    if let Some(topic) = args.get("topic").and_then(|v| v.as_str()) {
        group.topic = topic.trim().to_string();
        changed.push("topic");
    }
    if changed.is_empty() {
        return Response::error(codes::INVALID_PATCH, "no recognized fields to update");
    }
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    if changed.contains(&"title") {
        if let Ok(mut reg) = load_registry(&ctx.home) {
            if let Some(entry) = reg.groups.get_mut(group.group_id.as_str()) {
                entry.title = group.title.clone();
            }
            let _ = reg.save(&ctx.home);
        }
    }
    let _ = append_group_event(
        ctx,
        &group,
        "update",
        &by,
        serde_json::json!({"fields": changed}),
    );
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str()}))
}

pub(crate) async fn handle_group_delete<S: SessionAdapter>(
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
    let gid = group.group_id.as_str().to_string();

    runner_ops::stop_group_runners(ctx, &group).await;
    if let Err(e) = delete_group(&ctx.home, &gid) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    cccc_storage::delete_group_private_env(&ctx.home, &gid);
    if let Ok(mut reg) = load_registry(&ctx.home) {
        reg.remove_group(&gid);
        let _ = reg.save(&ctx.home);
    }
    if let Ok(active) = load_active(&ctx.home) {
        if active.active_group_id == gid {
            let _ = set_active_group_id(&ctx.home, "");
        }
    }
    Response::ok(serde_json::json!({"group_id": gid, "deleted": true}))
}

pub(crate) fn handle_group_detach_scope<S: SessionAdapter>(
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
    let scope_key = arg_str(args, "scope_key");
    if scope_key.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing scope_key");
    }
    let before = group.scopes.len();
    group.scopes.retain(|s| s.scope_key != scope_key);
    if group.scopes.len() == before {
        return Response::error(
            codes::SCOPE_NOT_ATTACHED,
            format!("scope not attached: {scope_key}"),
        );
    }
    if group.active_scope_key == scope_key {
        group.active_scope_key.clear();
    }
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    if let Ok(mut reg) = load_registry(&ctx.home) {
        if reg.defaults.get(&scope_key).map(|g| g.as_str()) == Some(group.group_id.as_str()) {
            reg.defaults.remove(&scope_key);
            let _ = reg.save(&ctx.home);
        }
    }
    let _ = append_group_event(
        ctx,
        &group,
        "detach_scope",
        &by,
        serde_json::json!({"scope_key": scope_key}),
    );
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "scope_key": scope_key}))
}

pub(crate) fn handle_group_use<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    match set_active_group_id(&ctx.home, group.group_id.as_str()) {
        Ok(doc) => Response::ok(serde_json::json!({"active_group_id": doc.active_group_id})),
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

pub(crate) async fn handle_group_start<S: SessionAdapter>(
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

    let mut started = Vec::new();
    let mut failed = Vec::new();
    let actor_ids: Vec<String> = group
        .enabled_actors()
        .map(|a| a.id.as_str().to_string())
        .collect();
    for actor_id in actor_ids {
        match runner_ops::start_actor_process(ctx, &mut group, &actor_id).await {
            Ok(outcome) => started.push(serde_json::json!({
                "actor_id": actor_id,
                "runner_effective": outcome.runner_effective.as_str(),
            })),
            Err(e) => failed.push(serde_json::json!({"actor_id": actor_id, "error": e})),
        }
    }

    group.running = true;
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    let _ = append_group_event(
        ctx,
        &group,
        "start",
        &by,
        serde_json::json!({"started": started.len(), "failed": failed.len()}),
    );
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "running": true,
        "started": started,
        "failed": failed,
    }))
}

pub(crate) async fn handle_group_stop<S: SessionAdapter>(
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

    runner_ops::stop_group_runners(ctx, &group).await;
    group.running = false;
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    let _ = append_group_event(ctx, &group, "stop", &by, serde_json::json!({}));
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "running": false}))
}

pub(crate) fn handle_group_set_state<S: SessionAdapter>(
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
    let state_arg = arg_str(args, "state");
    if state_arg.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing state");
    }
    let Some(new_state) = GroupState::parse(&state_arg) else {
        return Response::error(
            codes::INVALID_REQUEST,
            format!("state must be active|idle|paused, got: {state_arg}"),
        );
    };

    let old_state = group.state;
    group.state = new_state;
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }

    // Resume: reset timers to now, never catch up, and drop pending
    // automation notifies queued while dormant.
    if old_state != GroupState::Active && new_state == GroupState::Active {
        ctx.automation.on_resume(&group);
        ctx.delivery.clear_pending_system_notifies(
            group.group_id.as_str(),
            &automation_notify_kinds(),
        );
    }

    let event = append_group_event(
        ctx,
        &group,
        "set_state",
        &by,
        serde_json::json!({"old_state": old_state.as_str(), "new_state": new_state.as_str()}),
    );
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "state": new_state.as_str(),
        "event": event.and_then(|e| serde_json::to_value(e).ok()),
    }))
}

pub(crate) fn automation_notify_kinds() -> std::collections::HashSet<cccc_core::NotifyKind> {
    use cccc_core::NotifyKind::*;
    [Nudge, Keepalive, HelpNudge, ActorIdle, SilenceCheck, Automation]
        .into_iter()
        .collect()
}

pub(crate) fn handle_group_settings_update<S: SessionAdapter>(
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

    let mut changed = Vec::new();
    if let Some(patch) = args.get("messaging") {
        match merge_section(&group.messaging, patch) {
            Ok(section) => {
                group.messaging = section;
                changed.push("messaging");
            }
            Err(e) => return Response::error(codes::INVALID_PATCH, format!("messaging: {e}")),
        }
    }
    if let Some(patch) = args.get("delivery") {
        match merge_section(&group.delivery, patch) {
            Ok(section) => {
                group.delivery = section;
                changed.push("delivery");
            }
            Err(e) => return Response::error(codes::INVALID_PATCH, format!("delivery: {e}")),
        }
    }
    if let Some(patch) = args.get("terminal_transcript") {
        match merge_section(&group.terminal_transcript, patch) {
            Ok(section) => {
                group.terminal_transcript = section;
                changed.push("terminal_transcript");
            }
            Err(e) => {
                return Response::error(codes::INVALID_PATCH, format!("terminal_transcript: {e}"))
            }
        }
    }
    if changed.is_empty() {
        return Response::error(codes::INVALID_PATCH, "no recognized settings sections");
    }
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    let _ = append_group_event(
        ctx,
        &group,
        "update",
        &by,
        serde_json::json!({"settings": changed}),
    );
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "updated": changed}))
}

/// Merge a JSON patch onto a settings section and re-validate it.
fn merge_section<T>(current: &T, patch: &serde_json::Value) -> Result<T, String>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let patch_obj = patch
        .as_object()
        .ok_or_else(|| "patch must be an object".to_string())?;
    let mut merged = serde_json::to_value(current).map_err(|e| e.to_string())?;
    let obj = merged
        .as_object_mut()
        .ok_or_else(|| "section is not an object".to_string())?;
    for (k, v) in patch_obj {
        obj.insert(k.clone(), v.clone());
    }
    serde_json::from_value(merged).map_err(|e| e.to_string())
}
