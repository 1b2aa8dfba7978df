// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actor membership, lifecycle, and private-env ops.

use super::groups::append_group_event;
use super::{
    arg_bool, arg_by, arg_str, caller_of, load_group_for, require_admin, runner_ops, Caller,
    DaemonCtx,
};
use crate::protocol::{codes, Response};
use cccc_core::{
    utc_now_iso, ActorDef, EventKind, GroupDoc, ProfileId, Role, Runtime, RunnerKind, SubmitKey,
};
use cccc_runner::{effective_runner_kind, SessionAdapter};
use cccc_storage::{load_profiles, save_group};
use std::collections::BTreeMap;

fn append_actor_event<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group: &GroupDoc,
    op: &str,
    by: &str,
    actor_id: &str,
    data: serde_json::Value,
) {
    let mut payload = serde_json::json!({"actor_id": actor_id});
    if let (Some(obj), Some(extra)) = (payload.as_object_mut(), data.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    let _ = ctx.ledger.append(
        &ctx.home.ledger_path(group.group_id.as_str()),
        EventKind::actor(op),
        &group.group_id,
        "",
        by,
        payload,
    );
}

pub(crate) fn handle_actor_list<S: SessionAdapter>(
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
        .map(|a| {
            let mut summary = runner_ops::actor_summary(ctx, gid, a);
            if let Some(obj) = summary.as_object_mut() {
                obj.insert(
                    "role".to_string(),
                    serde_json::json!(group.effective_role(a.id.as_str())),
                );
            }
            summary
        })
        .collect();
    Response::ok(serde_json::json!({
        "group_id": gid,
        "foreman_id": group.foreman_id().map(|f| f.as_str().to_string()),
        "actors": actors,
    }))
}

pub(crate) async fn handle_actor_add<S: SessionAdapter>(
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

    let actor_id = arg_str(args, "actor_id");
    if actor_id.is_empty() {
        return Response::error(codes::MISSING_ACTOR_ID, "missing actor_id");
    }
    if actor_id == "user" || actor_id == "system" {
        return Response::error(codes::INVALID_REQUEST, format!("reserved actor id: {actor_id}"));
    }
    if group.find_actor(&actor_id).is_some() {
        return Response::error(
            codes::INVALID_REQUEST,
            format!("actor already exists: {actor_id}"),
        );
    }

    let runtime_arg = arg_str(args, "runtime");
    let runtime = if runtime_arg.is_empty() {
        Runtime::default()
    } else {
        match Runtime::parse(&runtime_arg) {
            Some(rt) => rt,
            None => {
                return Response::error_with_details(
                    codes::INVALID_REQUEST,
                    format!("unsupported runtime: {runtime_arg}"),
                    serde_json::json!({"supported": cccc_core::SUPPORTED_RUNTIMES}),
                )
            }
        }
    };
    let runner = match arg_str(args, "runner").as_str() {
        "" | "pty" => RunnerKind::Pty,
        "headless" => RunnerKind::Headless,
        other => {
            return Response::error(
                codes::INVALID_REQUEST,
                format!("runner must be pty or headless, got: {other}"),
            )
        }
    };
    let submit = match arg_str(args, "submit").as_str() {
        "" | "enter" => SubmitKey::Enter,
        "ctrl+enter" => SubmitKey::CtrlEnter,
        "paste" => SubmitKey::Paste,
        other => {
            return Response::error(
                codes::INVALID_REQUEST,
                format!("submit must be enter, ctrl+enter or paste, got: {other}"),
            )
        }
    };

    let command = super::arg_str_list(args, "command");
    if runtime == Runtime::Custom && runner == RunnerKind::Pty && command.is_empty() {
        return Response::error(
            codes::INVALID_REQUEST,
            "runtime=custom with runner=pty requires a non-empty command",
        );
    }

    let profile_id = arg_str(args, "profile_id");
    let has_private_env = args
        .get("env_private")
        .map(|v| !v.is_null())
        .unwrap_or(false);
    if !profile_id.is_empty() && has_private_env {
        return Response::error(
            codes::INVALID_REQUEST,
            "env_private is not allowed when profile_id is used",
        );
    }
    if !profile_id.is_empty() {
        let profiles = match load_profiles(&ctx.home) {
            Ok(p) => p,
            Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
        };
        if profiles.get(&profile_id).is_none() {
            return Response::error(
                codes::PROFILE_NOT_FOUND,
                format!("profile not found: {profile_id}"),
            );
        }
    }

    let now = utc_now_iso();
    let mut actor = ActorDef::new(actor_id.as_str());
    actor.title = arg_str(args, "title");
    actor.runtime = runtime;
    actor.runner = runner;
    actor.command = command;
    actor.submit = submit;
    actor.default_scope_key = arg_str(args, "default_scope_key");
    actor.enabled = args
        .get("enabled")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if arg_str(args, "role") == "foreman" {
        // At most one tagged foreman per group.
        for existing in &mut group.actors {
            if existing.role == Some(Role::Foreman) {
                existing.role = Some(Role::Peer);
            }
        }
        actor.role = Some(Role::Foreman);
    }
    actor.created_at = now.clone();
    actor.updated_at = now;
    if profile_id.is_empty() {
        if let Some(env) = args.get("env").and_then(|v| v.as_object()) {
            for (k, v) in env {
                if let Some(s) = v.as_str() {
                    actor.env.insert(k.clone(), s.to_string());
                }
            }
        }
    } else {
        // Profile owns runtime/runner/command/submit/env.
        actor.profile_id = Some(ProfileId::new(profile_id.as_str()));
        actor.env = BTreeMap::new();
    }
    group.actors.push(actor);

    // Private env supplied inline lands in the secret store, never YAML.
    if has_private_env {
        let mut set_vars = BTreeMap::new();
        if let Some(env) = args.get("env_private").and_then(|v| v.as_object()) {
            for (k, v) in env {
                let value = v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string());
                set_vars.insert(k.clone(), value);
            }
        }
        if let Err(e) = cccc_storage::update_actor_private_env(
            &ctx.home,
            group.group_id.as_str(),
            &actor_id,
            &set_vars,
            &[],
            false,
        ) {
            return Response::error(codes::INVALID_REQUEST, e.to_string());
        }
    }

    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    append_actor_event(ctx, &group, "add", &by, &actor_id, serde_json::json!({}));

    let actor = group.find_actor(&actor_id).cloned();
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "actor": actor.map(|a| runner_ops::actor_summary(ctx, group.group_id.as_str(), &a)),
        "runner_effective": effective_runner_kind(runner).as_str(),
    }))
}

pub(crate) async fn handle_actor_remove<S: SessionAdapter>(
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
    let actor_id = arg_str(args, "actor_id");
    if actor_id.is_empty() {
        return Response::error(codes::MISSING_ACTOR_ID, "missing actor_id");
    }
    if group.find_actor(&actor_id).is_none() {
        return Response::error(codes::ACTOR_NOT_FOUND, format!("actor not found: {actor_id}"));
    }
    let was_foreman = group.foreman_id().is_some_and(|f| f == actor_id.as_str());

    runner_ops::stop_actor_process(ctx, group.group_id.as_str(), &actor_id).await;
    group.actors.retain(|a| a.id != actor_id.as_str());
    cccc_storage::delete_actor_private_env(&ctx.home, group.group_id.as_str(), &actor_id);
    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    append_actor_event(ctx, &group, "remove", &by, &actor_id, serde_json::json!({}));

    // A foreman change resets automation so the new foreman is not greeted
    // by stale idle/silence timers.
    if was_foreman {
        ctx.automation.on_resume(&group);
    }
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "removed": actor_id}))
}

pub(crate) fn handle_actor_update<S: SessionAdapter>(
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
    let actor_id = arg_str(args, "actor_id");
    if actor_id.is_empty() {
        return Response::error(codes::MISSING_ACTOR_ID, "missing actor_id");
    }
    let old_foreman = group.foreman_id();

    let Some(actor) = group.find_actor_mut(&actor_id) else {
        return Response::error(codes::ACTOR_NOT_FOUND, format!("actor not found: {actor_id}"));
    };
    // id is stable; renaming is remove + re-add.
    if args.get("id").is_some() || args.get("new_actor_id").is_some() {
        return Response::error(codes::INVALID_PATCH, "actor id cannot be changed");
    }

    let mut changed = Vec::new();
    if let Some(title) = args.get("title").and_then(|v| v.as_str()) {
        actor.title = title.trim().to_string();
        changed.push("title");
    }
    if let Some(enabled) = args.get("enabled").and_then(|v| v.as_bool()) {
        actor.enabled = enabled;
        changed.push("enabled");
    }
    if args.get("runtime").is_some() {
        let runtime_arg = arg_str(args, "runtime");
        match Runtime::parse(&runtime_arg) {
            Some(rt) => {
                actor.runtime = rt;
                changed.push("runtime");
            }
            None => {
                return Response::error(
                    codes::INVALID_PATCH,
                    format!("unsupported runtime: {runtime_arg}"),
                )
            }
        }
    }
    if args.get("runner").is_some() {
        match arg_str(args, "runner").as_str() {
            "pty" => actor.runner = RunnerKind::Pty,
            "headless" => actor.runner = RunnerKind::Headless,
            other => {
                return Response::error(
                    codes::INVALID_PATCH,
                    format!("runner must be pty or headless, got: {other}"),
                )
            }
        }
        changed.push("runner");
    }
    if args.get("submit").is_some() {
        match arg_str(args, "submit").as_str() {
            "enter" => actor.submit = SubmitKey::Enter,
            "ctrl+enter" => actor.submit = SubmitKey::CtrlEnter,
            "paste" => actor.submit = SubmitKey::Paste,
            other => {
                return Response::error(
                    codes::INVALID_PATCH,
                    format!("submit must be enter, ctrl+enter or paste, got: {other}"),
                )
            }
        }
        changed.push("submit");
    }
    if let Some(command) = args.get("command") {
        if actor.profile_id.is_some() {
            return Response::error(
                codes::INVALID_PATCH,
                "command is owned by the linked profile",
            );
        }
        let Some(list) = command.as_array() else {
            return Response::error(codes::INVALID_PATCH, "command must be a list");
        };
        actor.command = list
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect();
        changed.push("command");
    }
    if let Some(scope) = args.get("default_scope_key").and_then(|v| v.as_str()) {
        actor.default_scope_key = scope.trim().to_string();
        changed.push("default_scope_key");
    }
    if let Some(env) = args.get("env") {
        if actor.profile_id.is_some() {
            return Response::error(codes::INVALID_PATCH, "env is owned by the linked profile");
        }
        let Some(obj) = env.as_object() else {
            return Response::error(codes::INVALID_PATCH, "env must be an object");
        };
        actor.env = obj
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        changed.push("env");
    }
    if args.get("role").is_some() {
        match arg_str(args, "role").as_str() {
            "foreman" => actor.role = Some(Role::Foreman),
            "peer" => actor.role = Some(Role::Peer),
            "" => actor.role = None,
            other => {
                return Response::error(codes::INVALID_PATCH, format!("unknown role: {other}"))
            }
        }
        changed.push("role");
    }
    if changed.is_empty() {
        return Response::error(codes::INVALID_PATCH, "no recognized fields to update");
    }
    actor.updated_at = utc_now_iso();
    let became_foreman = actor.role == Some(Role::Foreman);

    // At most one tagged foreman per group.
    if changed.contains(&"role") && became_foreman {
        for other in &mut group.actors {
            if other.id != actor_id.as_str() && other.role == Some(Role::Foreman) {
                other.role = Some(Role::Peer);
            }
        }
    }

    if let Err(e) = save_group(&ctx.home, &mut group) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    append_actor_event(
        ctx,
        &group,
        "update",
        &by,
        &actor_id,
        serde_json::json!({"fields": changed}),
    );

    // Role/enabled edits can move the foreman hat; reset automation so
    // neither actor gets stale timers.
    if group.foreman_id() != old_foreman {
        ctx.automation.on_resume(&group);
    }
    Response::ok(serde_json::json!({"group_id": group.group_id.as_str(), "updated": changed}))
}

/// Lifecycle permission: admin, or the actor acting on itself.
fn require_lifecycle_permission(
    group: &GroupDoc,
    by: &str,
    actor_id: &str,
    allow_self: bool,
) -> Result<(), Response> {
    if allow_self && by == actor_id {
        return Ok(());
    }
    match caller_of(group, by) {
        Some(Caller::User) | Some(Caller::Foreman) => Ok(()),
        _ => Err(Response::error(
            codes::PERMISSION_DENIED,
            format!("{by} may not control actor {actor_id}"),
        )),
    }
}

pub(crate) async fn handle_actor_start<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let mut group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    let actor_id = arg_str(args, "actor_id");
    if actor_id.is_empty() {
        return Response::error(codes::MISSING_ACTOR_ID, "missing actor_id");
    }
    // Starting requires admin; an actor may not start itself from a dead
    // session anyway.
    if let Err(resp) = require_lifecycle_permission(&group, &by, &actor_id, false) {
        return resp;
    }
    if group.find_actor(&actor_id).is_none() {
        return Response::error(codes::ACTOR_NOT_FOUND, format!("actor not found: {actor_id}"));
    }

    match runner_ops::start_actor_process(ctx, &mut group, &actor_id).await {
        Ok(outcome) => {
            if let Err(e) = save_group(&ctx.home, &mut group) {
                return Response::error(codes::INTERNAL_ERROR, e.to_string());
            }
            append_actor_event(
                ctx,
                &group,
                "start",
                &by,
                &actor_id,
                serde_json::json!({"runner_effective": outcome.runner_effective.as_str()}),
            );
            Response::ok(serde_json::json!({
                "group_id": group.group_id.as_str(),
                "actor_id": actor_id,
                "running": true,
                "runner_effective": outcome.runner_effective.as_str(),
                "session_key": outcome.session_key,
                "pid": outcome.pid,
            }))
        }
        Err(e) => Response::error(codes::INTERNAL_ERROR, format!("failed to start actor: {e}")),
    }
}

pub(crate) async fn handle_actor_stop<S: SessionAdapter>(
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
    // An actor may stop itself.
    if let Err(resp) = require_lifecycle_permission(&group, &by, &actor_id, true) {
        return resp;
    }
    if group.find_actor(&actor_id).is_none() {
        return Response::error(codes::ACTOR_NOT_FOUND, format!("actor not found: {actor_id}"));
    }
    runner_ops::stop_actor_process(ctx, group.group_id.as_str(), &actor_id).await;
    append_actor_event(ctx, &group, "stop", &by, &actor_id, serde_json::json!({}));
    Response::ok(serde_json::json!({
        "group_id": group.group_id.as_str(),
        "actor_id": actor_id,
        "running": false,
    }))
}

pub(crate) async fn handle_actor_restart<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    let mut group = match load_group_for(ctx, args) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    let actor_id = arg_str(args, "actor_id");
    if actor_id.is_empty() {
        return Response::error(codes::MISSING_ACTOR_ID, "missing actor_id");
    }
    // An actor may restart itself.
    if let Err(resp) = require_lifecycle_permission(&group, &by, &actor_id, true) {
        return resp;
    }
    if group.find_actor(&actor_id).is_none() {
        return Response::error(codes::ACTOR_NOT_FOUND, format!("actor not found: {actor_id}"));
    }

    runner_ops::stop_actor_process(ctx, group.group_id.as_str(), &actor_id).await;
    match runner_ops::start_actor_process(ctx, &mut group, &actor_id).await {
        Ok(outcome) => {
            if let Err(e) = save_group(&ctx.home, &mut group) {
                return Response::error(codes::INTERNAL_ERROR, e.to_string());
            }
            append_actor_event(
                ctx,
                &group,
                "restart",
                &by,
                &actor_id,
                serde_json::json!({"runner_effective": outcome.runner_effective.as_str()}),
            );
            Response::ok(serde_json::json!({
                "group_id": group.group_id.as_str(),
                "actor_id": actor_id,
                "running": true,
                "runner_effective": outcome.runner_effective.as_str(),
                "session_key": outcome.session_key,
            }))
        }
        Err(e) => Response::error(codes::INTERNAL_ERROR, format!("failed to restart actor: {e}")),
    }
}

pub(crate) fn handle_env_private_get<S: SessionAdapter>(
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
    if let Err(resp) = require_admin(&group, &by) {
        return resp;
    }
    match cccc_storage::load_actor_private_env(&ctx.home, group.group_id.as_str(), &actor_id) {
        // Values never leave the daemon: key names + masked previews only.
        Ok(env) => Response::ok(serde_json::json!({
            "actor_id": actor_id,
            "keys": env.keys().collect::<Vec<_>>(),
            "masked": cccc_storage::masked_env(&env),
        })),
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

pub(crate) fn handle_env_private_update<S: SessionAdapter>(
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
    if let Err(resp) = require_admin(&group, &by) {
        return resp;
    }
    let Some(actor) = group.find_actor(&actor_id) else {
        return Response::error(codes::ACTOR_NOT_FOUND, format!("actor not found: {actor_id}"));
    };
    if actor.profile_id.is_some() {
        return Response::error(
            codes::INVALID_REQUEST,
            "env_private is not allowed when profile_id is used",
        );
    }

    let mut set_vars = BTreeMap::new();
    if let Some(env) = args.get("set").and_then(|v| v.as_object()) {
        for (k, v) in env {
            let value = v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string());
            set_vars.insert(k.clone(), value);
        }
    }
    let unset: Vec<String> = super::arg_str_list(args, "unset");
    let clear = arg_bool(args, "clear");

    match cccc_storage::update_actor_private_env(
        &ctx.home,
        group.group_id.as_str(),
        &actor_id,
        &set_vars,
        &unset,
        clear,
    ) {
        Ok(env) => Response::ok(serde_json::json!({
            "actor_id": actor_id,
            "keys": env.keys().collect::<Vec<_>>(),
            "masked": cccc_storage::masked_env(&env),
        })),
        Err(e) => Response::error(codes::INVALID_REQUEST, e.to_string()),
    }
}
