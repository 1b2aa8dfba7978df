// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actor profile CRUD and profile secret ops.
//!
//! Profiles are global (no group), so these ops only gate on identity:
//! agents may not touch profiles at all.

use super::{arg_bool, arg_by, arg_str, DaemonCtx};
use crate::protocol::{codes, Response};
use cccc_core::{ActorProfile, ProfileId, Runtime, RunnerKind, SubmitKey, utc_now_iso};
use cccc_runner::SessionAdapter;
use cccc_storage::{load_profiles, save_profiles};
use std::collections::BTreeMap;

fn require_user(by: &str) -> Result<(), Response> {
    if by == "user" {
        Ok(())
    } else {
        Err(Response::error(
            codes::PERMISSION_DENIED,
            "actor profiles are managed by the user only",
        ))
    }
}

pub(crate) fn handle_profile_list<S: SessionAdapter>(ctx: &DaemonCtx<S>) -> Response {
    let doc = match load_profiles(&ctx.home) {
        Ok(d) => d,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    let profiles: Vec<&ActorProfile> = doc.profiles.values().collect();
    Response::ok(serde_json::json!({"profiles": profiles}))
}

pub(crate) fn handle_profile_upsert<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    if let Err(resp) = require_user(&by) {
        return resp;
    }
    let name = arg_str(args, "name");
    let profile_id = {
        let explicit = arg_str(args, "profile_id");
        if explicit.is_empty() {
            ProfileId::generate()
        } else {
            ProfileId::new(explicit)
        }
    };
    let mut doc = match load_profiles(&ctx.home) {
        Ok(d) => d,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };

    let mut profile = doc
        .get(profile_id.as_str())
        .cloned()
        .unwrap_or_else(|| ActorProfile::new(profile_id.clone(), name.clone(), &utc_now_iso()));
    if !name.is_empty() {
        profile.name = name;
    }
    if args.get("runtime").is_some() {
        let runtime_arg = arg_str(args, "runtime");
        match Runtime::parse(&runtime_arg) {
            Some(rt) => profile.runtime = rt,
            None => {
                return Response::error(
                    codes::INVALID_REQUEST,
                    format!("unsupported runtime: {runtime_arg}"),
                )
            }
        }
    }
    if args.get("runner").is_some() {
        match arg_str(args, "runner").as_str() {
            "pty" => profile.runner = RunnerKind::Pty,
            "headless" => profile.runner = RunnerKind::Headless,
            other => {
                return Response::error(
                    codes::INVALID_REQUEST,
                    format!("runner must be pty or headless, got: {other}"),
                )
            }
        }
    }
    if args.get("submit").is_some() {
        match arg_str(args, "submit").as_str() {
            "enter" => profile.submit = SubmitKey::Enter,
            "ctrl+enter" => profile.submit = SubmitKey::CtrlEnter,
            "paste" => profile.submit = SubmitKey::Paste,
            other => {
                return Response::error(
                    codes::INVALID_REQUEST,
                    format!("submit must be enter, ctrl+enter or paste, got: {other}"),
                )
            }
        }
    }
    if let Some(command) = args.get("command").and_then(|v| v.as_array()) {
        profile.command = command
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect();
    }

    let revision = doc.upsert(profile);
    if let Err(e) = save_profiles(&ctx.home, &mut doc) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    Response::ok(serde_json::json!({
        "profile_id": profile_id.as_str(),
        "revision": revision,
    }))
}

pub(crate) fn handle_profile_delete<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    if let Err(resp) = require_user(&by) {
        return resp;
    }
    let profile_id = arg_str(args, "profile_id");
    if profile_id.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing profile_id");
    }
    let mut doc = match load_profiles(&ctx.home) {
        Ok(d) => d,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    if doc.remove(&profile_id).is_none() {
        return Response::error(
            codes::PROFILE_NOT_FOUND,
            format!("profile not found: {profile_id}"),
        );
    }
    if let Err(e) = save_profiles(&ctx.home, &mut doc) {
        return Response::error(codes::INTERNAL_ERROR, e.to_string());
    }
    cccc_storage::delete_profile_secrets(&ctx.home, &profile_id);
    Response::ok(serde_json::json!({"profile_id": profile_id, "deleted": true}))
}

pub(crate) fn handle_profile_secrets_get<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    if let Err(resp) = require_user(&by) {
        return resp;
    }
    let profile_id = arg_str(args, "profile_id");
    if profile_id.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing profile_id");
    }
    match cccc_storage::load_profile_secrets(&ctx.home, &profile_id) {
        Ok(env) => Response::ok(serde_json::json!({
            "profile_id": profile_id,
            "keys": env.keys().collect::<Vec<_>>(),
            "masked": cccc_storage::masked_env(&env),
        })),
        Err(e) => Response::error(codes::INTERNAL_ERROR, e.to_string()),
    }
}

pub(crate) fn handle_profile_secrets_update<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Response {
    let by = arg_by(args);
    if let Err(resp) = require_user(&by) {
        return resp;
    }
    let profile_id = arg_str(args, "profile_id");
    if profile_id.is_empty() {
        return Response::error(codes::INVALID_REQUEST, "missing profile_id");
    }
    let doc = match load_profiles(&ctx.home) {
        Ok(d) => d,
        Err(e) => return Response::error(codes::INTERNAL_ERROR, e.to_string()),
    };
    if doc.get(&profile_id).is_none() {
        return Response::error(
            codes::PROFILE_NOT_FOUND,
            format!("profile not found: {profile_id}"),
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

    match cccc_storage::update_profile_secrets(&ctx.home, &profile_id, &set_vars, &unset, clear) {
        Ok(env) => Response::ok(serde_json::json!({
            "profile_id": profile_id,
            "keys": env.keys().collect::<Vec<_>>(),
            "masked": cccc_storage::masked_env(&env),
        })),
        Err(e) => Response::error(codes::INVALID_REQUEST, e.to_string()),
    }
}
