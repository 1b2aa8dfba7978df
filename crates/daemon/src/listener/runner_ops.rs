// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actor process management shared by ops and startup reconciliation.

use super::DaemonCtx;
use cccc_core::{ActorDef, GroupDoc, Runtime, RunnerKind, SubmitKey};
use cccc_runner::{
    effective_runner_kind, env_merge, merge_actor_env, normalize_runtime_command, SessionAdapter,
};
use cccc_storage::{load_actor_private_env, load_profile_secrets, load_profiles};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

/// Result of launching (or registering) an actor runner.
pub(crate) struct StartedActor {
    pub runner_effective: RunnerKind,
    pub session_key: String,
    pub pid: u32,
}

/// Launch parameters after profile resolution.
struct LaunchPlan {
    runtime: Runtime,
    runner: RunnerKind,
    command: Vec<String>,
    #[allow(dead_code)]
    submit: SubmitKey,
    public_env: BTreeMap<String, String>,
    private_env: BTreeMap<String, String>,
    /// Profile revision to stamp as applied, when linked.
    profile_revision: Option<u64>,
}

/// Resolve runtime/runner/command/submit/env, honoring a linked profile.
///
/// Profile-linked actors take everything from the profile (actor.env stays
/// empty, secrets come from the profile store); the returned revision lets
/// the caller stamp `profile_revision_applied` before session start.
fn resolve_launch<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group: &GroupDoc,
    actor: &ActorDef,
) -> Result<LaunchPlan, String> {
    let gid = group.group_id.as_str();
    if let Some(profile_id) = &actor.profile_id {
        let profiles = load_profiles(&ctx.home).map_err(|e| e.to_string())?;
        let profile = profiles
            .get(profile_id.as_str())
            .ok_or_else(|| format!("profile not found: {profile_id}"))?;
        let private_env =
            load_profile_secrets(&ctx.home, profile_id.as_str()).map_err(|e| e.to_string())?;
        return Ok(LaunchPlan {
            runtime: profile.runtime.clone(),
            runner: profile.runner,
            command: profile.command.clone(),
            submit: profile.submit,
            public_env: BTreeMap::new(),
            private_env,
            profile_revision: Some(profile.revision),
        });
    }
    let private_env =
        load_actor_private_env(&ctx.home, gid, actor.id.as_str()).map_err(|e| e.to_string())?;
    Ok(LaunchPlan {
        runtime: actor.runtime.clone(),
        runner: actor.runner,
        command: actor.command.clone(),
        submit: actor.submit,
        public_env: actor.env.clone(),
        private_env,
        profile_revision: None,
    })
}

fn resolve_cwd<S: SessionAdapter>(ctx: &DaemonCtx<S>, group: &GroupDoc, actor: &ActorDef) -> PathBuf {
    let scope_key = if !actor.default_scope_key.is_empty() {
        actor.default_scope_key.as_str()
    } else {
        group.active_scope_key.as_str()
    };
    if let Some(scope) = group.find_scope(scope_key) {
        let p = PathBuf::from(&scope.url);
        if p.is_dir() {
            return p;
        }
    }
    ctx.home.root().to_path_buf()
}

/// Start (or re-register) one actor's runner. Mutates
/// `profile_revision_applied` in place when a linked profile was re-applied;
/// the caller persists the group afterwards.
pub(crate) async fn start_actor_process<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group: &mut GroupDoc,
    actor_id: &str,
) -> Result<StartedActor, String> {
    let gid = group.group_id.as_str().to_string();
    let actor = group
        .find_actor(actor_id)
        .cloned()
        .ok_or_else(|| format!("unknown actor: {actor_id}"))?;

    let plan = resolve_launch(ctx, group, &actor)?;
    let effective = effective_runner_kind(plan.runner);

    let outcome = match effective {
        RunnerKind::Headless => {
            let handle = ctx.headless.start(&ctx.home, &gid, actor_id);
            StartedActor {
                runner_effective: RunnerKind::Headless,
                session_key: handle.started_at,
                pid: 0,
            }
        }
        RunnerKind::Pty => {
            let argv = normalize_runtime_command(plan.runtime.clone(), &plan.command);
            if argv.is_empty() {
                return Err("custom runtime requires a non-empty command".to_string());
            }
            let mut env = merge_actor_env(&plan.public_env, &plan.private_env, &gid, actor_id);
            if let Err(e) = env_merge::ensure_inputrc(&ctx.home) {
                warn!(error = %e, "failed to write inputrc");
            }
            env_merge::prepare_pty_env(&mut env, &ctx.home);
            let cwd = resolve_cwd(ctx, group, &actor);
            let started = ctx
                .pty
                .start(&gid, actor_id, &argv, &env, &cwd)
                .await
                .map_err(|e| e.to_string())?;
            StartedActor {
                runner_effective: RunnerKind::Pty,
                session_key: started.session_key,
                pid: started.pid,
            }
        }
    };

    if let Some(revision) = plan.profile_revision {
        if let Some(actor) = group.find_actor_mut(actor_id) {
            actor.profile_revision_applied = Some(revision);
        }
    }

    // New session: next delivery re-primes the preamble, throttle resets.
    ctx.delivery.clear_preamble_sent(&gid, actor_id);
    ctx.delivery.reset_actor(&gid, actor_id);

    Ok(outcome)
}

/// Stop one actor's runner (both flavours; stopping a stopped actor is a
/// no-op).
pub(crate) async fn stop_actor_process<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group_id: &str,
    actor_id: &str,
) {
    ctx.pty.stop(group_id, actor_id).await;
    ctx.headless.stop(&ctx.home, group_id, actor_id);
    ctx.delivery.clear_actor(group_id, actor_id);
}

pub(crate) async fn stop_group_runners<S: SessionAdapter>(ctx: &DaemonCtx<S>, group: &GroupDoc) {
    for actor in &group.actors {
        stop_actor_process(ctx, group.group_id.as_str(), actor.id.as_str()).await;
    }
}

pub(crate) fn actor_running<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group_id: &str,
    actor: &ActorDef,
) -> bool {
    match effective_runner_kind(actor.runner) {
        RunnerKind::Headless => ctx.headless.actor_running(group_id, actor.id.as_str()),
        RunnerKind::Pty => ctx.pty.actor_running(group_id, actor.id.as_str()),
    }
}

/// Roster entry with runtime status for `actor_list` / `group_show`.
pub(crate) fn actor_summary<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    group_id: &str,
    actor: &ActorDef,
) -> serde_json::Value {
    let effective = effective_runner_kind(actor.runner);
    let running = actor_running(ctx, group_id, actor);
    let session_key = match effective {
        RunnerKind::Pty => ctx.pty.session_key(group_id, actor.id.as_str()),
        RunnerKind::Headless => ctx
            .headless
            .get(group_id, actor.id.as_str())
            .map(|h| h.started_at),
    };
    serde_json::json!({
        "id": actor.id.as_str(),
        "title": actor.title,
        "runtime": actor.runtime.as_str(),
        "runner": actor.runner.as_str(),
        "runner_effective": effective.as_str(),
        "submit": actor.submit,
        "enabled": actor.enabled,
        "running": running,
        "session_key": session_key,
        "profile_id": actor.profile_id.as_ref().map(|p| p.as_str()),
        "profile_revision_applied": actor.profile_revision_applied,
    })
}
