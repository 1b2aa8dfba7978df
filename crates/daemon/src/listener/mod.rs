// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task: accepts connections and dispatches ops.
//!
//! Each accepted socket is served on its own task; a connection carries
//! any number of line-delimited request/response pairs. Ops that mutate a
//! group serialize on that group's mutex so the single-writer invariant
//! for ledger + YAML holds. `events_stream` and `term_attach` hijack the
//! socket into a stream after their success ack.

mod actors;
mod automation_ops;
mod chat;
mod diagnostics;
mod groups;
mod inbox_ops;
mod maintenance;
mod notify;
mod profiles;
mod runner_ops;
mod streams;

use crate::lifecycle::BoundListener;
use crate::protocol::{self, codes, Request, Response};
use cccc_core::GroupDoc;
use cccc_engine::{AutomationManager, Broadcaster, DeliveryPipeline};
use cccc_runner::{HeadlessSupervisor, PtySupervisor, SessionAdapter};
use cccc_storage::{Home, LedgerService};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Shared daemon context for all request handlers.
pub struct DaemonCtx<S: SessionAdapter> {
    pub home: Home,
    pub ledger: LedgerService,
    pub pty: PtySupervisor<S>,
    pub headless: HeadlessSupervisor,
    pub delivery: DeliveryPipeline<S>,
    pub automation: Arc<AutomationManager<S>>,
    pub broadcaster: Broadcaster,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
    group_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: SessionAdapter> DaemonCtx<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        home: Home,
        ledger: LedgerService,
        pty: PtySupervisor<S>,
        headless: HeadlessSupervisor,
        delivery: DeliveryPipeline<S>,
        automation: Arc<AutomationManager<S>>,
        broadcaster: Broadcaster,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            home,
            ledger,
            pty,
            headless,
            delivery,
            automation,
            broadcaster,
            start_time: Instant::now(),
            shutdown,
            group_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The per-group mutex serializing every mutating op for that group.
    pub fn group_lock(&self, group_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.group_locks
                .lock()
                .entry(group_id.to_string())
                .or_default(),
        )
    }
}

/// What the connection loop should do after one request.
pub(crate) enum DispatchOutcome {
    Reply(Response),
    /// Reply, then trip the daemon stop flag.
    ReplyThenExit(Response),
    /// Ack, then hand the socket to a stream driver.
    Stream(StreamKind),
}

pub(crate) enum StreamKind {
    Events {
        group_id: String,
        by: String,
        kinds: Option<std::collections::HashSet<String>>,
        since_event_id: String,
        since_ts: String,
        /// Live subscription, registered before the handshake ack so no
        /// append can fall between catch-up and live.
        sub_id: cccc_engine::SubscriptionId,
        rx: tokio::sync::mpsc::Receiver<cccc_engine::StreamFrame>,
    },
    TermAttach {
        group_id: String,
        actor_id: String,
    },
}

/// Listener task for accepting socket connections.
pub struct Listener<S: SessionAdapter> {
    socket: BoundListener,
    ctx: Arc<DaemonCtx<S>>,
}

impl<S: SessionAdapter> Listener<S> {
    pub fn new(socket: BoundListener, ctx: Arc<DaemonCtx<S>>) -> Self {
        Self { socket, ctx }
    }

    /// Accept until the runtime shuts down, spawning one task per client.
    pub async fn run(self) {
        match self.socket {
            BoundListener::Unix(listener) => loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            let (read, write) = stream.into_split();
                            serve_connection(read, write, ctx).await;
                        });
                    }
                    Err(e) => error!("accept error: {}", e),
                }
            },
            BoundListener::Tcp(listener) => loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "tcp client connected");
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            let (read, write) = stream.into_split();
                            serve_connection(read, write, ctx).await;
                        });
                    }
                    Err(e) => error!("accept error: {}", e),
                }
            },
        }
    }
}

/// Serve request/response pairs until the client goes away or a stream op
/// consumes the socket.
async fn serve_connection<S, R, W>(read: R, mut write: W, ctx: Arc<DaemonCtx<S>>)
where
    S: SessionAdapter,
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(read);
    loop {
        let request = match protocol::read_request(&mut reader).await {
            Ok(req) => req,
            Err(protocol::ProtocolError::ConnectionClosed) => {
                debug!("client disconnected");
                return;
            }
            Err(protocol::ProtocolError::Json(e)) => {
                let resp = Response::error(codes::INVALID_REQUEST, format!("invalid request: {e}"));
                let _ = protocol::write_json(&mut write, &resp).await;
                continue;
            }
            Err(e) => {
                warn!("connection error: {}", e);
                return;
            }
        };

        let id = request.id.clone();
        let op = request.op.clone();
        if op == "ping" || op.starts_with("inbox_") {
            debug!(op, "received request");
        } else {
            info!(op, "received request");
        }

        match dispatch(&ctx, request).await {
            DispatchOutcome::Reply(resp) => {
                if protocol::write_json(&mut write, &resp.with_id(id)).await.is_err() {
                    return;
                }
            }
            DispatchOutcome::ReplyThenExit(resp) => {
                let _ = protocol::write_json(&mut write, &resp.with_id(id)).await;
                let _ = write.flush().await;
                ctx.shutdown.notify_one();
                return;
            }
            DispatchOutcome::Stream(kind) => {
                let ack = Response::ok(serde_json::json!({"streaming": true})).with_id(id);
                if protocol::write_json(&mut write, &ack).await.is_err() {
                    return;
                }
                match kind {
                    StreamKind::Events {
                        group_id,
                        by,
                        kinds,
                        since_event_id,
                        since_ts,
                        sub_id,
                        rx,
                    } => {
                        streams::run_events_stream(
                            &ctx,
                            &mut write,
                            &group_id,
                            &by,
                            kinds,
                            &since_event_id,
                            &since_ts,
                            sub_id,
                            rx,
                        )
                        .await;
                    }
                    StreamKind::TermAttach { group_id, actor_id } => {
                        streams::run_term_attach(&ctx, reader, write, &group_id, &actor_id).await;
                    }
                }
                return;
            }
        }
    }
}

/// Route one op to its handler. Ops that name a group hold that group's
/// mutex for the duration of the handler.
pub(crate) async fn dispatch<S: SessionAdapter>(
    ctx: &Arc<DaemonCtx<S>>,
    request: Request,
) -> DispatchOutcome {
    let op = request.op.trim().to_string();
    let args = request.args.clone();

    // Stream ops validate inside their handlers and never hold the lock.
    match op.as_str() {
        "events_stream" => return streams::prepare_events_stream(ctx, &args),
        "term_attach" => return streams::prepare_term_attach(ctx, &args),
        _ => {}
    }

    // Serialize on the group when one is named. The cross-group relay
    // locks both groups itself, in sorted order.
    let gid = arg_str(&args, "group_id");
    let _guard = if gid.is_empty() || op == "send_cross_group" {
        None
    } else {
        Some(ctx.group_lock(&gid).lock_owned().await)
    };

    let response = route(ctx, &op, &args).await;
    match (op.as_str(), response) {
        ("shutdown", resp) => DispatchOutcome::ReplyThenExit(resp),
        (_, resp) => DispatchOutcome::Reply(resp),
    }
}

async fn route<S: SessionAdapter>(
    ctx: &Arc<DaemonCtx<S>>,
    op: &str,
    args: &serde_json::Value,
) -> Response {
    match op {
        // -- daemon core --
        "ping" => diagnostics::handle_ping(ctx),
        "shutdown" => diagnostics::handle_shutdown(ctx, args).await,
        "observability_get" => diagnostics::handle_observability_get(ctx),
        "observability_update" => diagnostics::handle_observability_update(ctx, args),
        "remote_access_get" => diagnostics::handle_remote_access_get(ctx),
        "remote_access_update" => diagnostics::handle_remote_access_update(ctx, args),

        // -- registry --
        "groups" => groups::handle_groups(ctx),
        "registry_reconcile" => groups::handle_registry_reconcile(ctx, args),
        "attach" => groups::handle_attach(ctx, args),
        "group_create" => groups::handle_group_create(ctx, args),
        "group_create_from_template" => groups::handle_group_create_from_template(ctx, args),

        // -- group core --
        "group_show" => groups::handle_group_show(ctx, args),
        "group_update" => groups::handle_group_update(ctx, args),
        "group_delete" => groups::handle_group_delete(ctx, args).await,
        "group_detach_scope" => groups::handle_group_detach_scope(ctx, args),
        "group_use" => groups::handle_group_use(ctx, args),

        // -- group lifecycle / state / settings --
        "group_start" => groups::handle_group_start(ctx, args).await,
        "group_stop" => groups::handle_group_stop(ctx, args).await,
        "group_set_state" => groups::handle_group_set_state(ctx, args),
        "group_settings_update" => groups::handle_group_settings_update(ctx, args),

        // -- automation --
        "group_automation_state" => automation_ops::handle_state(ctx, args),
        "group_automation_update" => automation_ops::handle_update(ctx, args),
        "group_automation_manage" => automation_ops::handle_manage(ctx, args),
        "group_automation_reset_baseline" => automation_ops::handle_reset_baseline(ctx, args),

        // -- actors --
        "actor_list" => actors::handle_actor_list(ctx, args),
        "actor_add" => actors::handle_actor_add(ctx, args).await,
        "actor_remove" => actors::handle_actor_remove(ctx, args).await,
        "actor_update" => actors::handle_actor_update(ctx, args),
        "actor_start" => actors::handle_actor_start(ctx, args).await,
        "actor_stop" => actors::handle_actor_stop(ctx, args).await,
        "actor_restart" => actors::handle_actor_restart(ctx, args).await,
        "actor_env_private_get" => actors::handle_env_private_get(ctx, args),
        "actor_env_private_update" => actors::handle_env_private_update(ctx, args),

        // -- actor profiles --
        "actor_profile_list" => profiles::handle_profile_list(ctx),
        "actor_profile_upsert" => profiles::handle_profile_upsert(ctx, args),
        "actor_profile_delete" => profiles::handle_profile_delete(ctx, args),
        "actor_profile_secrets_get" => profiles::handle_profile_secrets_get(ctx, args),
        "actor_profile_secrets_update" => profiles::handle_profile_secrets_update(ctx, args),

        // -- chat / inbox --
        "send" => chat::handle_send(ctx, args).await,
        "reply" => chat::handle_reply(ctx, args).await,
        "send_cross_group" => chat::handle_send_cross_group(ctx, args).await,
        "inbox_list" => inbox_ops::handle_inbox_list(ctx, args),
        "inbox_mark_read" => inbox_ops::handle_inbox_mark_read(ctx, args),
        "inbox_mark_all_read" => inbox_ops::handle_inbox_mark_all_read(ctx, args),
        "chat_ack" => inbox_ops::handle_chat_ack(ctx, args),

        // -- system notify --
        "system_notify" => notify::handle_system_notify(ctx, args).await,
        "notify_ack" => notify::handle_notify_ack(ctx, args),

        // -- diagnostics --
        "terminal_tail" => diagnostics::handle_terminal_tail(ctx, args),
        "terminal_clear" => diagnostics::handle_terminal_clear(ctx, args),
        "debug_snapshot" => diagnostics::handle_debug_snapshot(ctx, args),
        "debug_tail_logs" => diagnostics::handle_debug_tail_logs(ctx, args),
        "debug_clear_logs" => diagnostics::handle_debug_clear_logs(ctx, args),

        // -- maintenance --
        "term_resize" => maintenance::handle_term_resize(ctx, args).await,
        "ledger_snapshot" => maintenance::handle_ledger_snapshot(ctx, args),
        "ledger_compact" => maintenance::handle_ledger_compact(ctx, args),

        // -- im / context / headless --
        "im_get" => maintenance::handle_im_get(ctx, args),
        "im_update" => maintenance::handle_im_update(ctx, args),
        "context_show" => maintenance::handle_context_show(ctx, args),
        "context_update" => maintenance::handle_context_update(ctx, args),
        "headless_poll" => maintenance::handle_headless_poll(ctx, args),
        "headless_ack" => maintenance::handle_headless_ack(ctx, args),

        other => Response::error(codes::UNKNOWN_OP, format!("unknown op: {other}")),
    }
}

// -- shared argument & permission helpers --------------------------------

pub(crate) fn arg_str(args: &serde_json::Value, key: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

pub(crate) fn arg_by(args: &serde_json::Value) -> String {
    let by = arg_str(args, "by");
    if by.is_empty() {
        "user".to_string()
    } else {
        by
    }
}

pub(crate) fn arg_bool(args: &serde_json::Value, key: &str) -> bool {
    match args.get(key) {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => {
            matches!(s.trim(), "1" | "true" | "yes" | "on")
        }
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

pub(crate) fn arg_u64(args: &serde_json::Value, key: &str, default: u64) -> u64 {
    match args.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(default),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

pub(crate) fn arg_str_list(args: &serde_json::Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Load the group named in `args`, or produce the canonical error.
pub(crate) fn load_group_for<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> Result<GroupDoc, Response> {
    let gid = arg_str(args, "group_id");
    if gid.is_empty() {
        return Err(Response::error(codes::MISSING_GROUP_ID, "missing group_id"));
    }
    match cccc_storage::load_group(&ctx.home, &gid) {
        Ok(Some(group)) => Ok(group),
        Ok(None) => Err(Response::error(
            codes::GROUP_NOT_FOUND,
            format!("group not found: {gid}"),
        )),
        Err(e) => Err(Response::error(codes::INTERNAL_ERROR, e.to_string())),
    }
}

/// Caller identity against a group's roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Caller {
    User,
    Foreman,
    Peer,
}

pub(crate) fn caller_of(group: &GroupDoc, by: &str) -> Option<Caller> {
    match group.effective_role(by)? {
        "user" => Some(Caller::User),
        "foreman" => Some(Caller::Foreman),
        _ => Some(Caller::Peer),
    }
}

/// Admin ops: user or foreman only.
pub(crate) fn require_admin(group: &GroupDoc, by: &str) -> Result<Caller, Response> {
    match caller_of(group, by) {
        Some(Caller::User) => Ok(Caller::User),
        Some(Caller::Foreman) => Ok(Caller::Foreman),
        Some(Caller::Peer) => Err(Response::error(
            codes::PERMISSION_DENIED,
            format!("requires user or foreman, got peer: {by}"),
        )),
        None => Err(Response::error(
            codes::PERMISSION_DENIED,
            format!("unknown caller: {by}"),
        )),
    }
}

/// Inbox ops on behalf of `target_actor_id`: user, the actor itself, or
/// the foreman.
pub(crate) fn require_inbox_permission(
    group: &GroupDoc,
    by: &str,
    target_actor_id: &str,
) -> Result<(), Response> {
    if by == "user" || by == target_actor_id {
        return Ok(());
    }
    if caller_of(group, by) == Some(Caller::Foreman) {
        return Ok(());
    }
    Err(Response::error(
        codes::PERMISSION_DENIED,
        format!("{by} may not act on {target_actor_id}'s inbox"),
    ))
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
