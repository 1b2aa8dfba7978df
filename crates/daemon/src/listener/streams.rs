// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket-hijacking stream ops: `events_stream` and `term_attach`.

use super::{arg_by, arg_str, arg_str_list, DaemonCtx, DispatchOutcome, StreamKind};
use crate::protocol::{self, codes, Response};
use cccc_engine::StreamFrame;
use cccc_runner::SessionAdapter;
use std::collections::HashSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Validate `events_stream` args before the ack.
pub(crate) fn prepare_events_stream<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> DispatchOutcome {
    let group_id = arg_str(args, "group_id");
    if group_id.is_empty() {
        return DispatchOutcome::Reply(Response::error(
            codes::MISSING_GROUP_ID,
            "missing group_id",
        ));
    }
    match cccc_storage::load_group(&ctx.home, &group_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return DispatchOutcome::Reply(Response::error(
                codes::GROUP_NOT_FOUND,
                format!("group not found: {group_id}"),
            ))
        }
        Err(e) => {
            return DispatchOutcome::Reply(Response::error(codes::INTERNAL_ERROR, e.to_string()))
        }
    }
    let kinds_list = arg_str_list(args, "kinds");
    let kinds = if kinds_list.is_empty() {
        None
    } else {
        Some(kinds_list.into_iter().collect::<HashSet<String>>())
    };
    let by = arg_by(args);
    // Register the live subscription now, before the handshake ack, so no
    // append can fall between catch-up and live.
    let (sub_id, rx) = ctx.broadcaster.subscribe(&group_id, &by, kinds.clone());
    DispatchOutcome::Stream(StreamKind::Events {
        group_id,
        by,
        kinds,
        since_event_id: arg_str(args, "since_event_id"),
        since_ts: arg_str(args, "since_ts"),
        sub_id,
        rx,
    })
}

/// Emit catch-up events then live events, strictly ordered, until the
/// client disconnects or falls fatally behind.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_events_stream<S, W>(
    ctx: &DaemonCtx<S>,
    writer: &mut W,
    group_id: &str,
    by: &str,
    kinds: Option<HashSet<String>>,
    since_event_id: &str,
    since_ts: &str,
    sub_id: cccc_engine::SubscriptionId,
    mut rx: tokio::sync::mpsc::Receiver<StreamFrame>,
) where
    S: SessionAdapter,
    W: tokio::io::AsyncWrite + Unpin,
{
    let group = match cccc_storage::load_group(&ctx.home, group_id) {
        Ok(Some(g)) => g,
        _ => {
            ctx.broadcaster.unsubscribe(group_id, sub_id);
            return;
        }
    };

    // Resume point unset means "tail": live events only.
    let tailing = since_event_id.is_empty() && since_ts.is_empty();
    let mut last_sent_id = since_event_id.to_string();
    if !tailing {
        let catch_up = cccc_storage::events_after(
            &ctx.home.ledger_path(group_id),
            since_event_id,
            since_ts,
        );
        for event in catch_up {
            if !event_passes(&group, by, kinds.as_ref(), &event) {
                continue;
            }
            if protocol::write_json(writer, &event).await.is_err() {
                ctx.broadcaster.unsubscribe(group_id, sub_id);
                return;
            }
            last_sent_id = event.id.as_str().to_string();
        }
    } else if let Some(last) = cccc_storage::last_event(&ctx.home.ledger_path(group_id)) {
        last_sent_id = last.id.as_str().to_string();
    }

    loop {
        match rx.recv().await {
            Some(StreamFrame::Event(event)) => {
                // Events already covered by catch-up are skipped so the
                // emitted id sequence stays strictly increasing.
                if !last_sent_id.is_empty() && event.id.as_str() <= last_sent_id.as_str() {
                    continue;
                }
                if protocol::write_json(writer, &event).await.is_err() {
                    break;
                }
                last_sent_id = event.id.as_str().to_string();
            }
            Some(StreamFrame::Overflow) => {
                let err = Response::error(codes::STREAM_OVERFLOW, "subscriber fell behind");
                let _ = protocol::write_json(writer, &err).await;
                break;
            }
            None => break,
        }
    }
    ctx.broadcaster.unsubscribe(group_id, sub_id);
    debug!(group_id, by, "events stream closed");
}

fn event_passes(
    group: &cccc_core::GroupDoc,
    by: &str,
    kinds: Option<&HashSet<String>>,
    event: &cccc_core::LedgerEvent,
) -> bool {
    if let Some(kinds) = kinds {
        if !kinds.contains(event.kind.as_str()) {
            return false;
        }
    }
    if by.is_empty() || by == "user" {
        return true;
    }
    if group.foreman_id().is_some_and(|f| f.as_str() == by) {
        return true;
    }
    match event.kind.family() {
        "chat" | "system" => {
            event.by == by
                || cccc_core::is_message_for_actor(group, by, event)
                || event.data.get("actor_id").and_then(|v| v.as_str()) == Some(by)
        }
        _ => true,
    }
}

/// Validate `term_attach` args before the ack.
pub(crate) fn prepare_term_attach<S: SessionAdapter>(
    ctx: &DaemonCtx<S>,
    args: &serde_json::Value,
) -> DispatchOutcome {
    let group_id = arg_str(args, "group_id");
    if group_id.is_empty() {
        return DispatchOutcome::Reply(Response::error(
            codes::MISSING_GROUP_ID,
            "missing group_id",
        ));
    }
    let actor_id = arg_str(args, "actor_id");
    if actor_id.is_empty() {
        return DispatchOutcome::Reply(Response::error(
            codes::MISSING_ACTOR_ID,
            "missing actor_id",
        ));
    }
    if !ctx.pty.actor_running(&group_id, &actor_id) {
        return DispatchOutcome::Reply(Response::error(
            codes::INVALID_REQUEST,
            format!("actor has no live terminal session: {actor_id}"),
        ));
    }
    DispatchOutcome::Stream(StreamKind::TermAttach { group_id, actor_id })
}

/// Bidirectional passthrough: captured output → socket, socket bytes →
/// PTY, until either side closes.
pub(crate) async fn run_term_attach<S, R, W>(
    ctx: &DaemonCtx<S>,
    mut reader: R,
    mut writer: W,
    group_id: &str,
    actor_id: &str,
) where
    S: SessionAdapter,
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let Some(mut output_rx) = ctx.pty.subscribe_output(group_id, actor_id) else {
        return;
    };
    // Recent backlog first so the client sees context immediately.
    let backlog = ctx.pty.tail_output(group_id, actor_id, 16384);
    if !backlog.is_empty() && writer.write_all(&backlog).await.is_err() {
        return;
    }
    let _ = writer.flush().await;

    let write_lock = ctx.delivery.write_lock(group_id, actor_id);
    let mut input_buf = [0u8; 4096];
    loop {
        tokio::select! {
            chunk = output_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        if writer.write_all(&bytes).await.is_err() {
                            break;
                        }
                        let _ = writer.flush().await;
                    }
                    // Session exited or the subscriber lagged out.
                    None => break,
                }
            }
            read = reader.read(&mut input_buf) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        // Client input is raw passthrough, but still one
                        // writer at a time per actor.
                        let _guard = write_lock.lock().await;
                        if ctx.pty.write_raw(group_id, actor_id, &input_buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
    debug!(group_id, actor_id, "terminal attach closed");
}
