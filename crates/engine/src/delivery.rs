// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery pipeline: ledger chat/notify events → actor PTY sessions.
//!
//! Contract: strict ledger order per actor, a single writer per PTY, a
//! one-shot preamble per session, and a minimum inter-delivery interval.
//! Failed or gated deliveries stay queued; a new session replays from the
//! queue in order.

use cccc_core::{
    Attachment, EventKind, GroupDoc, GroupState, LedgerEvent, NotifyData, NotifyKind, Priority,
    RunnerKind,
};
use cccc_runner::{effective_runner_kind, PtySupervisor, SessionAdapter};
use cccc_storage::{
    clear_preamble_sent as storage_clear_preamble, get_cursor, preamble_sent_key,
    set_cursor, set_preamble_sent, Home, LedgerService,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// An actor writing output within this window counts as busy; delivery
/// backs off until the terminal settles.
const BUSY_BACKOFF_SECS: f64 = 1.0;
/// At most this many attachments are listed inline per message.
const MAX_ATTACHMENT_LINES: usize = 8;

const DEFAULT_PREAMBLE: &str = "\
[cccc] You are part of a CCCC working group. Messages from other actors and \
the user arrive in this terminal prefixed with [cccc]. Reply with the \
cccc_message_reply tool, check your inbox with cccc_inbox_list, and mark \
messages read with cccc_inbox_mark_read. Run cccc_help for the full playbook.";

#[derive(Debug, Clone, PartialEq)]
enum QueuedKind {
    Chat,
    Notify {
        kind: NotifyKind,
        rule_id: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    event_id: String,
    by: String,
    priority: Priority,
    kind: QueuedKind,
    text: String,
}

#[derive(Default)]
struct ActorQueue {
    pending: VecDeque<QueuedMessage>,
    last_delivery: Option<Instant>,
}

/// The single throttle object owning per-`(group, actor)` delivery state.
#[derive(Clone)]
pub struct DeliveryPipeline<S: SessionAdapter> {
    home: Home,
    ledger: LedgerService,
    pty: PtySupervisor<S>,
    queues: Arc<Mutex<HashMap<(String, String), ActorQueue>>>,
    write_locks: Arc<Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>>,
}

impl<S: SessionAdapter> DeliveryPipeline<S> {
    pub fn new(home: Home, ledger: LedgerService, pty: PtySupervisor<S>) -> Self {
        Self {
            home,
            ledger,
            pty,
            queues: Arc::new(Mutex::new(HashMap::new())),
            write_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The per-actor mutex serializing every write into that actor's PTY
    /// (pipeline deliveries and `term_attach` passthrough alike).
    pub fn write_lock(&self, group_id: &str, actor_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.write_locks
                .lock()
                .entry(key(group_id, actor_id))
                .or_default(),
        )
    }

    /// Queue a rendered chat message for a PTY actor.
    pub fn queue_chat_message(&self, group: &GroupDoc, actor_id: &str, event: &LedgerEvent, text: String) {
        let priority = event.chat_message().map(|d| d.priority).unwrap_or_default();
        self.push(
            group.group_id.as_str(),
            actor_id,
            QueuedMessage {
                event_id: event.id.as_str().to_string(),
                by: event.by.clone(),
                priority,
                kind: QueuedKind::Chat,
                text,
            },
        );
    }

    /// Queue a system notify for a PTY actor.
    pub fn queue_system_notify(&self, group: &GroupDoc, actor_id: &str, event: &LedgerEvent, notify: &NotifyData) {
        self.push(
            group.group_id.as_str(),
            actor_id,
            QueuedMessage {
                event_id: event.id.as_str().to_string(),
                by: event.by.clone(),
                priority: Priority::Normal,
                kind: QueuedKind::Notify {
                    kind: notify.kind,
                    rule_id: notify.rule_id().map(|s| s.to_string()),
                },
                text: render_notify_text(notify, event.id.as_str()),
            },
        );
    }

    fn push(&self, group_id: &str, actor_id: &str, msg: QueuedMessage) {
        let mut queues = self.queues.lock();
        queues.entry(key(group_id, actor_id)).or_default().pending.push_back(msg);
    }

    /// Drain eligible queues for one group. Invoked roughly once per second
    /// and after every enqueue burst.
    pub async fn tick_delivery(&self, group: &GroupDoc) {
        let actor_ids: Vec<String> = {
            let queues = self.queues.lock();
            queues
                .iter()
                .filter(|((gid, _), q)| gid == group.group_id.as_str() && !q.pending.is_empty())
                .map(|((_, aid), _)| aid.clone())
                .collect()
        };
        for actor_id in actor_ids {
            self.deliver_for_actor(group, &actor_id, false).await;
        }
    }

    /// Immediate delivery attempt for one actor, bypassing the interval
    /// throttle (used right after automation enqueues).
    pub async fn flush_pending(&self, group: &GroupDoc, actor_id: &str) {
        self.deliver_for_actor(group, actor_id, true).await;
    }

    async fn deliver_for_actor(&self, group: &GroupDoc, actor_id: &str, ignore_interval: bool) {
        let gid = group.group_id.as_str();
        let Some(actor) = group.find_actor(actor_id) else {
            // Removed actor: drop its queue.
            self.clear_actor(gid, actor_id);
            return;
        };
        if effective_runner_kind(actor.runner) != RunnerKind::Pty {
            // Headless actors receive nothing over stdin; inbox polling
            // carries their messages.
            self.clear_actor(gid, actor_id);
            return;
        }
        let Some(session_key) = self.pty.session_key(gid, actor_id) else {
            // Not running: leave the queue; replay happens on next start.
            return;
        };

        let min_interval = Duration::from_secs(group.delivery.min_interval_seconds);
        let write_lock = self.write_lock(gid, actor_id);

        loop {
            // Pop decision under the queue lock, one message at a time so
            // ledger order is preserved even across gating.
            let msg = {
                let mut queues = self.queues.lock();
                let Some(queue) = queues.get_mut(&key(gid, actor_id)) else {
                    return;
                };
                let Some(front) = queue.pending.front() else {
                    return;
                };
                if !Self::passes_state_gate(group.state, front) {
                    return;
                }
                if !ignore_interval {
                    if let Some(last) = queue.last_delivery {
                        if last.elapsed() < min_interval {
                            return;
                        }
                    }
                }
                if let Some(idle) = self.pty.idle_seconds(gid, actor_id) {
                    if idle < BUSY_BACKOFF_SECS {
                        // Terminal still streaming output; try next tick.
                        return;
                    }
                }
                front.clone()
            };

            let mut text = msg.text.clone();
            let preamble_needed =
                preamble_sent_key(&self.home, gid, actor_id).as_deref() != Some(session_key.as_str());
            if preamble_needed {
                let preamble = self.load_preamble(gid);
                text = format!("{preamble}\n\n{text}");
            }

            let written = {
                let _guard = write_lock.lock().await;
                self.pty.write_text(gid, actor_id, &text, actor.submit).await
            };
            match written {
                Ok(()) => {}
                Err(e) => {
                    debug!(gid, actor_id, error = %e, "delivery failed, leaving message queued");
                    return;
                }
            }

            if preamble_needed {
                if let Err(e) = set_preamble_sent(&self.home, gid, actor_id, &session_key) {
                    warn!(gid, actor_id, error = %e, "failed to persist preamble flag");
                }
            }

            {
                let mut queues = self.queues.lock();
                if let Some(queue) = queues.get_mut(&key(gid, actor_id)) {
                    queue.pending.pop_front();
                    queue.last_delivery = Some(Instant::now());
                }
            }

            if group.delivery.auto_mark_on_delivery && msg.kind == QueuedKind::Chat {
                self.auto_mark(group, actor_id, &msg);
            }

            if !ignore_interval && !min_interval.is_zero() {
                return;
            }
        }
    }

    fn passes_state_gate(state: GroupState, msg: &QueuedMessage) -> bool {
        if state == GroupState::Active {
            return true;
        }
        // Non-active groups only pass rule-owned automation notifies.
        matches!(
            &msg.kind,
            QueuedKind::Notify { kind: NotifyKind::Automation, rule_id: Some(_) }
        )
    }

    /// Advance the cursor and append `chat.read` (plus `chat.ack` for
    /// attention) once the runner has confirmed receipt.
    fn auto_mark(&self, group: &GroupDoc, actor_id: &str, msg: &QueuedMessage) {
        let gid = group.group_id.as_str();
        let ledger_path = self.home.ledger_path(gid);
        let Some(event) = cccc_storage::find_event(&ledger_path, &msg.event_id) else {
            return;
        };
        let cursor = get_cursor(&self.home, gid, actor_id).unwrap_or_default();
        if cursor.is_before(event.id.as_str(), &event.ts) {
            if let Err(e) = set_cursor(&self.home, gid, actor_id, event.id.as_str(), &event.ts) {
                warn!(gid, actor_id, error = %e, "auto-mark cursor update failed");
                return;
            }
            let _ = self.ledger.append(
                &ledger_path,
                EventKind::ChatRead,
                &group.group_id,
                "",
                actor_id,
                serde_json::json!({"actor_id": actor_id, "event_id": msg.event_id}),
            );
        }
        if msg.priority.is_attention()
            && msg.by != actor_id
            && !crate::inbox::has_chat_ack(&self.home, group, &msg.event_id, actor_id)
        {
            let _ = self.ledger.append(
                &ledger_path,
                EventKind::ChatAck,
                &group.group_id,
                "",
                actor_id,
                serde_json::json!({"actor_id": actor_id, "event_id": msg.event_id}),
            );
        }
    }

    fn load_preamble(&self, group_id: &str) -> String {
        let override_path = self.home.prompts_dir(group_id).join("CCCC_PREAMBLE.md");
        match std::fs::read_to_string(&override_path) {
            Ok(text) if !text.trim().is_empty() => text.trim_end().to_string(),
            _ => DEFAULT_PREAMBLE.to_string(),
        }
    }

    /// Forget the preamble marker so the next delivery re-primes. Called on
    /// every actor start/restart.
    pub fn clear_preamble_sent(&self, group_id: &str, actor_id: &str) {
        if let Err(e) = storage_clear_preamble(&self.home, group_id, actor_id) {
            warn!(group_id, actor_id, error = %e, "failed to clear preamble flag");
        }
    }

    /// Drop queued system notifies of the given kinds (resume handling).
    pub fn clear_pending_system_notifies(&self, group_id: &str, kinds: &HashSet<NotifyKind>) {
        let mut queues = self.queues.lock();
        for ((gid, _), queue) in queues.iter_mut() {
            if gid != group_id {
                continue;
            }
            queue.pending.retain(|msg| match &msg.kind {
                QueuedKind::Notify { kind, .. } => !kinds.contains(kind),
                QueuedKind::Chat => true,
            });
        }
    }

    /// Drop everything queued for one actor (actor stop/remove).
    pub fn clear_actor(&self, group_id: &str, actor_id: &str) {
        self.queues.lock().remove(&key(group_id, actor_id));
    }

    /// Reset throttle state without dropping the queue (actor restart).
    pub fn reset_actor(&self, group_id: &str, actor_id: &str) {
        if let Some(queue) = self.queues.lock().get_mut(&key(group_id, actor_id)) {
            queue.last_delivery = None;
        }
    }

    /// Queue depths for diagnostics.
    pub fn debug_summary(&self) -> serde_json::Value {
        let queues = self.queues.lock();
        let entries: Vec<serde_json::Value> = queues
            .iter()
            .map(|((gid, aid), q)| {
                serde_json::json!({
                    "group_id": gid,
                    "actor_id": aid,
                    "pending": q.pending.len(),
                })
            })
            .collect();
        serde_json::json!({"queues": entries})
    }

    pub fn pending_count(&self, group_id: &str, actor_id: &str) -> usize {
        self.queues
            .lock()
            .get(&key(group_id, actor_id))
            .map(|q| q.pending.len())
            .unwrap_or(0)
    }
}

fn key(group_id: &str, actor_id: &str) -> (String, String) {
    (group_id.to_string(), actor_id.to_string())
}

/// Build the delivery text for a chat message: prefix lines per priority /
/// reply-required / relay provenance, then the body, then the attachment
/// list (capped at [`MAX_ATTACHMENT_LINES`]).
pub fn render_delivery_text(
    text: &str,
    priority: Priority,
    reply_required: bool,
    event_id: &str,
    attachments: &[Attachment],
    src_group_id: Option<&str>,
    src_event_id: Option<&str>,
) -> String {
    let mut prefix_lines: Vec<String> = Vec::new();
    if priority.is_attention() && !event_id.is_empty() {
        prefix_lines.push(format!("[cccc] IMPORTANT (event_id={event_id}):"));
    }
    if reply_required && !event_id.is_empty() {
        prefix_lines.push(format!(
            "[cccc] REPLY REQUIRED (event_id={event_id}): reply via cccc_message_reply."
        ));
    }
    if let (Some(src_gid), Some(src_eid)) = (src_group_id, src_event_id) {
        if !src_gid.is_empty() && !src_eid.is_empty() {
            prefix_lines.push(format!(
                "[cccc] RELAYED FROM (group_id={src_gid}, event_id={src_eid}):"
            ));
        }
    }

    let mut out = if prefix_lines.is_empty() {
        text.to_string()
    } else {
        format!("{}\n{}", prefix_lines.join("\n"), text)
    };

    if !attachments.is_empty() {
        let mut lines = vec!["[cccc] Attachments:".to_string()];
        for attachment in attachments.iter().take(MAX_ATTACHMENT_LINES) {
            let title = if attachment.title.trim().is_empty() {
                if attachment.path.is_empty() { "file" } else { attachment.path.as_str() }
            } else {
                attachment.title.as_str()
            };
            lines.push(format!(
                "- {} ({} bytes) [{}]",
                title, attachment.bytes, attachment.path
            ));
        }
        if attachments.len() > MAX_ATTACHMENT_LINES {
            lines.push(format!("- … ({} more)", attachments.len() - MAX_ATTACHMENT_LINES));
        }
        out = format!("{}\n\n{}", out.trim_end_matches('\n'), lines.join("\n"));
    }
    out
}

/// Render a system notify as a single terminal block.
pub fn render_notify_text(notify: &NotifyData, event_id: &str) -> String {
    let mut out = format!("[cccc] {} (event_id={event_id}):", notify.title);
    if !notify.message.trim().is_empty() {
        out.push('\n');
        out.push_str(notify.message.trim_end());
    }
    if notify.requires_ack {
        out.push_str(&format!(
            "\n[cccc] ACK required: cccc_notify_ack(event_id={event_id})."
        ));
    }
    out
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
