// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbox reads: unread scans and obligation tracking over the ledger.
//!
//! Everything here is a pure scan of the ledger file plus the actor's
//! cursor; no state is written.

use cccc_core::{is_message_for_actor, EventKind, GroupDoc, LedgerEvent, ShortId};
use cccc_storage::{get_cursor, iter_events, Home};
use std::collections::HashMap;

/// Inbox listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    Chat,
    Notify,
}

impl KindFilter {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "chat" => KindFilter::Chat,
            "notify" => KindFilter::Notify,
            _ => KindFilter::All,
        }
    }

    fn matches(self, kind: &EventKind) -> bool {
        match self {
            KindFilter::All => kind.is_chat_message() || kind.is_notify(),
            KindFilter::Chat => kind.is_chat_message(),
            KindFilter::Notify => kind.is_notify(),
        }
    }
}

/// Per-recipient obligation state for one chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ObligationStatus {
    pub reply_required: bool,
    pub replied: bool,
    pub acked: bool,
}

/// Events after the actor's cursor that are addressed to it, oldest first.
pub fn unread_messages(
    home: &Home,
    group: &GroupDoc,
    actor_id: &str,
    limit: usize,
    filter: KindFilter,
) -> Vec<LedgerEvent> {
    let cursor = get_cursor(home, group.group_id.as_str(), actor_id).unwrap_or_default();
    let mut out = Vec::new();
    for ev in iter_events(&home.ledger_path(group.group_id.as_str())) {
        if !filter.matches(&ev.kind) {
            continue;
        }
        if !cursor.is_before(ev.id.as_str(), &ev.ts) {
            continue;
        }
        if !is_message_for_actor(group, actor_id, &ev) {
            continue;
        }
        out.push(ev);
        if out.len() >= limit {
            break;
        }
    }
    out
}

/// Newest unread event for the actor (used by mark-all-read).
pub fn latest_unread_event(
    home: &Home,
    group: &GroupDoc,
    actor_id: &str,
    filter: KindFilter,
) -> Option<LedgerEvent> {
    let cursor = get_cursor(home, group.group_id.as_str(), actor_id).unwrap_or_default();
    iter_events(&home.ledger_path(group.group_id.as_str()))
        .filter(|ev| filter.matches(&ev.kind))
        .filter(|ev| cursor.is_before(ev.id.as_str(), &ev.ts))
        .filter(|ev| is_message_for_actor(group, actor_id, ev))
        .last()
}

/// Has `actor_id` appended a `chat.ack` for `event_id`?
pub fn has_chat_ack(home: &Home, group: &GroupDoc, event_id: &str, actor_id: &str) -> bool {
    iter_events(&home.ledger_path(group.group_id.as_str())).any(|ev| {
        ev.kind == EventKind::ChatAck
            && ev
                .chat_ref()
                .is_some_and(|d| d.event_id == event_id && d.actor_id == actor_id)
    })
}

/// First 100 chars of the referenced message's text, for reply quoting.
pub fn quote_text(home: &Home, group: &GroupDoc, event_id: &str, max_len: usize) -> Option<String> {
    let ev = cccc_storage::find_event(&home.ledger_path(group.group_id.as_str()), event_id)?;
    let data = ev.chat_message()?;
    let flat = data.text.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.short(max_len).to_string())
}

/// For each chat event, per-recipient `{reply_required, replied, acked}`.
///
/// `replied` is satisfied by a `chat.message` with `reply_to == event.id`
/// authored by the recipient; `acked` by a `chat.ack` referencing it. One
/// ledger pass builds the satisfaction indexes for the whole batch.
pub fn obligation_status_batch(
    home: &Home,
    group: &GroupDoc,
    events: &[LedgerEvent],
) -> HashMap<String, HashMap<String, ObligationStatus>> {
    // (target_event_id, author) pairs.
    let mut replies: Vec<(String, String)> = Vec::new();
    let mut acks: Vec<(String, String)> = Vec::new();
    for ev in iter_events(&home.ledger_path(group.group_id.as_str())) {
        match ev.kind {
            EventKind::ChatMessage => {
                if let Some(data) = ev.chat_message() {
                    if let Some(rt) = data.reply_to {
                        replies.push((rt, ev.by.clone()));
                    }
                }
            }
            EventKind::ChatAck => {
                if let Some(data) = ev.chat_ref() {
                    acks.push((data.event_id, data.actor_id));
                }
            }
            _ => {}
        }
    }

    let mut out: HashMap<String, HashMap<String, ObligationStatus>> = HashMap::new();
    for ev in events {
        if !ev.kind.is_chat_message() {
            continue;
        }
        let Some(data) = ev.chat_message() else {
            continue;
        };
        let mut recipients: Vec<String> = group
            .actors
            .iter()
            .filter(|a| is_message_for_actor(group, a.id.as_str(), ev))
            .map(|a| a.id.as_str().to_string())
            .collect();
        let user_id = "user".to_string();
        if is_message_for_actor(group, &user_id, ev) {
            recipients.push(user_id);
        }

        let mut per_recipient = HashMap::new();
        for recipient in recipients {
            let replied = replies
                .iter()
                .any(|(target, by)| target == ev.id.as_str() && *by == recipient);
            let acked = acks
                .iter()
                .any(|(target, by)| target == ev.id.as_str() && *by == recipient);
            per_recipient.insert(
                recipient,
                ObligationStatus {
                    reply_required: data.reply_required,
                    replied,
                    acked,
                },
            );
        }
        out.insert(ev.id.as_str().to_string(), per_recipient);
    }
    out
}

#[cfg(test)]
#[path = "inbox_tests.rs"]
mod tests;
