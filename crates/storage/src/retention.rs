// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ledger retention: compaction into gzip archives and read-only snapshots.
//!
//! Compaction moves old events into `ledger.<stamp>.jsonl.gz` and rewrites
//! the live file atomically. An event is never archived while any actor
//! still needs it: behind a cursor, part of an open obligation, referenced
//! by an open obligation's reply/ack chain, or inside the recent-window
//! tail.

use crate::atomic::StorageError;
use crate::cursors::get_cursor;
use crate::home::Home;
use crate::ledger::iter_events;
use cccc_core::{EventKind, GroupDoc, LedgerEvent};
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;

#[derive(Debug, Clone, Copy)]
pub struct CompactOptions {
    /// Events in the tail that are always kept live.
    pub keep_recent: usize,
    /// Compact even when below the size threshold.
    pub force: bool,
    /// Minimum live-event count before auto compaction bothers.
    pub min_events: usize,
}

impl Default for CompactOptions {
    fn default() -> Self {
        Self {
            keep_recent: 500,
            force: false,
            min_events: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactResult {
    pub archived: usize,
    pub kept: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_file: Option<String>,
    pub skipped: bool,
}

/// Compact a group's ledger.
///
/// Callers hold the group mutex; the rewrite is temp + rename so a crash
/// leaves either the old or the new live file, and the archive is written
/// before the live file shrinks.
pub fn compact_ledger(
    home: &Home,
    group: &GroupDoc,
    opts: CompactOptions,
) -> Result<CompactResult, StorageError> {
    let gid = group.group_id.as_str();
    let path = home.ledger_path(gid);
    let events: Vec<LedgerEvent> = iter_events(&path).collect();

    if events.is_empty() || (!opts.force && events.len() < opts.min_events) {
        return Ok(CompactResult {
            kept: events.len(),
            skipped: true,
            ..Default::default()
        });
    }

    let protected = protected_event_ids(home, group, &events);
    let cut = events.len().saturating_sub(opts.keep_recent);

    let mut archived: Vec<&LedgerEvent> = Vec::new();
    let mut kept: Vec<&LedgerEvent> = Vec::new();
    for (i, ev) in events.iter().enumerate() {
        if i < cut && !protected.contains(ev.id.as_str()) {
            archived.push(ev);
        } else {
            kept.push(ev);
        }
    }

    if archived.is_empty() {
        return Ok(CompactResult {
            kept: kept.len(),
            skipped: true,
            ..Default::default()
        });
    }

    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let archive_path = home.group_dir(gid).join(format!("ledger.{stamp}.jsonl.gz"));
    {
        let file = std::fs::File::create(&archive_path)?;
        let mut enc = GzEncoder::new(file, Compression::default());
        for ev in &archived {
            let line = serde_json::to_vec(ev)?;
            enc.write_all(&line)?;
            enc.write_all(b"\n")?;
        }
        let file = enc.finish()?;
        file.sync_all()?;
    }

    let mut live = Vec::new();
    for ev in &kept {
        live.extend_from_slice(&serde_json::to_vec(ev)?);
        live.push(b'\n');
    }
    crate::atomic::atomic_write_bytes(&path, &live)?;

    Ok(CompactResult {
        archived: archived.len(),
        kept: kept.len(),
        archive_file: Some(archive_path.display().to_string()),
        skipped: false,
    })
}

/// Event ids that must stay in the live file.
fn protected_event_ids(home: &Home, group: &GroupDoc, events: &[LedgerEvent]) -> HashSet<String> {
    let mut protected: HashSet<String> = HashSet::new();

    // Satisfaction indexes: replies and acks by target event id.
    let mut replied: HashSet<String> = HashSet::new();
    let mut acked: HashSet<String> = HashSet::new();
    for ev in events {
        match ev.kind {
            EventKind::ChatMessage => {
                if let Some(data) = ev.chat_message() {
                    if let Some(rt) = data.reply_to {
                        replied.insert(rt);
                    }
                }
            }
            EventKind::ChatAck => {
                if let Some(data) = ev.chat_ref() {
                    acked.insert(data.event_id);
                }
            }
            _ => {}
        }
    }

    // Open obligations stay live, conservatively across all recipients.
    for ev in events {
        if let Some(data) = ev.chat_message() {
            let open_reply = data.reply_required && !replied.contains(ev.id.as_str());
            let open_ack = data.priority.is_attention() && !acked.contains(ev.id.as_str());
            if open_reply || open_ack {
                protected.insert(ev.id.as_str().to_string());
            }
        }
    }

    // Everything at or past the slowest cursor stays live.
    let mut min_cursor: Option<String> = None;
    let mut consider = |cursor_event_id: String| {
        if cursor_event_id.is_empty() {
            // An unset cursor protects the whole ledger.
            min_cursor = Some(String::new());
            return;
        }
        match &min_cursor {
            Some(cur) if cur.as_str() <= cursor_event_id.as_str() => {}
            _ => min_cursor = Some(cursor_event_id),
        }
    };
    for actor in &group.actors {
        if let Ok(c) = get_cursor(home, group.group_id.as_str(), actor.id.as_str()) {
            consider(c.event_id);
        }
    }
    if let Ok(c) = get_cursor(home, group.group_id.as_str(), "user") {
        consider(c.event_id);
    }
    if let Some(min_cursor) = min_cursor {
        for ev in events {
            if min_cursor.is_empty() || ev.id.as_str() >= min_cursor.as_str() {
                protected.insert(ev.id.as_str().to_string());
            }
        }
    }

    protected
}

/// Denormalized summary of the ledger; never mutates it.
pub fn snapshot_ledger(home: &Home, group: &GroupDoc, reason: &str) -> serde_json::Value {
    let path = home.ledger_path(group.group_id.as_str());
    let mut total = 0usize;
    let mut chat = 0usize;
    let mut notify = 0usize;
    let mut open_reply_required = 0usize;
    let mut replied: HashSet<String> = HashSet::new();
    let mut reply_required: Vec<String> = Vec::new();
    let mut last_event_id = String::new();
    let mut last_ts = String::new();

    for ev in iter_events(&path) {
        total += 1;
        last_event_id = ev.id.as_str().to_string();
        last_ts = ev.ts.clone();
        match ev.kind {
            EventKind::ChatMessage => {
                chat += 1;
                if let Some(data) = ev.chat_message() {
                    if let Some(rt) = data.reply_to {
                        replied.insert(rt);
                    }
                    if data.reply_required {
                        reply_required.push(ev.id.as_str().to_string());
                    }
                }
            }
            EventKind::SystemNotify => notify += 1,
            _ => {}
        }
    }
    for id in &reply_required {
        if !replied.contains(id) {
            open_reply_required += 1;
        }
    }

    let mut actors = Vec::new();
    for actor in &group.actors {
        let cursor = get_cursor(home, group.group_id.as_str(), actor.id.as_str()).unwrap_or_default();
        actors.push(serde_json::json!({
            "actor_id": actor.id.as_str(),
            "enabled": actor.enabled,
            "runner": actor.runner.as_str(),
            "cursor": {"event_id": cursor.event_id, "ts": cursor.ts},
        }));
    }

    serde_json::json!({
        "v": 1,
        "reason": reason,
        "group_id": group.group_id.as_str(),
        "title": group.title,
        "state": group.state.as_str(),
        "running": group.running,
        "events": {
            "total": total,
            "chat": chat,
            "notify": notify,
            "open_reply_required": open_reply_required,
            "last_event_id": last_event_id,
            "last_ts": last_ts,
        },
        "actors": actors,
        "ts": cccc_core::utc_now_iso(),
    })
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
