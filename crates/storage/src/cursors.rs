// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-actor read cursors over the ledger.
//!
//! A cursor is the `(event_id, ts)` of the newest event the actor has read.
//! Advancing past an attention `chat.message` without a `chat.ack` means
//! "read but not acknowledged".

use crate::atomic::{atomic_write_json, read_json_opt, StorageError};
use crate::home::Home;
use cccc_core::utc_now_iso;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Cursor {
    pub fn is_unset(&self) -> bool {
        self.event_id.is_empty() && self.ts.is_empty()
    }

    /// Is `event` (by id, falling back to ts) beyond this cursor?
    pub fn is_before(&self, event_id: &str, ts: &str) -> bool {
        if !self.event_id.is_empty() {
            return event_id > self.event_id.as_str();
        }
        if !self.ts.is_empty() {
            return ts > self.ts.as_str();
        }
        true
    }
}

pub fn get_cursor(home: &Home, group_id: &str, actor_id: &str) -> Result<Cursor, StorageError> {
    Ok(read_json_opt(&home.cursor_path(group_id, actor_id))?.unwrap_or_default())
}

/// Atomically update the cursor. Callers pass the `(event_id, ts)` of a real
/// ledger event.
pub fn set_cursor(
    home: &Home,
    group_id: &str,
    actor_id: &str,
    event_id: &str,
    ts: &str,
) -> Result<Cursor, StorageError> {
    let cursor = Cursor {
        event_id: event_id.to_string(),
        ts: ts.to_string(),
        updated_at: utc_now_iso(),
    };
    atomic_write_json(&home.cursor_path(group_id, actor_id), &cursor)?;
    Ok(cursor)
}

#[cfg(test)]
#[path = "cursors_tests.rs"]
mod tests;
