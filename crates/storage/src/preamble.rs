// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `state/preamble_sent.json`: `actor_id → session_key` of the session that
//! last received the one-shot preamble. A delivery emits the preamble iff
//! the stored key differs from the live session's key.

use crate::atomic::{atomic_write_json, read_json_opt, StorageError};
use crate::home::Home;
use std::collections::BTreeMap;

fn load(home: &Home, group_id: &str) -> BTreeMap<String, String> {
    read_json_opt(&home.preamble_sent_path(group_id))
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Session key recorded as "preamble already sent" for the actor.
pub fn preamble_sent_key(home: &Home, group_id: &str, actor_id: &str) -> Option<String> {
    load(home, group_id).remove(actor_id)
}

pub fn set_preamble_sent(
    home: &Home,
    group_id: &str,
    actor_id: &str,
    session_key: &str,
) -> Result<(), StorageError> {
    let mut map = load(home, group_id);
    map.insert(actor_id.to_string(), session_key.to_string());
    atomic_write_json(&home.preamble_sent_path(group_id), &map)
}

/// Forget the preamble marker so the next delivery re-primes. Called on
/// every actor start/restart.
pub fn clear_preamble_sent(home: &Home, group_id: &str, actor_id: &str) -> Result<(), StorageError> {
    let mut map = load(home, group_id);
    if map.remove(actor_id).is_some() {
        atomic_write_json(&home.preamble_sent_path(group_id), &map)?;
    }
    Ok(())
}
