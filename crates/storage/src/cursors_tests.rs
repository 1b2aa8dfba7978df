// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::home::Home;

#[test]
fn unset_cursor_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let c = get_cursor(&home, "g_x", "peer-a").unwrap();
    assert!(c.is_unset());
    assert!(c.is_before("ev_anything", "2026-01-01T00:00:00Z"));
}

#[test]
fn set_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    set_cursor(&home, "g_x", "peer-a", "ev_0005", "2026-01-01T00:00:05Z").unwrap();
    let c = get_cursor(&home, "g_x", "peer-a").unwrap();
    assert_eq!(c.event_id, "ev_0005");
    assert_eq!(c.ts, "2026-01-01T00:00:05Z");
}

#[test]
fn cursors_are_per_actor() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    set_cursor(&home, "g_x", "peer-a", "ev_0005", "t5").unwrap();
    assert!(get_cursor(&home, "g_x", "peer-b").unwrap().is_unset());
}

#[yare::parameterized(
    behind      = { "ev_0003", false },
    at_cursor   = { "ev_0005", false },
    ahead       = { "ev_0007", true },
)]
fn is_before_compares_ids(event_id: &str, expected: bool) {
    let c = Cursor {
        event_id: "ev_0005".to_string(),
        ts: "t".to_string(),
        updated_at: String::new(),
    };
    assert_eq!(c.is_before(event_id, "ignored"), expected);
}

#[test]
fn is_before_falls_back_to_ts() {
    let c = Cursor {
        event_id: String::new(),
        ts: "2026-01-01T00:00:05Z".to_string(),
        updated_at: String::new(),
    };
    assert!(c.is_before("", "2026-01-01T00:00:06Z"));
    assert!(!c.is_before("", "2026-01-01T00:00:04Z"));
}
