// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cccc_core::{EventKind, GroupId};
use parking_lot::Mutex;
use std::sync::Arc;

fn append_chat(svc: &LedgerService, path: &std::path::Path, by: &str, text: &str) -> cccc_core::LedgerEvent {
    svc.append(
        path,
        EventKind::ChatMessage,
        &GroupId::new("g_demo"),
        "",
        by,
        serde_json::json!({"text": text, "to": ["@all"]}),
    )
    .unwrap()
}

#[test]
fn append_assigns_increasing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let svc = LedgerService::new();
    let a = append_chat(&svc, &path, "user", "one");
    let b = append_chat(&svc, &path, "user", "two");
    let c = append_chat(&svc, &path, "user", "three");
    assert!(a.id < b.id);
    assert!(b.id < c.id);
    assert!(a.id.as_str().starts_with("ev_"));
}

#[test]
fn iter_returns_events_in_append_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let svc = LedgerService::new();
    for i in 0..10 {
        append_chat(&svc, &path, "user", &format!("msg-{i}"));
    }
    let texts: Vec<String> = iter_events(&path)
        .filter_map(|ev| ev.chat_message())
        .map(|d| d.text)
        .collect();
    assert_eq!(texts.len(), 10);
    assert_eq!(texts[0], "msg-0");
    assert_eq!(texts[9], "msg-9");
}

#[test]
fn ids_stay_monotonic_across_service_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let a = append_chat(&LedgerService::new(), &path, "user", "one");
    // Fresh service simulates a daemon restart.
    let b = append_chat(&LedgerService::new(), &path, "user", "two");
    assert!(b.id > a.id);
}

#[test]
fn partial_final_line_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let svc = LedgerService::new();
    append_chat(&svc, &path, "user", "complete");
    // Simulate an interrupted append: no trailing newline.
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    f.write_all(b"{\"id\": \"ev_trunc").unwrap();
    drop(f);

    let events: Vec<_> = iter_events(&path).collect();
    assert_eq!(events.len(), 1);
}

#[test]
fn corrupt_middle_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let svc = LedgerService::new();
    append_chat(&svc, &path, "user", "one");
    use std::io::Write;
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"not json at all\n").unwrap();
    }
    append_chat(&svc, &path, "user", "two");
    let events: Vec<_> = iter_events(&path).collect();
    assert_eq!(events.len(), 2);
}

#[test]
fn find_event_scans_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let svc = LedgerService::new();
    append_chat(&svc, &path, "user", "one");
    let target = append_chat(&svc, &path, "user", "two");
    append_chat(&svc, &path, "user", "three");

    let found = find_event(&path, target.id.as_str()).unwrap();
    assert_eq!(found, target);
    assert!(find_event(&path, "ev_nope").is_none());
}

#[test]
fn tail_events_returns_last_n() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let svc = LedgerService::new();
    for i in 0..7 {
        append_chat(&svc, &path, "user", &format!("m{i}"));
    }
    let tail = tail_events(&path, 3);
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[2].chat_message().unwrap().text, "m6");
    assert_eq!(tail[0].chat_message().unwrap().text, "m4");
}

#[test]
fn events_after_resumes_by_id_then_ts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let svc = LedgerService::new();
    let a = append_chat(&svc, &path, "user", "one");
    let b = append_chat(&svc, &path, "user", "two");
    let c = append_chat(&svc, &path, "user", "three");

    let after_a = events_after(&path, a.id.as_str(), "");
    assert_eq!(after_a.len(), 2);
    assert_eq!(after_a[0].id, b.id);

    let after_c = events_after(&path, c.id.as_str(), "");
    assert!(after_c.is_empty());

    let all = events_after(&path, "", "");
    assert_eq!(all.len(), 3);
}

#[test]
fn append_hook_fires_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let svc = LedgerService::new();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    svc.set_append_hook(Arc::new(move |ev| {
        seen2.lock().push(ev.id.as_str().to_string());
    }));
    let a = append_chat(&svc, &path, "user", "one");
    let b = append_chat(&svc, &path, "user", "two");
    assert_eq!(*seen.lock(), vec![a.id.as_str().to_string(), b.id.as_str().to_string()]);
}

#[test]
fn missing_file_iterates_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.jsonl");
    assert_eq!(iter_events(&path).count(), 0);
    assert!(last_event(&path).is_none());
}
