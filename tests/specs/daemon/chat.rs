// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end chat flow over the socket: attach → create → add actor →
//! send → inbox → mark read → ack.

use crate::prelude::*;

async fn group_with_headless_actor(client: &mut Client) -> String {
    let created = client
        .ok("group_create", serde_json::json!({"title": "demo", "by": "user"}))
        .await;
    let gid = created["group_id"].as_str().unwrap().to_string();
    client
        .ok(
            "actor_add",
            serde_json::json!({
                "group_id": gid, "actor_id": "peer-a",
                "runtime": "codex", "runner": "headless", "by": "user",
            }),
        )
        .await;
    client
        .ok(
            "actor_start",
            serde_json::json!({"group_id": gid, "actor_id": "peer-a", "by": "user"}),
        )
        .await;
    gid
}

#[tokio::test]
async fn attach_create_send_deliver_mark_read() {
    let daemon = spawn_daemon().await;
    let mut client = Client::connect(&daemon).await;
    let project = tempfile::tempdir().unwrap();

    let gid = group_with_headless_actor(&mut client).await;
    let attached = client
        .ok(
            "attach",
            serde_json::json!({
                "path": project.path().display().to_string(),
                "group_id": gid, "by": "user",
            }),
        )
        .await;
    assert_eq!(attached["group_id"], gid);

    let sent = client
        .ok(
            "send",
            serde_json::json!({"group_id": gid, "by": "user", "text": "hi", "to": ["@all"]}),
        )
        .await;
    let event_id = sent["event"]["id"].as_str().unwrap().to_string();

    let inbox = client
        .ok(
            "inbox_list",
            serde_json::json!({"group_id": gid, "actor_id": "peer-a", "by": "peer-a", "kind_filter": "chat"}),
        )
        .await;
    assert_eq!(inbox["messages"][0]["id"], event_id);

    let marked = client
        .ok(
            "inbox_mark_read",
            serde_json::json!({"group_id": gid, "actor_id": "peer-a", "event_id": event_id, "by": "peer-a"}),
        )
        .await;
    assert_eq!(marked["cursor"]["event_id"], event_id);

    let inbox = client
        .ok(
            "inbox_list",
            serde_json::json!({"group_id": gid, "actor_id": "peer-a", "by": "peer-a", "kind_filter": "chat"}),
        )
        .await;
    assert!(inbox["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn attention_message_gets_acked_on_read() {
    let daemon = spawn_daemon().await;
    let mut client = Client::connect(&daemon).await;
    let gid = group_with_headless_actor(&mut client).await;

    let sent = client
        .ok(
            "send",
            serde_json::json!({
                "group_id": gid, "by": "user", "text": "urgent",
                "to": ["peer-a"], "priority": "attention",
            }),
        )
        .await;
    let event_id = sent["event"]["id"].as_str().unwrap().to_string();

    let marked = client
        .ok(
            "inbox_mark_read",
            serde_json::json!({"group_id": gid, "actor_id": "peer-a", "event_id": event_id, "by": "peer-a"}),
        )
        .await;
    assert!(marked["ack_event"].is_object());

    // The ledger holds message, read marker, and exactly one ack.
    let events: Vec<_> = cccc_storage::iter_events(&daemon.home.ledger_path(&gid)).collect();
    let acks = events
        .iter()
        .filter(|e| e.kind.as_str() == "chat.ack")
        .count();
    assert_eq!(acks, 1);
}

#[tokio::test]
async fn ledger_is_replayable_and_strictly_ordered() {
    let daemon = spawn_daemon().await;
    let mut client = Client::connect(&daemon).await;
    let gid = group_with_headless_actor(&mut client).await;

    for i in 0..5 {
        client
            .ok(
                "send",
                serde_json::json!({"group_id": gid, "by": "user", "text": format!("m{i}"), "to": ["@all"]}),
            )
            .await;
    }

    let events: Vec<_> = cccc_storage::iter_events(&daemon.home.ledger_path(&gid)).collect();
    assert!(events.len() >= 5);
    for pair in events.windows(2) {
        assert!(pair[0].id < pair[1].id, "event ids strictly increase");
    }
}

#[tokio::test]
async fn reply_flow_satisfies_obligation() {
    let daemon = spawn_daemon().await;
    let mut client = Client::connect(&daemon).await;
    let gid = group_with_headless_actor(&mut client).await;

    let ask = client
        .ok(
            "send",
            serde_json::json!({
                "group_id": gid, "by": "user", "text": "please answer",
                "to": ["peer-a"], "reply_required": true,
            }),
        )
        .await;
    let ask_id = ask["event"]["id"].as_str().unwrap().to_string();

    client
        .ok(
            "reply",
            serde_json::json!({"group_id": gid, "by": "peer-a", "text": "done", "reply_to": ask_id}),
        )
        .await;

    let group = cccc_storage::load_group(&daemon.home, &gid).unwrap().unwrap();
    let ask_event = cccc_storage::find_event(&daemon.home.ledger_path(&gid), &ask_id).unwrap();
    let batch = cccc_engine::obligation_status_batch(
        &daemon.home,
        &group,
        std::slice::from_ref(&ask_event),
    );
    assert!(batch[&ask_id]["peer-a"].replied);
}
