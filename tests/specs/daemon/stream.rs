// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `events_stream` framing: catch-up, live tail, resume, monotonicity.

use crate::prelude::*;

async fn setup_group(client: &mut Client) -> String {
    let created = client
        .ok("group_create", serde_json::json!({"title": "stream", "by": "user"}))
        .await;
    created["group_id"].as_str().unwrap().to_string()
}

async fn send_numbered(client: &mut Client, gid: &str, n: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..n {
        let sent = client
            .ok(
                "send",
                serde_json::json!({"group_id": gid, "by": "user", "text": format!("M{i}"), "to": ["user"]}),
            )
            .await;
        ids.push(sent["event"]["id"].as_str().unwrap().to_string());
    }
    ids
}

/// Open a stream, return the streaming client after the ack.
async fn open_stream(daemon: &SpecDaemon, gid: &str, since_event_id: &str) -> Client {
    let mut client = Client::connect(daemon).await;
    let mut args = serde_json::json!({"group_id": gid, "by": "user"});
    if !since_event_id.is_empty() {
        args["since_event_id"] = serde_json::json!(since_event_id);
    }
    let resp = client.op("events_stream", args).await;
    assert!(resp.ok, "stream handshake acks");
    client
}

#[tokio::test]
async fn live_tail_observes_new_events() {
    let daemon = spawn_daemon().await;
    let mut sender = Client::connect(&daemon).await;
    let gid = setup_group(&mut sender).await;

    let mut stream = open_stream(&daemon, &gid, "").await;
    let ids = send_numbered(&mut sender, &gid, 3).await;

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let line = stream.read_line().await.expect("live frame");
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        if v["kind"] == "chat.message" {
            seen.push(v["id"].as_str().unwrap().to_string());
        }
    }
    assert_eq!(seen, ids);
}

#[tokio::test]
async fn resume_replays_catch_up_then_live() {
    let daemon = spawn_daemon().await;
    let mut sender = Client::connect(&daemon).await;
    let gid = setup_group(&mut sender).await;

    // M1..M5 exist before the subscriber arrives.
    let ids = send_numbered(&mut sender, &gid, 5).await;

    // Resume after M3: immediately receives M4, M5.
    let mut stream = open_stream(&daemon, &gid, &ids[2]).await;
    let mut replayed = Vec::new();
    while replayed.len() < 2 {
        let line = stream.read_line().await.expect("catch-up frame");
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        if v["kind"] == "chat.message" {
            replayed.push(v["id"].as_str().unwrap().to_string());
        }
    }
    assert_eq!(replayed, ids[3..].to_vec());

    // Then continues live.
    let live_ids = send_numbered(&mut sender, &gid, 1).await;
    let line = stream.read_line().await.expect("live frame after catch-up");
    let v: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(v["id"].as_str().unwrap(), live_ids[0]);
}

#[tokio::test]
async fn stream_ids_are_strictly_increasing() {
    let daemon = spawn_daemon().await;
    let mut sender = Client::connect(&daemon).await;
    let gid = setup_group(&mut sender).await;
    let before = send_numbered(&mut sender, &gid, 2).await;

    let mut stream = open_stream(&daemon, &gid, &before[0]).await;
    send_numbered(&mut sender, &gid, 3).await;

    let mut last = before[0].clone();
    for _ in 0..4 {
        let line = stream.read_line().await.expect("frame");
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        let id = v["id"].as_str().unwrap().to_string();
        assert!(id > last, "{id} must sort after {last}");
        last = id;
    }
}

#[tokio::test]
async fn kinds_filter_limits_the_stream() {
    let daemon = spawn_daemon().await;
    let mut sender = Client::connect(&daemon).await;
    let gid = setup_group(&mut sender).await;

    let mut client = Client::connect(&daemon).await;
    let resp = client
        .op(
            "events_stream",
            serde_json::json!({"group_id": gid, "by": "user", "kinds": ["system.notify"]}),
        )
        .await;
    assert!(resp.ok);

    // Chat is filtered out; a notify passes.
    send_numbered(&mut sender, &gid, 2).await;
    sender
        .ok(
            "system_notify",
            serde_json::json!({"group_id": gid, "kind": "info", "title": "T", "message": "ping", "by": "user"}),
        )
        .await;

    let line = client.read_line().await.expect("notify frame");
    let v: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(v["kind"], "system.notify");
}

#[tokio::test]
async fn disconnecting_subscriber_is_dropped() {
    let daemon = spawn_daemon().await;
    let mut sender = Client::connect(&daemon).await;
    let gid = setup_group(&mut sender).await;

    let stream = open_stream(&daemon, &gid, "").await;
    drop(stream);

    // Appends after the disconnect still work; the subscription is
    // reaped on the broken send.
    send_numbered(&mut sender, &gid, 2).await;
    let resp = sender.op("ping", serde_json::json!({})).await;
    assert!(resp.ok);
}
