// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level behavior: framing, reuse, malformed input.

use crate::prelude::*;

#[tokio::test]
async fn ping_over_the_socket() {
    let daemon = spawn_daemon().await;
    let resp = one_shot(&daemon, "ping", serde_json::json!({})).await;
    assert!(resp.ok);
    let result = resp.result.unwrap();
    assert_eq!(result["ipc_v"], 1);
    assert!(result["pid"].as_u64().is_some());
}

#[tokio::test]
async fn connection_reuse_serves_many_requests() {
    let daemon = spawn_daemon().await;
    let mut client = Client::connect(&daemon).await;
    for _ in 0..5 {
        let resp = client.op("ping", serde_json::json!({})).await;
        assert!(resp.ok);
    }
}

#[tokio::test]
async fn request_id_is_echoed() {
    let daemon = spawn_daemon().await;
    let mut client = Client::connect(&daemon).await;
    client
        .send_line(r#"{"op": "ping", "args": {}, "id": "req-7"}"#)
        .await;
    let line = client.read_line().await.unwrap();
    let v: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(v["id"], "req-7");
}

#[tokio::test]
async fn malformed_json_yields_invalid_request_and_keeps_connection() {
    let daemon = spawn_daemon().await;
    let mut client = Client::connect(&daemon).await;
    client.send_line("this is not json").await;
    let line = client.read_line().await.unwrap();
    let v: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"]["code"], "invalid_request");

    // The connection is still usable.
    let resp = client.op("ping", serde_json::json!({})).await;
    assert!(resp.ok);
}

#[tokio::test]
async fn errors_carry_canonical_codes() {
    let daemon = spawn_daemon().await;
    let resp = one_shot(
        &daemon,
        "group_show",
        serde_json::json!({"group_id": "g_ghost"}),
    )
    .await;
    assert!(!resp.ok);
    let err = resp.error.unwrap();
    assert_eq!(err.code, "group_not_found");
    assert!(err.message.contains("g_ghost"));
}

#[tokio::test]
async fn concurrent_clients_are_served() {
    let daemon = spawn_daemon().await;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let sock = daemon.sock_path.clone();
        handles.push(tokio::spawn(async move {
            let stream = tokio::net::UnixStream::connect(&sock).await.unwrap();
            let (read, mut write) = stream.into_split();
            use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
            write.write_all(b"{\"op\": \"ping\"}\n").await.unwrap();
            let mut line = String::new();
            BufReader::new(read).read_line(&mut line).await.unwrap();
            let v: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(v["ok"], true);
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
}
