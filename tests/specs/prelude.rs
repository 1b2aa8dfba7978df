// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: an in-process daemon listening on a temp Unix socket.

use cccc_daemon::{BoundListener, DaemonCtx, Listener, Response};
use cccc_engine::{AutomationManager, Broadcaster, DeliveryPipeline};
use cccc_runner::{HeadlessSupervisor, PtySupervisor, TmuxAdapter};
use cccc_storage::{Home, LedgerService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::Notify;

pub struct SpecDaemon {
    pub home: Home,
    pub sock_path: PathBuf,
    _dir: tempfile::TempDir,
}

/// Bind a full daemon (real services, tmux adapter left untouched by
/// headless-only scenarios) on a fresh home + socket.
pub async fn spawn_daemon() -> SpecDaemon {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    std::fs::create_dir_all(home.daemon_dir()).unwrap();
    let sock_path = home.sock_path();

    let ledger = LedgerService::new();
    let pty = PtySupervisor::new(TmuxAdapter::new(), home.clone(), 1 << 20);
    let headless = HeadlessSupervisor::new();
    let delivery = DeliveryPipeline::new(home.clone(), ledger.clone(), pty.clone());
    let automation = Arc::new(AutomationManager::new(
        home.clone(),
        ledger.clone(),
        pty.clone(),
        headless.clone(),
        delivery.clone(),
    ));
    let broadcaster = Broadcaster::new();
    let ctx = Arc::new(DaemonCtx::new(
        home.clone(),
        ledger.clone(),
        pty,
        headless,
        delivery,
        automation,
        broadcaster.clone(),
        Arc::new(Notify::new()),
    ));
    {
        let broadcaster = broadcaster.clone();
        let hook_home = home.clone();
        ledger.set_append_hook(Arc::new(move |event| {
            if let Ok(Some(group)) = cccc_storage::load_group(&hook_home, event.group_id.as_str()) {
                broadcaster.publish(&group, event);
            }
        }));
    }

    let listener = tokio::net::UnixListener::bind(&sock_path).unwrap();
    tokio::spawn(Listener::new(BoundListener::Unix(listener), ctx).run());

    SpecDaemon {
        home,
        sock_path,
        _dir: dir,
    }
}

/// One client connection speaking line-delimited JSON.
pub struct Client {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl Client {
    pub async fn connect(daemon: &SpecDaemon) -> Self {
        let stream = UnixStream::connect(&daemon.sock_path).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    pub async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            self.reader.read_line(&mut line),
        )
        .await
        .ok()?
        .ok()?;
        if read == 0 {
            None
        } else {
            Some(line.trim_end().to_string())
        }
    }

    /// Request/response round trip.
    pub async fn op(&mut self, op: &str, args: serde_json::Value) -> Response {
        let req = serde_json::json!({"op": op, "args": args});
        self.send_line(&req.to_string()).await;
        let line = self.read_line().await.expect("response line");
        serde_json::from_str(&line).expect("valid response json")
    }

    pub async fn ok(&mut self, op: &str, args: serde_json::Value) -> serde_json::Value {
        let resp = self.op(op, args).await;
        assert!(
            resp.ok,
            "op {op} failed: {:?}",
            resp.error.map(|e| format!("{}: {}", e.code, e.message))
        );
        resp.result.unwrap_or(serde_json::Value::Null)
    }
}

/// Convenience: one-shot op on a fresh connection.
pub async fn one_shot(daemon: &SpecDaemon, op: &str, args: serde_json::Value) -> Response {
    let mut client = Client::connect(daemon).await;
    client.op(op, args).await
}
