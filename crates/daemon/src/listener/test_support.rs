// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixtures for listener/dispatch tests.

use super::DaemonCtx;
use crate::protocol::{Request, Response};
use cccc_engine::{AutomationManager, Broadcaster, DeliveryPipeline};
use cccc_runner::{FakeSessionAdapter, HeadlessSupervisor, PtySupervisor};
use cccc_storage::{Home, LedgerService};
use std::sync::Arc;
use tokio::sync::Notify;

pub(crate) struct TestDaemon {
    pub ctx: Arc<DaemonCtx<FakeSessionAdapter>>,
    pub adapter: FakeSessionAdapter,
    pub home: Home,
    _dir: tempfile::TempDir,
}

pub(crate) fn test_daemon() -> TestDaemon {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let ledger = LedgerService::new();
    let adapter = FakeSessionAdapter::new();
    let pty = PtySupervisor::new(adapter.clone(), home.clone(), 1 << 20);
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
    // Tests observe streaming through the broadcaster like the binary does.
    {
        let broadcaster = broadcaster.clone();
        let home = home.clone();
        ledger.set_append_hook(Arc::new(move |event| {
            if let Ok(Some(group)) = cccc_storage::load_group(&home, event.group_id.as_str()) {
                broadcaster.publish(&group, event);
            }
        }));
    }
    TestDaemon {
        ctx,
        adapter,
        home,
        _dir: dir,
    }
}

impl TestDaemon {
    /// Run one op through the full dispatcher.
    pub(crate) async fn op(&self, op: &str, args: serde_json::Value) -> Response {
        let request = Request {
            op: op.to_string(),
            args,
            id: None,
        };
        match super::dispatch(&self.ctx, request).await {
            super::DispatchOutcome::Reply(resp) => resp,
            super::DispatchOutcome::ReplyThenExit(resp) => resp,
            super::DispatchOutcome::Stream(_) => Response::ok(serde_json::json!({"streaming": true})),
        }
    }

    /// Op that must succeed; returns its result payload.
    pub(crate) async fn ok(&self, op: &str, args: serde_json::Value) -> serde_json::Value {
        let resp = self.op(op, args).await;
        assert!(
            resp.ok,
            "op {op} failed: {:?}",
            resp.error.map(|e| format!("{}: {}", e.code, e.message))
        );
        resp.result.unwrap_or(serde_json::Value::Null)
    }

    /// Op that must fail; returns the error code.
    pub(crate) async fn err(&self, op: &str, args: serde_json::Value) -> String {
        let resp = self.op(op, args).await;
        assert!(!resp.ok, "op {op} unexpectedly succeeded");
        resp.error.map(|e| e.code).unwrap_or_default()
    }

    /// Create a group and return its id.
    pub(crate) async fn make_group(&self, title: &str) -> String {
        let result = self
            .ok("group_create", serde_json::json!({"title": title, "by": "user"}))
            .await;
        result["group_id"].as_str().unwrap_or("").to_string()
    }

    /// Add a headless actor (no live terminal needed in tests).
    pub(crate) async fn add_headless_actor(&self, gid: &str, actor_id: &str) {
        self.ok(
            "actor_add",
            serde_json::json!({
                "group_id": gid,
                "actor_id": actor_id,
                "runtime": "codex",
                "runner": "headless",
                "by": "user",
            }),
        )
        .await;
    }

    pub(crate) fn ledger_events(&self, gid: &str) -> Vec<cccc_core::LedgerEvent> {
        cccc_storage::iter_events(&self.home.ledger_path(gid)).collect()
    }
}
