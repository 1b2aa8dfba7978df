// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CCCC Daemon (ccccd)
//!
//! Background process owning the group registry, ledgers, runners,
//! delivery, and automation for one `CCCC_HOME`.
//!
//! Architecture:
//! - Listener task: accepts socket connections, one task per client
//! - Ticker task: 1 Hz automation + delivery, 60 s ledger compaction
//! - Runner poll tasks: per PTY session transcript capture

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;
mod listener;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use cccc_engine::{AutomationManager, Broadcaster, DeliveryPipeline};
use cccc_runner::{HeadlessSupervisor, PtySupervisor, TmuxAdapter};
use cccc_storage::{LedgerService, load_settings};
use lifecycle::{Config, LifecycleError};
use listener::{DaemonCtx, Listener};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("ccccd {}", protocol::DAEMON_VERSION);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("ccccd {}", protocol::DAEMON_VERSION);
                println!("CCCC daemon - multi-agent collaboration supervisor");
                println!();
                println!("USAGE:");
                println!("    ccccd");
                println!();
                println!("The daemon is typically started by the `cccc` CLI and should not");
                println!("be invoked directly. It listens on a Unix socket (or TCP with");
                println!("CCCC_DAEMON_TRANSPORT=tcp) for line-delimited JSON requests.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: ccccd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    rotate_log_if_needed(&config.home.log_path());
    let log_guard = setup_logging(&config)?;
    info!("starting ccccd");

    let startup = match lifecycle::startup(&config).await {
        Ok(s) => s,
        Err(LifecycleError::LockFailed(_)) => {
            // Another daemon owns this home; that is success, not failure.
            let pid = std::fs::read_to_string(config.home.pid_path())
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("ccccd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            return Ok(());
        }
        Err(e) => {
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    // Stale state from a previous daemon instance.
    lifecycle::cleanup_stale_runner_state(&config.home);

    // Assemble services.
    let settings = load_settings(&config.home).unwrap_or_default();
    let backlog_bytes = settings.observability.pty_backlog_bytes() as usize;
    let ledger = LedgerService::new();
    let pty = PtySupervisor::new(TmuxAdapter::new(), config.home.clone(), backlog_bytes);
    let headless = HeadlessSupervisor::new();
    let delivery = DeliveryPipeline::new(config.home.clone(), ledger.clone(), pty.clone());
    let automation = Arc::new(AutomationManager::new(
        config.home.clone(),
        ledger.clone(),
        pty.clone(),
        headless.clone(),
        delivery.clone(),
    ));
    let broadcaster = Broadcaster::new();
    let shutdown_notify = Arc::new(Notify::new());

    let ctx = Arc::new(DaemonCtx::new(
        config.home.clone(),
        ledger.clone(),
        pty,
        headless,
        delivery,
        Arc::clone(&automation),
        broadcaster.clone(),
        Arc::clone(&shutdown_notify),
    ));

    // Ledger appends fan out to live subscribers synchronously.
    {
        let broadcaster = broadcaster.clone();
        let home = config.home.clone();
        ledger.set_append_hook(Arc::new(move |event| {
            // Roster lookup only pays off when someone is listening.
            if broadcaster.subscriber_count(event.group_id.as_str()) == 0 {
                return;
            }
            if let Ok(Some(group)) = cccc_storage::load_group(&home, event.group_id.as_str()) {
                broadcaster.publish(&group, event);
            }
        }));
    }

    // Rule actions route back through the op dispatcher.
    {
        let ctx = Arc::clone(&ctx);
        automation.set_op_invoker(Arc::new(move |op, args| {
            let ctx = Arc::clone(&ctx);
            let op = op.to_string();
            Box::pin(async move {
                let request = protocol::Request {
                    op,
                    args,
                    id: None,
                };
                match listener::dispatch(&ctx, request).await {
                    listener::DispatchOutcome::Reply(resp)
                    | listener::DispatchOutcome::ReplyThenExit(resp) => {
                        if resp.ok {
                            Ok(resp.result.unwrap_or(serde_json::Value::Null))
                        } else {
                            Err(resp
                                .error
                                .map(|e| e.message)
                                .unwrap_or_else(|| "op failed".to_string()))
                        }
                    }
                    listener::DispatchOutcome::Stream(_) => {
                        Err("stream ops are not invocable from automation".to_string())
                    }
                }
            })
        }));
    }

    // Spawn listener task
    let listener_task = Listener::new(startup.listener, Arc::clone(&ctx));
    tokio::spawn(listener_task.run());

    // Re-launch groups that were running when the last daemon stopped.
    spawn_autostart(Arc::clone(&ctx));

    // 1 Hz automation + delivery ticker, compaction every 60 s.
    spawn_ticker(Arc::clone(&ctx));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(transport = %startup.addr.transport, "daemon ready");
    println!("READY");

    tokio::select! {
        _ = shutdown_notify.notified() => {
            info!("shutdown requested via command");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down...");
        }
    }

    // Graceful teardown: runners first, then endpoint files; the lock
    // releases when the held handle drops at exit.
    ctx.pty.stop_all().await;
    ctx.headless.stop_all(&config.home);
    lifecycle::cleanup_endpoint(&config.home);
    drop(startup.lock_file);
    info!("daemon stopped");
    Ok(())
}

/// Re-launch every group persisted as running. Deferred to a background
/// task so the daemon accepts connections immediately.
fn spawn_autostart(ctx: Arc<DaemonCtx<TmuxAdapter>>) {
    tokio::spawn(async move {
        let gids = lifecycle::groups_to_autostart(&ctx.home);
        if gids.is_empty() {
            return;
        }
        info!("autostarting {} running group(s)", gids.len());
        for gid in gids {
            let request = protocol::Request {
                op: "group_start".to_string(),
                args: serde_json::json!({"group_id": gid, "by": "user"}),
                id: None,
            };
            if let listener::DispatchOutcome::Reply(resp) = listener::dispatch(&ctx, request).await
            {
                if !resp.ok {
                    warn!(
                        gid,
                        error = resp.error.map(|e| e.message).unwrap_or_default(),
                        "group autostart failed"
                    );
                }
            }
        }
    });
}

/// Ticker interval for automation + delivery.
const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Opportunistic ledger compaction cadence.
const COMPACT_INTERVAL: Duration = Duration::from_secs(60);

fn spawn_ticker(ctx: Arc<DaemonCtx<TmuxAdapter>>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_compact = std::time::Instant::now();
        loop {
            tick.tick().await;

            ctx.automation.tick().await;

            for gid in cccc_storage::list_group_ids(&ctx.home) {
                let Ok(Some(group)) = cccc_storage::load_group(&ctx.home, &gid) else {
                    continue;
                };
                if !group.running {
                    continue;
                }
                ctx.delivery.tick_delivery(&group).await;
            }

            if last_compact.elapsed() >= COMPACT_INTERVAL {
                last_compact = std::time::Instant::now();
                for gid in cccc_storage::list_group_ids(&ctx.home) {
                    let Ok(Some(group)) = cccc_storage::load_group(&ctx.home, &gid) else {
                        continue;
                    };
                    let _lock = ctx.group_lock(&gid).lock_owned().await;
                    if let Err(e) = cccc_storage::compact_ledger(
                        &ctx.home,
                        &group,
                        cccc_storage::CompactOptions::default(),
                    ) {
                        warn!(gid, error = %e, "ledger compaction failed");
                    }
                }
            }
        }
    });
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (ccccd.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `ccccd.log` → `ccccd.log.1` → `ccccd.log.2` → `ccccd.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently
/// ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }
    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.home.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_appender = tracing_appender::rolling::never(
        log_path.parent().unwrap_or_else(|| std::path::Path::new(".")),
        log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("ccccd.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = load_settings(&config.home)
        .map(|s| s.observability.log_level)
        .unwrap_or_else(|_| "info".to_string());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
