// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, endpoint binding, shutdown, recovery.

use crate::protocol::DAEMON_VERSION;
use cccc_core::utc_now_iso;
use cccc_storage::{atomic_write_json, Home};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

/// Daemon configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub home: Home,
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub allow_remote: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Unix,
    Tcp,
}

impl Config {
    /// Resolve from `CCCC_HOME` and `CCCC_DAEMON_*` env vars.
    pub fn load() -> Result<Self, LifecycleError> {
        let home = Home::resolve();
        let transport = match std::env::var("CCCC_DAEMON_TRANSPORT")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str()
        {
            "tcp" => Transport::Tcp,
            "unix" => Transport::Unix,
            _ => {
                if cfg!(unix) {
                    Transport::Unix
                } else {
                    Transport::Tcp
                }
            }
        };
        let host = std::env::var("CCCC_DAEMON_HOST")
            .ok()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = std::env::var("CCCC_DAEMON_PORT")
            .ok()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0);
        let allow_remote = std::env::var("CCCC_DAEMON_ALLOW_REMOTE")
            .map(|v| v.trim() == "1")
            .unwrap_or(false);
        Ok(Self {
            home,
            transport,
            host,
            port,
            allow_remote,
        })
    }
}

/// Endpoint descriptor persisted to `daemon/ccccd.addr.json` so clients
/// discover the daemon cross-platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddrDoc {
    pub v: u32,
    pub transport: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub pid: u32,
    pub version: String,
    pub ts: String,
}

/// The bound server socket, either flavour.
pub enum BoundListener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("refusing non-loopback bind {0} without CCCC_DAEMON_ALLOW_REMOTE=1")]
    RemoteBindRefused(String),
    #[error("failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] cccc_storage::StorageError),
}

/// Result of acquiring the daemon singleton: the held lock plus listener.
pub struct StartupResult {
    /// Held for the life of the process to maintain the exclusive lock.
    pub lock_file: File,
    pub listener: BoundListener,
    pub addr: AddrDoc,
}

/// Acquire the singleton lock, bind the endpoint, write pid/addr files.
///
/// A `LockFailed` error means another daemon owns this home; the caller
/// exits with code 0 in that case.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(config.home.daemon_dir())?;

    // Lock FIRST so nothing below races another daemon. Opened without
    // truncate: the file may carry the live daemon's pid.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(config.home.lock_path())?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    let (listener, addr) = bind_endpoint(config).await?;

    std::fs::write(config.home.pid_path(), format!("{}\n", std::process::id()))?;
    atomic_write_json(&config.home.addr_path(), &addr)?;

    info!(transport = %addr.transport, "daemon endpoint bound");
    Ok(StartupResult {
        lock_file,
        listener,
        addr,
    })
}

async fn bind_endpoint(config: &Config) -> Result<(BoundListener, AddrDoc), LifecycleError> {
    let now = utc_now_iso();
    match config.transport {
        Transport::Unix => {
            let sock_path = config.home.sock_path();
            if sock_path.exists() {
                std::fs::remove_file(&sock_path)?;
            }
            let listener = UnixListener::bind(&sock_path)
                .map_err(|e| LifecycleError::BindFailed(sock_path.display().to_string(), e))?;
            restrict_socket_permissions(&sock_path);
            let addr = AddrDoc {
                v: 1,
                transport: "unix".to_string(),
                path: sock_path.display().to_string(),
                host: String::new(),
                port: 0,
                pid: std::process::id(),
                version: DAEMON_VERSION.to_string(),
                ts: now,
            };
            Ok((BoundListener::Unix(listener), addr))
        }
        Transport::Tcp => {
            if !config.allow_remote && !is_loopback_host(&config.host) {
                return Err(LifecycleError::RemoteBindRefused(config.host.clone()));
            }
            let bind_to = format!("{}:{}", config.host, config.port);
            let listener = TcpListener::bind(&bind_to)
                .await
                .map_err(|e| LifecycleError::BindFailed(bind_to.clone(), e))?;
            let local = listener.local_addr()?;
            let addr = AddrDoc {
                v: 1,
                transport: "tcp".to_string(),
                path: String::new(),
                host: local.ip().to_string(),
                port: local.port(),
                pid: std::process::id(),
                version: DAEMON_VERSION.to_string(),
                ts: now,
            };
            Ok((BoundListener::Tcp(listener), addr))
        }
    }
}

fn is_loopback_host(host: &str) -> bool {
    match host {
        "localhost" => true,
        other => other
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
    }
}

#[cfg(unix)]
fn restrict_socket_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700));
}

#[cfg(not(unix))]
fn restrict_socket_permissions(_path: &std::path::Path) {}

/// Remove endpoint files on shutdown; the lock releases when the held
/// file handle drops.
pub fn cleanup_endpoint(home: &Home) {
    for path in [home.sock_path(), home.addr_path(), home.pid_path()] {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove endpoint file");
            }
        }
    }
}

/// Group ids with `running=true` and at least one enabled actor; these are
/// re-launched at daemon start.
pub fn groups_to_autostart(home: &Home) -> Vec<String> {
    let mut out = Vec::new();
    for gid in cccc_storage::list_group_ids(home) {
        if let Ok(Some(group)) = cccc_storage::load_group(home, &gid) {
            if group.running && group.enabled_actors().next().is_some() {
                out.push(gid);
            }
        }
    }
    out
}

/// Stale runner state left by a dead daemon: best-effort cleanup of pty
/// state files whose pid is gone.
pub fn cleanup_stale_runner_state(home: &Home) {
    for gid in cccc_storage::list_group_ids(home) {
        let dir = home.runner_state_dir(&gid, "pty");
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let doc: Option<cccc_storage::PtyState> =
                cccc_storage::read_json_opt(&path).ok().flatten();
            let stale = match doc {
                Some(state) => state.pid == 0 || !pid_alive(state.pid),
                None => true,
            };
            if stale {
                let _ = std::fs::remove_file(&path);
            }
        }
        // Headless runners never own a process; their state never
        // survives a daemon restart.
        let dir = home.runner_state_dir(&gid, "headless");
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
}

// Liveness via procfs; platforms without it treat every recorded pid as
// stale, which only costs a state-file rewrite on the next actor start.
#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
