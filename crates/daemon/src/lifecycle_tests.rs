// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cccc_core::{ActorDef, GroupDoc, GroupId};
use cccc_storage::{save_group, Home};

fn unix_config(home: Home) -> Config {
    Config {
        home,
        transport: Transport::Unix,
        host: "127.0.0.1".to_string(),
        port: 0,
        allow_remote: false,
    }
}

#[tokio::test]
async fn startup_binds_socket_and_writes_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let config = unix_config(Home::at(dir.path()));
    let startup = startup(&config).await.unwrap();

    assert!(config.home.sock_path().exists());
    assert_eq!(
        std::fs::read_to_string(config.home.pid_path()).unwrap().trim(),
        std::process::id().to_string()
    );

    let addr: AddrDoc =
        cccc_storage::read_json_opt(&config.home.addr_path()).unwrap().unwrap();
    assert_eq!(addr.v, 1);
    assert_eq!(addr.transport, "unix");
    assert_eq!(addr.pid, std::process::id());
    assert!(!addr.version.is_empty());
    assert!(!addr.ts.is_empty());

    cleanup_endpoint(&config.home);
    assert!(!config.home.sock_path().exists());
    assert!(!config.home.addr_path().exists());
    drop(startup);
}

#[tokio::test]
async fn second_daemon_fails_lock_while_first_lives() {
    let dir = tempfile::tempdir().unwrap();
    let config = unix_config(Home::at(dir.path()));
    let first = startup(&config).await.unwrap();

    let second = startup(&config).await;
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));

    // Releasing the first lock lets a new daemon in.
    drop(first);
    let third = startup(&config).await;
    assert!(third.is_ok());
}

#[tokio::test]
async fn tcp_transport_binds_loopback_and_records_port() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        home: Home::at(dir.path()),
        transport: Transport::Tcp,
        host: "127.0.0.1".to_string(),
        port: 0,
        allow_remote: false,
    };
    let started = startup(&config).await.unwrap();
    assert_eq!(started.addr.transport, "tcp");
    assert!(started.addr.port > 0);
    assert!(matches!(started.listener, BoundListener::Tcp(_)));
}

#[tokio::test]
async fn non_loopback_bind_is_refused_without_allow_remote() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        home: Home::at(dir.path()),
        transport: Transport::Tcp,
        host: "0.0.0.0".to_string(),
        port: 0,
        allow_remote: false,
    };
    assert!(matches!(
        startup(&config).await,
        Err(LifecycleError::RemoteBindRefused(_))
    ));
}

#[test]
fn autostart_selects_running_groups_with_enabled_actors() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());

    let mut running = GroupDoc::new(GroupId::new("g_run"), "running", "t");
    running.running = true;
    running.actors.push(ActorDef::new("peer-a"));
    save_group(&home, &mut running).unwrap();

    let mut stopped = GroupDoc::new(GroupId::new("g_stop"), "stopped", "t");
    stopped.actors.push(ActorDef::new("peer-a"));
    save_group(&home, &mut stopped).unwrap();

    let mut empty = GroupDoc::new(GroupId::new("g_empty"), "no actors", "t");
    empty.running = true;
    save_group(&home, &mut empty).unwrap();

    assert_eq!(groups_to_autostart(&home), vec!["g_run"]);
}

#[test]
fn stale_runner_state_is_swept() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut group = GroupDoc::new(GroupId::new("g_x"), "g", "t");
    save_group(&home, &mut group).unwrap();

    // Dead pid: definitely stale on any platform.
    cccc_storage::write_pty_state(&home, "g_x", "peer-a", u32::MAX - 1, "cccc-x-peer-a").unwrap();
    cccc_storage::write_headless_state(&home, "g_x", "peer-b", "running", "").unwrap();

    cleanup_stale_runner_state(&home);
    assert!(cccc_storage::read_pty_state(&home, "g_x", "peer-a").is_none());
    assert!(cccc_storage::read_headless_state(&home, "g_x", "peer-b").is_none());
}
