// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::Home;
use std::path::Path;

#[test]
fn paths_follow_the_home_layout() {
    let home = Home::at("/tmp/cccc-home");
    assert_eq!(home.root(), Path::new("/tmp/cccc-home"));
    assert_eq!(home.active_path(), Path::new("/tmp/cccc-home/active.json"));
    assert_eq!(
        home.addr_path(),
        Path::new("/tmp/cccc-home/daemon/ccccd.addr.json")
    );
    assert_eq!(home.sock_path(), Path::new("/tmp/cccc-home/daemon/ccccd.sock"));
    assert_eq!(home.lock_path(), Path::new("/tmp/cccc-home/daemon/ccccd.lock"));
    assert_eq!(
        home.group_yaml_path("g_x"),
        Path::new("/tmp/cccc-home/groups/g_x/group.yaml")
    );
    assert_eq!(
        home.ledger_path("g_x"),
        Path::new("/tmp/cccc-home/groups/g_x/ledger.jsonl")
    );
    assert_eq!(
        home.cursor_path("g_x", "peer-a"),
        Path::new("/tmp/cccc-home/groups/g_x/state/cursors/peer-a.json")
    );
    assert_eq!(
        home.runner_state_path("g_x", "pty", "peer-a"),
        Path::new("/tmp/cccc-home/groups/g_x/state/runners/pty/peer-a.json")
    );
    assert_eq!(
        home.profiles_path(),
        Path::new("/tmp/cccc-home/state/actor_profiles/profiles.json")
    );
    assert_eq!(
        home.profile_secrets_path("ap_1"),
        Path::new("/tmp/cccc-home/state/secrets/actor_profiles/ap_1.json")
    );
}
