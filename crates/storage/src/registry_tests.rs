// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::group_store::save_group;
use crate::home::Home;
use cccc_core::{GroupDoc, GroupId};

fn make_group(home: &Home, gid: &str, title: &str) {
    let mut doc = GroupDoc::new(GroupId::new(gid), title, "2026-01-01T00:00:00.000Z");
    save_group(home, &mut doc).unwrap();
}

#[test]
fn empty_registry_loads_default() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let reg = load_registry(&home).unwrap();
    assert!(reg.groups.is_empty());
    assert!(reg.defaults.is_empty());
    assert_eq!(reg.v, 1);
}

#[test]
fn register_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut reg = load_registry(&home).unwrap();
    reg.register_group("g_a", "alpha");
    reg.defaults.insert("fs:/tmp/p".to_string(), "g_a".to_string());
    reg.save(&home).unwrap();

    let back = load_registry(&home).unwrap();
    assert_eq!(back.groups.get("g_a").unwrap().title, "alpha");
    assert_eq!(back.default_group_for_scope("fs:/tmp/p"), Some("g_a"));
}

#[test]
fn remove_group_purges_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut reg = load_registry(&home).unwrap();
    reg.register_group("g_a", "alpha");
    reg.defaults.insert("fs:/x".to_string(), "g_a".to_string());
    reg.remove_group("g_a");
    assert!(reg.groups.is_empty());
    assert!(reg.defaults.is_empty());
}

#[test]
fn reconcile_reports_missing_and_adopts() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut reg = load_registry(&home).unwrap();
    reg.register_group("g_gone", "ghost");
    reg.save(&home).unwrap();
    make_group(&home, "g_disk", "on disk only");

    let report = reconcile_registry(&home, false).unwrap();
    assert_eq!(report.missing, vec!["g_gone"]);
    assert_eq!(report.adopted, vec!["g_disk"]);
    assert!(report.removed.is_empty());

    // Entry is still registered without remove_missing.
    let reg = load_registry(&home).unwrap();
    assert!(reg.groups.contains_key("g_gone"));
    assert!(reg.groups.contains_key("g_disk"));
}

#[test]
fn reconcile_remove_missing_purges() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut reg = load_registry(&home).unwrap();
    reg.register_group("g_gone", "ghost");
    reg.defaults.insert("fs:/x".to_string(), "g_gone".to_string());
    reg.save(&home).unwrap();

    let report = reconcile_registry(&home, true).unwrap();
    assert_eq!(report.removed, vec!["g_gone"]);

    let reg = load_registry(&home).unwrap();
    assert!(!reg.groups.contains_key("g_gone"));
    assert!(reg.defaults.is_empty());
}

#[test]
fn reconcile_flags_corrupt_group_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut reg = load_registry(&home).unwrap();
    reg.register_group("g_bad", "bad");
    reg.save(&home).unwrap();
    let path = home.group_yaml_path("g_bad");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{{{{ not yaml").unwrap();

    let report = reconcile_registry(&home, false).unwrap();
    assert_eq!(report.corrupt, vec!["g_bad"]);
}
