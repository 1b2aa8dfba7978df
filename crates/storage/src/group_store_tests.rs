// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::home::Home;
use cccc_core::{ActorDef, GroupDoc, GroupId, GroupState};

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut doc = GroupDoc::new(GroupId::new("g_demo"), "demo", "2026-01-01T00:00:00.000Z");
    doc.actors.push(ActorDef::new("peer-a"));
    doc.state = GroupState::Idle;
    save_group(&home, &mut doc).unwrap();

    let back = load_group(&home, "g_demo").unwrap().unwrap();
    assert_eq!(back.title, "demo");
    assert_eq!(back.state, GroupState::Idle);
    assert_eq!(back.actors.len(), 1);
    assert!(!back.updated_at.is_empty());
}

#[test]
fn load_missing_group_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    assert!(load_group(&home, "g_absent").unwrap().is_none());
}

#[test]
fn unknown_yaml_fields_survive_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let path = home.group_yaml_path("g_demo");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        "group_id: g_demo\ntitle: demo\nfuture_knob: 42\n",
    )
    .unwrap();

    let mut doc = load_group(&home, "g_demo").unwrap().unwrap();
    assert!(doc.extra.contains_key("future_knob"));
    save_group(&home, &mut doc).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("future_knob"));
}

#[test]
fn delete_group_removes_tree() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut doc = GroupDoc::new(GroupId::new("g_demo"), "demo", "t");
    save_group(&home, &mut doc).unwrap();
    std::fs::create_dir_all(home.group_state_dir("g_demo")).unwrap();

    delete_group(&home, "g_demo").unwrap();
    assert!(!home.group_dir("g_demo").exists());
}

#[test]
fn list_group_ids_finds_only_groups_with_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut a = GroupDoc::new(GroupId::new("g_a"), "a", "t");
    save_group(&home, &mut a).unwrap();
    let mut b = GroupDoc::new(GroupId::new("g_b"), "b", "t");
    save_group(&home, &mut b).unwrap();
    std::fs::create_dir_all(home.group_dir("g_not_a_group")).unwrap();

    assert_eq!(list_group_ids(&home), vec!["g_a", "g_b"]);
}
