// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::home::Home;
use cccc_core::{GroupDoc, GroupId};

fn setup(dir: &std::path::Path) -> (Home, GroupDoc) {
    let home = Home::at(dir);
    let group = GroupDoc::new(GroupId::new("g_demo"), "demo", "t");
    std::fs::create_dir_all(home.blobs_dir("g_demo")).unwrap();
    (home, group)
}

#[test]
fn normalize_resolves_existing_blob() {
    let dir = tempfile::tempdir().unwrap();
    let (home, group) = setup(dir.path());
    std::fs::write(home.blobs_dir("g_demo").join("abc_report.md"), b"hello").unwrap();

    let raw = serde_json::json!([{"path": "abc_report.md", "title": "Report"}]);
    let out = normalize_attachments(&home, &group, Some(&raw)).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "Report");
    assert_eq!(out[0].bytes, 5);
}

#[test]
fn missing_blob_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (home, group) = setup(dir.path());
    let raw = serde_json::json!([{"path": "nope.md"}]);
    let err = normalize_attachments(&home, &group, Some(&raw)).unwrap_err();
    assert!(matches!(err, BlobError::NotFound(_)));
}

#[yare::parameterized(
    absolute  = { "/etc/passwd" },
    traversal = { "../../group.yaml" },
    sneaky    = { "ok/../../x" },
)]
fn path_escapes_are_rejected(path: &str) {
    let dir = tempfile::tempdir().unwrap();
    let (home, group) = setup(dir.path());
    let raw = serde_json::json!([{"path": path}]);
    let err = normalize_attachments(&home, &group, Some(&raw)).unwrap_err();
    assert!(matches!(err, BlobError::InvalidPath(_)));
}

#[test]
fn none_and_null_mean_no_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let (home, group) = setup(dir.path());
    assert!(normalize_attachments(&home, &group, None).unwrap().is_empty());
    let null = serde_json::Value::Null;
    assert!(normalize_attachments(&home, &group, Some(&null)).unwrap().is_empty());
}

#[test]
fn non_list_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (home, group) = setup(dir.path());
    let raw = serde_json::json!({"path": "x"});
    assert!(matches!(
        normalize_attachments(&home, &group, Some(&raw)).unwrap_err(),
        BlobError::NotAList
    ));
}
