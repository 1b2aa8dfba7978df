// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
    count: u32,
}

#[test]
fn json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/dir/doc.json");
    let doc = Doc {
        name: "x".to_string(),
        count: 3,
    };
    atomic_write_json(&path, &doc).unwrap();
    let back: Option<Doc> = read_json_opt(&path).unwrap();
    assert_eq!(back, Some(doc));
}

#[test]
fn yaml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.yaml");
    let mut doc = BTreeMap::new();
    doc.insert("key".to_string(), "value".to_string());
    atomic_write_yaml(&path, &doc).unwrap();
    let back: Option<BTreeMap<String, String>> = read_yaml_opt(&path).unwrap();
    assert_eq!(back, Some(doc));
}

#[test]
fn missing_file_reads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let back: Option<Doc> = read_json_opt(&dir.path().join("absent.json")).unwrap();
    assert!(back.is_none());
}

fn quarantine_files(dir: &std::path::Path, stem: &str) -> Vec<String> {
    let prefix = format!("{stem}.corrupt.");
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(&prefix))
        .collect();
    names.sort();
    names
}

#[test]
fn corrupt_json_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, b"{not json").unwrap();
    let back: Option<Doc> = read_json_opt(&path).unwrap();
    assert!(back.is_none());
    assert!(!path.exists());
    let quarantined = quarantine_files(dir.path(), "doc.json");
    assert_eq!(quarantined.len(), 1);
    // The damaged bytes survive for forensics.
    let moved = std::fs::read(dir.path().join(&quarantined[0])).unwrap();
    assert_eq!(moved, b"{not json");
}

#[test]
fn quarantine_keeps_only_the_newest_three() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    for i in 0..5 {
        std::fs::write(&path, format!("corrupt-{i}")).unwrap();
        let _: Option<Doc> = read_json_opt(&path).unwrap();
    }
    let quarantined = quarantine_files(dir.path(), "doc.json");
    assert_eq!(quarantined.len(), 3);
    // Newest survives the pruning.
    let newest = std::fs::read(dir.path().join(quarantined.last().unwrap())).unwrap();
    assert_eq!(newest, b"corrupt-4");
}

#[test]
fn quarantine_never_touches_unrelated_siblings() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("other.json"), b"{}").unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, b"broken").unwrap();
    let _: Option<Doc> = read_json_opt(&path).unwrap();
    assert!(dir.path().join("other.json").exists());
}

#[test]
fn rewrite_replaces_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    atomic_write_json(&path, &Doc { name: "a".to_string(), count: 1 }).unwrap();
    atomic_write_json(&path, &Doc { name: "b".to_string(), count: 2 }).unwrap();
    let back: Option<Doc> = read_json_opt(&path).unwrap();
    assert_eq!(back.unwrap().name, "b");
    // No temp file left behind
    assert!(!dir.path().join("doc.json.tmp").exists());
}

#[test]
fn truncated_write_never_corrupts_previous_content() {
    // Loader property: any file is either the old doc, the new doc, or
    // quarantined — a temp file mid-write never shadows the target.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    atomic_write_json(&path, &Doc { name: "old".to_string(), count: 1 }).unwrap();
    // Simulate a crash mid-write: partial temp file exists, no rename.
    std::fs::write(dir.path().join("doc.json.tmp"), b"{\"name\": \"ne").unwrap();
    let back: Option<Doc> = read_json_opt(&path).unwrap();
    assert_eq!(back.unwrap().name, "old");
}
