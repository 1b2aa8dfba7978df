// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::home::Home;
use cccc_core::{ActorProfile, ProfileId};

#[test]
fn upsert_new_profile_starts_at_revision_one() {
    let mut doc = ProfilesDoc::default();
    let p = ActorProfile::new(ProfileId::new("ap_1"), "codex default", "2026-01-01T00:00:00Z");
    let rev = doc.upsert(p);
    assert_eq!(rev, 1);
    assert_eq!(doc.get("ap_1").unwrap().revision, 1);
}

#[test]
fn upsert_existing_bumps_revision() {
    let mut doc = ProfilesDoc::default();
    let p = ActorProfile::new(ProfileId::new("ap_1"), "v1", "2026-01-01T00:00:00Z");
    doc.upsert(p.clone());
    let mut p2 = p;
    p2.name = "v2".to_string();
    let rev = doc.upsert(p2);
    assert_eq!(rev, 2);
    let stored = doc.get("ap_1").unwrap();
    assert_eq!(stored.name, "v2");
    assert_eq!(stored.revision, 2);
    // created_at survives the upsert.
    assert_eq!(stored.created_at, "2026-01-01T00:00:00Z");
}

#[test]
fn save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let mut doc = load_profiles(&home).unwrap();
    doc.upsert(ActorProfile::new(ProfileId::new("ap_1"), "p", "2026-01-01T00:00:00Z"));
    save_profiles(&home, &mut doc).unwrap();

    let back = load_profiles(&home).unwrap();
    assert!(back.get("ap_1").is_some());
    assert!(!back.updated_at.is_empty());
}

#[test]
fn remove_returns_profile() {
    let mut doc = ProfilesDoc::default();
    doc.upsert(ActorProfile::new(ProfileId::new("ap_1"), "p", "t"));
    assert!(doc.remove("ap_1").is_some());
    assert!(doc.remove("ap_1").is_none());
}
