// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn define_id_new_and_as_str() {
    let id = ActorId::new("peer-a");
    assert_eq!(id.as_str(), "peer-a");
    assert_eq!(id.to_string(), "peer-a");
}

#[test]
fn define_id_partial_eq_str() {
    let id = GroupId::new("g_abc");
    assert_eq!(id, "g_abc");
    assert_eq!(id, *"g_abc");
}

#[test]
fn define_id_hash_map_lookup() {
    let mut map = HashMap::new();
    map.insert(ActorId::new("k"), 42);
    assert_eq!(map.get("k"), Some(&42));
}

#[test]
fn define_id_short_truncates() {
    let id = EventId::new("ev_0123456789");
    assert_eq!(id.short(5), "ev_01");
    assert_eq!(id.short(100), "ev_0123456789");
}

#[test]
fn group_id_generate_has_prefix() {
    let id = GroupId::generate();
    assert!(id.as_str().starts_with("g_"));
    assert_eq!(id.as_str().len(), 14);
}

#[test]
fn profile_id_generate_has_prefix() {
    let id = ProfileId::generate();
    assert!(id.as_str().starts_with("ap_"));
}

#[test]
fn generated_ids_are_unique() {
    let a = GroupId::generate();
    let b = GroupId::generate();
    assert_ne!(a, b);
}

#[test]
fn actor_id_user_detection() {
    assert!(ActorId::new("user").is_user());
    assert!(!ActorId::new("peer-a").is_user());
}

#[test]
fn event_id_ordering_is_lexical() {
    let a = EventId::new("ev_0001");
    let b = EventId::new("ev_0002");
    assert!(a < b);
}
