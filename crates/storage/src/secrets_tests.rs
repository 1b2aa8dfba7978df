// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::home::Home;
use std::collections::BTreeMap;

fn pair(k: &str, v: &str) -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert(k.to_string(), v.to_string());
    m
}

#[yare::parameterized(
    simple     = { "API_KEY" },
    underscore = { "_TOKEN" },
    digits     = { "KEY2" },
    lower      = { "aws_secret" },
)]
fn valid_keys(key: &str) {
    assert_eq!(validate_env_key(key).unwrap(), key);
}

#[yare::parameterized(
    empty     = { "" },
    dash      = { "BAD-KEY" },
    leading_digit = { "1KEY" },
    space     = { "A KEY" },
    dot       = { "A.KEY" },
)]
fn invalid_keys(key: &str) {
    assert!(validate_env_key(key).is_err());
}

#[test]
fn mask_short_values_fully() {
    assert_eq!(mask_secret_value("abc"), "******");
    assert_eq!(mask_secret_value("abcdef"), "******");
}

#[test]
fn mask_long_values_keep_edges() {
    assert_eq!(mask_secret_value("sk-12345678"), "sk******78");
}

#[test]
fn update_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    update_actor_private_env(&home, "g_x", "peer-a", &pair("TOKEN", "secret"), &[], false).unwrap();
    let env = load_actor_private_env(&home, "g_x", "peer-a").unwrap();
    assert_eq!(env.get("TOKEN").map(String::as_str), Some("secret"));
}

#[test]
fn unset_removes_key() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    update_actor_private_env(&home, "g_x", "peer-a", &pair("A", "1"), &[], false).unwrap();
    update_actor_private_env(&home, "g_x", "peer-a", &pair("B", "2"), &["A".to_string()], false)
        .unwrap();
    let env = load_actor_private_env(&home, "g_x", "peer-a").unwrap();
    assert!(!env.contains_key("A"));
    assert!(env.contains_key("B"));
}

#[test]
fn clear_drops_everything_and_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    update_actor_private_env(&home, "g_x", "peer-a", &pair("A", "1"), &[], false).unwrap();
    let out =
        update_actor_private_env(&home, "g_x", "peer-a", &BTreeMap::new(), &[], true).unwrap();
    assert!(out.is_empty());
    assert!(load_actor_private_env(&home, "g_x", "peer-a").unwrap().is_empty());
}

#[test]
fn invalid_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let err =
        update_actor_private_env(&home, "g_x", "peer-a", &pair("BAD-KEY", "x"), &[], false)
            .unwrap_err();
    assert!(matches!(err, SecretsError::InvalidKey(_)));
}

#[test]
fn oversized_value_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    let big = "x".repeat(200_001);
    let err = update_actor_private_env(&home, "g_x", "peer-a", &pair("K", &big), &[], false)
        .unwrap_err();
    assert!(matches!(err, SecretsError::ValueTooLarge));
}

#[cfg(unix)]
#[test]
fn secret_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    update_actor_private_env(&home, "g_x", "peer-a", &pair("TOKEN", "secret"), &[], false).unwrap();
    let dir_path = home.actor_secrets_dir("g_x");
    let entry = std::fs::read_dir(&dir_path).unwrap().next().unwrap().unwrap();
    let mode = entry.metadata().unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn masked_env_masks_every_value() {
    let mut env = BTreeMap::new();
    env.insert("A".to_string(), "short".to_string());
    env.insert("B".to_string(), "sk-12345678".to_string());
    let masked = masked_env(&env);
    assert_eq!(masked.get("A").map(String::as_str), Some("******"));
    assert_eq!(masked.get("B").map(String::as_str), Some("sk******78"));
}

#[test]
fn profile_secrets_are_separate_from_actor_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let home = Home::at(dir.path());
    update_profile_secrets(&home, "ap_1", &pair("P", "v"), &[], false).unwrap();
    assert!(load_actor_private_env(&home, "g_x", "ap_1").unwrap().is_empty());
    assert_eq!(
        load_profile_secrets(&home, "ap_1").unwrap().get("P").map(String::as_str),
        Some("v")
    );
}
