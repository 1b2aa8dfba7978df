// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Private env stores (per-actor and per-profile secrets).
//!
//! Values never leave this module unmasked except through the explicit
//! load functions used at runner launch. Files are 0600 under
//! `state/secrets/`.

use crate::atomic::{atomic_write_json, read_json_opt, StorageError};
use crate::home::Home;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PRIVATE_ENV_MAX_KEYS: usize = 256;
const PRIVATE_ENV_MAX_VALUE_CHARS: usize = 200_000;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("missing env key")]
    MissingKey,
    #[error("invalid env key: {0}")]
    InvalidKey(String),
    #[error("env value too large")]
    ValueTooLarge,
    #[error("too many private env keys (max {PRIVATE_ENV_MAX_KEYS})")]
    TooManyKeys,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Validate a key against `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_env_key(key: &str) -> Result<String, SecretsError> {
    let k = key.trim();
    if k.is_empty() {
        return Err(SecretsError::MissingKey);
    }
    let mut chars = k.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !k.chars().skip(1).all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SecretsError::InvalidKey(k.to_string()));
    }
    Ok(k.to_string())
}

/// Stable masked preview for listings. Never reversible; short values are
/// fully masked, longer ones keep two chars of prefix/suffix.
pub fn mask_secret_value(value: &str) -> String {
    if value.len() <= 6 {
        "******".to_string()
    } else {
        let head: String = value.chars().take(2).collect();
        let tail: String = value
            .chars()
            .rev()
            .take(2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{head}******{tail}")
    }
}

/// Key → masked preview, for clients.
pub fn masked_env(env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .map(|(k, v)| (k.clone(), mask_secret_value(v)))
        .collect()
}

fn actor_secret_path(home: &Home, group_id: &str, actor_id: &str) -> PathBuf {
    home.actor_secrets_dir(group_id)
        .join(format!("{}.json", sanitize_file_stem(actor_id)))
}

fn sanitize_file_stem(raw: &str) -> String {
    let slug: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let slug = slug.trim_matches(|c| c == '.' || c == '_' || c == '-');
    if slug.is_empty() {
        "actor".to_string()
    } else {
        slug.chars().take(40).collect()
    }
}

fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
    let raw: Option<BTreeMap<String, serde_json::Value>> = read_json_opt(path)?;
    let mut out = BTreeMap::new();
    if let Some(raw) = raw {
        for (k, v) in raw {
            if validate_env_key(&k).is_err() {
                continue;
            }
            match v {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => {
                    out.insert(k, s);
                }
                other => {
                    out.insert(k, other.to_string());
                }
            }
        }
    }
    Ok(out)
}

fn write_env_file(path: &Path, env: &BTreeMap<String, String>) -> Result<(), SecretsError> {
    if env.is_empty() {
        let _ = std::fs::remove_file(path);
        if let Some(parent) = path.parent() {
            let empty = std::fs::read_dir(parent)
                .map(|mut it| it.next().is_none())
                .unwrap_or(false);
            if empty {
                let _ = std::fs::remove_dir(parent);
            }
        }
        return Ok(());
    }
    atomic_write_json(path, env)?;
    restrict_permissions(path);
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    if let Some(parent) = path.parent() {
        let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

/// Secrets merged into the actor's process env at launch.
pub fn load_actor_private_env(
    home: &Home,
    group_id: &str,
    actor_id: &str,
) -> Result<BTreeMap<String, String>, StorageError> {
    load_env_file(&actor_secret_path(home, group_id, actor_id))
}

/// Apply set/unset/clear operations to an actor's private env.
pub fn update_actor_private_env(
    home: &Home,
    group_id: &str,
    actor_id: &str,
    set_vars: &BTreeMap<String, String>,
    unset_keys: &[String],
    clear: bool,
) -> Result<BTreeMap<String, String>, SecretsError> {
    let path = actor_secret_path(home, group_id, actor_id);
    let mut current = if clear {
        BTreeMap::new()
    } else {
        load_env_file(&path)?
    };
    for k in unset_keys {
        current.remove(validate_env_key(k)?.as_str());
    }
    for (k, v) in set_vars {
        let key = validate_env_key(k)?;
        if v.len() > PRIVATE_ENV_MAX_VALUE_CHARS {
            return Err(SecretsError::ValueTooLarge);
        }
        current.insert(key, v.clone());
    }
    if current.len() > PRIVATE_ENV_MAX_KEYS {
        return Err(SecretsError::TooManyKeys);
    }
    write_env_file(&path, &current)?;
    Ok(current)
}

pub fn delete_actor_private_env(home: &Home, group_id: &str, actor_id: &str) {
    let _ = std::fs::remove_file(actor_secret_path(home, group_id, actor_id));
}

pub fn delete_group_private_env(home: &Home, group_id: &str) {
    let dir = home.actor_secrets_dir(group_id);
    if dir.exists() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

/// Profile secret map (linked actors take these instead of actor secrets).
pub fn load_profile_secrets(
    home: &Home,
    profile_id: &str,
) -> Result<BTreeMap<String, String>, StorageError> {
    load_env_file(&home.profile_secrets_path(profile_id))
}

pub fn update_profile_secrets(
    home: &Home,
    profile_id: &str,
    set_vars: &BTreeMap<String, String>,
    unset_keys: &[String],
    clear: bool,
) -> Result<BTreeMap<String, String>, SecretsError> {
    let path = home.profile_secrets_path(profile_id);
    let mut current = if clear {
        BTreeMap::new()
    } else {
        load_env_file(&path)?
    };
    for k in unset_keys {
        current.remove(validate_env_key(k)?.as_str());
    }
    for (k, v) in set_vars {
        let key = validate_env_key(k)?;
        if v.len() > PRIVATE_ENV_MAX_VALUE_CHARS {
            return Err(SecretsError::ValueTooLarge);
        }
        current.insert(key, v.clone());
    }
    if current.len() > PRIVATE_ENV_MAX_KEYS {
        return Err(SecretsError::TooManyKeys);
    }
    write_env_file(&path, &current)?;
    Ok(current)
}

pub fn delete_profile_secrets(home: &Home, profile_id: &str) {
    let _ = std::fs::remove_file(home.profile_secrets_path(profile_id));
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
