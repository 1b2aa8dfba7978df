// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe JSON/YAML persistence.
//!
//! Every write goes to a temp sibling, is fsync'd, then renamed over the
//! target — a crash at any point leaves the previous file intact. A file
//! that no longer parses is quarantined under a timestamped sibling name
//! and treated as absent, so a damaged state file can never wedge the
//! daemon at startup.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Atomically write `value` as pretty JSON.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Atomically write `value` as YAML.
pub fn atomic_write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let text = serde_yaml::to_string(value)?;
    atomic_write_bytes(path, text.as_bytes())
}

/// Atomically replace `path` with `bytes` (temp + fsync + rename).
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_sibling(path);
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read a JSON file. Missing → `None`; corrupt → quarantined and `None`.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let Some(bytes) = read_existing(path)? else {
        return Ok(None);
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            quarantine_corrupt(path, &e.to_string());
            Ok(None)
        }
    }
}

/// Read a YAML file. Missing → `None`; corrupt → quarantined and `None`.
pub fn read_yaml_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let Some(bytes) = read_existing(path)? else {
        return Ok(None);
    };
    match serde_yaml::from_slice(&bytes) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            quarantine_corrupt(path, &e.to_string());
            Ok(None)
        }
    }
}

/// True when `path` exists but cannot be parsed as the expected document.
/// Unlike the `read_*_opt` helpers this never rotates the file.
pub fn is_corrupt_yaml<T: DeserializeOwned>(path: &Path) -> bool {
    match fs::read(path) {
        Ok(bytes) => serde_yaml::from_slice::<T>(&bytes).is_err(),
        Err(_) => false,
    }
}

fn read_existing(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}

/// How many quarantined copies of one file are worth keeping for forensics.
const MAX_QUARANTINED: usize = 3;

/// Get a corrupt file out of the loader's way.
///
/// The damaged bytes are renamed to `<name>.corrupt.<utc-stamp>` next to
/// the original (suffixed with a counter when the stamp collides), then
/// older quarantines of the same file are pruned down to
/// [`MAX_QUARANTINED`]. Everything here is best-effort: a quarantine that
/// fails must not turn an unreadable file into a hard error.
fn quarantine_corrupt(path: &Path, error: &str) {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let mut target = quarantine_sibling(path, &stamp);
    let mut bump = 1u32;
    while target.exists() {
        bump += 1;
        target = quarantine_sibling(path, &format!("{stamp}.{bump}"));
    }
    warn!(
        path = %path.display(),
        quarantined = %target.display(),
        error,
        "unparseable state file quarantined"
    );
    if fs::rename(path, &target).is_ok() {
        prune_quarantined(path);
    }
}

fn quarantine_sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!("{name}.corrupt.{suffix}"))
}

/// Delete all but the newest [`MAX_QUARANTINED`] quarantines of `path`.
///
/// The timestamp (plus collision counter) sorts lexically in creation
/// order, so "oldest" is simply the front of the sorted name list.
fn prune_quarantined(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return;
    };
    let prefix = format!("{name}.corrupt.");
    let Ok(entries) = fs::read_dir(parent) else {
        return;
    };
    let mut quarantined: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .map(|e| e.path())
        .collect();
    quarantined.sort();
    let excess = quarantined.len().saturating_sub(MAX_QUARANTINED);
    for old in quarantined.into_iter().take(excess) {
        let _ = fs::remove_file(old);
    }
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
