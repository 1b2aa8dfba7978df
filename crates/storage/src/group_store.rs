// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `group.yaml` load/save. Every op re-reads from disk; the daemon is the
//! only writer so there is nothing to cache.

use crate::atomic::{atomic_write_yaml, read_yaml_opt, StorageError};
use crate::home::Home;
use cccc_core::{utc_now_iso, GroupDoc};

/// Load a group document. `None` when absent or corrupt.
pub fn load_group(home: &Home, group_id: &str) -> Result<Option<GroupDoc>, StorageError> {
    read_yaml_opt(&home.group_yaml_path(group_id))
}

/// Persist a group document, stamping `updated_at`.
pub fn save_group(home: &Home, doc: &mut GroupDoc) -> Result<(), StorageError> {
    doc.updated_at = utc_now_iso();
    atomic_write_yaml(&home.group_yaml_path(doc.group_id.as_str()), doc)
}

/// Remove a group's directory tree.
pub fn delete_group(home: &Home, group_id: &str) -> Result<(), StorageError> {
    let dir = home.group_dir(group_id);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}

/// Group ids present on disk (directories containing a `group.yaml`).
pub fn list_group_ids(home: &Home) -> Vec<String> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(home.groups_dir()) {
        for entry in entries.flatten() {
            let gid = entry.file_name().to_string_lossy().into_owned();
            if home.group_yaml_path(&gid).exists() {
                out.push(gid);
            }
        }
    }
    out.sort();
    out
}

#[cfg(test)]
#[path = "group_store_tests.rs"]
mod tests;
