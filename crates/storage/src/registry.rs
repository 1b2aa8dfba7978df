// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `registry.json`: the `group_id → group` map plus per-scope defaults.

use crate::atomic::{atomic_write_json, is_corrupt_yaml, read_json_opt, StorageError};
use crate::home::Home;
use cccc_core::{utc_now_iso, GroupDoc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryDoc {
    #[serde(default = "default_version")]
    pub v: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub groups: BTreeMap<String, RegistryEntry>,
    /// `scope_key → group_id` for automatic group-on-attach selection.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

fn default_version() -> u32 {
    1
}

impl Default for RegistryDoc {
    fn default() -> Self {
        let now = utc_now_iso();
        Self {
            v: 1,
            created_at: now.clone(),
            updated_at: now,
            groups: BTreeMap::new(),
            defaults: BTreeMap::new(),
        }
    }
}

impl RegistryDoc {
    pub fn save(&mut self, home: &Home) -> Result<(), StorageError> {
        self.updated_at = utc_now_iso();
        atomic_write_json(&home.registry_path(), self)
    }

    pub fn touch_group(&mut self, group_id: &str, ts: &str) {
        if let Some(entry) = self.groups.get_mut(group_id) {
            entry.updated_at = ts.to_string();
        }
    }

    pub fn register_group(&mut self, group_id: &str, title: &str) {
        let now = utc_now_iso();
        self.groups.insert(
            group_id.to_string(),
            RegistryEntry {
                title: title.to_string(),
                created_at: now.clone(),
                updated_at: now,
                extra: BTreeMap::new(),
            },
        );
    }

    pub fn remove_group(&mut self, group_id: &str) {
        self.groups.remove(group_id);
        self.defaults.retain(|_, gid| gid != group_id);
    }

    pub fn default_group_for_scope(&self, scope_key: &str) -> Option<&str> {
        self.defaults.get(scope_key).map(|s| s.as_str())
    }
}

/// Load the registry, normalizing an empty or missing file.
pub fn load_registry(home: &Home) -> Result<RegistryDoc, StorageError> {
    Ok(read_json_opt(&home.registry_path())?.unwrap_or_default())
}

/// Result of a registry reconcile scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Registered but `group.yaml` is absent.
    pub missing: Vec<String>,
    /// `group.yaml` present but unparseable.
    pub corrupt: Vec<String>,
    /// On-disk groups absent from the registry (re-registered).
    pub adopted: Vec<String>,
    /// Entries purged because `remove_missing` was set.
    pub removed: Vec<String>,
}

/// Compare the registry against the `groups/` tree.
///
/// Adopts unregistered groups found on disk. With `remove_missing`, purges
/// entries whose directory is gone along with their scope defaults.
pub fn reconcile_registry(home: &Home, remove_missing: bool) -> Result<ReconcileReport, StorageError> {
    let mut reg = load_registry(home)?;
    let mut report = ReconcileReport::default();

    for gid in reg.groups.keys().cloned().collect::<Vec<_>>() {
        let path = home.group_yaml_path(&gid);
        if !path.exists() {
            report.missing.push(gid);
        } else if is_corrupt_yaml::<GroupDoc>(&path) {
            report.corrupt.push(gid);
        }
    }

    // Adopt on-disk groups the registry has lost track of.
    if let Ok(entries) = std::fs::read_dir(home.groups_dir()) {
        for entry in entries.flatten() {
            let gid = entry.file_name().to_string_lossy().into_owned();
            if reg.groups.contains_key(&gid) {
                continue;
            }
            let path = home.group_yaml_path(&gid);
            if !path.exists() {
                continue;
            }
            // Report corrupt files without quarantining them; reconcile is
            // a diagnostic scan.
            if is_corrupt_yaml::<GroupDoc>(&path) {
                report.corrupt.push(gid);
                continue;
            }
            if let Some(doc) = crate::group_store::load_group(home, &gid)? {
                reg.register_group(&gid, &doc.title);
                report.adopted.push(gid);
            }
        }
    }

    if remove_missing {
        for gid in &report.missing {
            reg.remove_group(gid);
            report.removed.push(gid.clone());
        }
    }

    reg.save(home)?;
    report.missing.sort();
    report.corrupt.sort();
    report.corrupt.dedup();
    Ok(report)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
