// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `active.json`: the default group hint for CLI convenience.

use crate::atomic::{atomic_write_json, read_json_opt, StorageError};
use crate::home::Home;
use cccc_core::utc_now_iso;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveDoc {
    #[serde(default = "default_version")]
    pub v: u32,
    #[serde(default)]
    pub active_group_id: String,
    #[serde(default)]
    pub updated_at: String,
}

fn default_version() -> u32 {
    1
}

impl Default for ActiveDoc {
    fn default() -> Self {
        Self {
            v: 1,
            active_group_id: String::new(),
            updated_at: utc_now_iso(),
        }
    }
}

pub fn load_active(home: &Home) -> Result<ActiveDoc, StorageError> {
    Ok(read_json_opt(&home.active_path())?.unwrap_or_default())
}

pub fn set_active_group_id(home: &Home, group_id: &str) -> Result<ActiveDoc, StorageError> {
    let doc = ActiveDoc {
        v: 1,
        active_group_id: group_id.trim().to_string(),
        updated_at: utc_now_iso(),
    };
    atomic_write_json(&home.active_path(), &doc)?;
    Ok(doc)
}
