// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global actor profile store (`state/actor_profiles/profiles.json`).

use crate::atomic::{atomic_write_json, read_json_opt, StorageError};
use crate::home::Home;
use cccc_core::{utc_now_iso, ActorProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilesDoc {
    #[serde(default = "default_version")]
    pub v: u32,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, ActorProfile>,
}

fn default_version() -> u32 {
    1
}

impl Default for ProfilesDoc {
    fn default() -> Self {
        Self {
            v: 1,
            updated_at: String::new(),
            profiles: BTreeMap::new(),
        }
    }
}

impl ProfilesDoc {
    pub fn get(&self, profile_id: &str) -> Option<&ActorProfile> {
        self.profiles.get(profile_id)
    }

    /// Insert or replace a profile, bumping `revision` when it already
    /// exists so linked actors can detect drift.
    pub fn upsert(&mut self, mut profile: ActorProfile) -> u64 {
        let now = utc_now_iso();
        profile.updated_at = now.clone();
        match self.profiles.get(profile.id.as_str()) {
            Some(existing) => {
                profile.revision = existing.revision + 1;
                profile.created_at = existing.created_at.clone();
            }
            None => {
                profile.revision = 1;
                if profile.created_at.is_empty() {
                    profile.created_at = now;
                }
            }
        }
        let rev = profile.revision;
        self.profiles.insert(profile.id.as_str().to_string(), profile);
        rev
    }

    pub fn remove(&mut self, profile_id: &str) -> Option<ActorProfile> {
        self.profiles.remove(profile_id)
    }
}

pub fn load_profiles(home: &Home) -> Result<ProfilesDoc, StorageError> {
    Ok(read_json_opt(&home.profiles_path())?.unwrap_or_default())
}

pub fn save_profiles(home: &Home, doc: &mut ProfilesDoc) -> Result<(), StorageError> {
    doc.updated_at = utc_now_iso();
    atomic_write_json(&home.profiles_path(), doc)
}

#[cfg(test)]
#[path = "profiles_tests.rs"]
mod tests;
