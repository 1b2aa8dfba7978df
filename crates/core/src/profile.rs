// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reusable actor profiles.
//!
//! A profile owns runtime/runner/command/submit for every actor linked to
//! it; linked actors keep `actor.env` empty and take secrets from the
//! profile secret store. `revision` bumps on every upsert so linked actors
//! can detect drift via `profile_revision_applied`.

use crate::actor::{RunnerKind, Runtime, SubmitKey};
use crate::id::ProfileId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: ProfileId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub runner: RunnerKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default)]
    pub submit: SubmitKey,
    #[serde(default = "default_revision")]
    pub revision: u64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_revision() -> u64 {
    1
}

impl ActorProfile {
    pub fn new(id: ProfileId, name: impl Into<String>, now_iso: &str) -> Self {
        Self {
            id,
            name: name.into(),
            runtime: Runtime::default(),
            runner: RunnerKind::default(),
            command: Vec::new(),
            submit: SubmitKey::default(),
            revision: 1,
            created_at: now_iso.to_string(),
            updated_at: now_iso.to_string(),
            extra: BTreeMap::new(),
        }
    }
}
