// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cccc-storage: everything persistent under `CCCC_HOME`.
//!
//! All writes are crash-safe (`write-to-temp + fsync + rename`); the ledger
//! is the only append-in-place file. Readers re-read from disk on every
//! call — the daemon is the single writer, so staleness is impossible and
//! simplicity beats caching.

pub mod active;
pub mod atomic;
pub mod automation_state;
pub mod blobs;
pub mod cursors;
pub mod group_store;
pub mod home;
pub mod ledger;
pub mod preamble;
pub mod profiles;
pub mod registry;
pub mod retention;
pub mod runner_state;
pub mod secrets;
pub mod settings;

pub use active::{load_active, set_active_group_id, ActiveDoc};
pub use atomic::{atomic_write_json, atomic_write_yaml, read_json_opt, read_yaml_opt, StorageError};
pub use automation_state::{
    load_automation_state, save_automation_state, ActorAutoState, AutomationStateDoc, NudgeItem,
    RuleAutoState,
};
pub use blobs::{normalize_attachments, resolve_blob_path, BlobError};
pub use cursors::{get_cursor, set_cursor, Cursor};
pub use group_store::{delete_group, list_group_ids, load_group, save_group};
pub use home::Home;
pub use ledger::{
    events_after, events_from_offset, find_event, iter_events, last_event, tail_events, AppendHook,
    LedgerError, LedgerService,
};
pub use preamble::{clear_preamble_sent, preamble_sent_key, set_preamble_sent};
pub use profiles::{load_profiles, save_profiles, ProfilesDoc};
pub use registry::{load_registry, reconcile_registry, ReconcileReport, RegistryDoc, RegistryEntry};
pub use retention::{compact_ledger, snapshot_ledger, CompactOptions, CompactResult};
pub use runner_state::{
    read_headless_state, read_pty_state, remove_headless_state, remove_pty_state_if_pid,
    write_headless_state, write_pty_state, HeadlessState, PtyState,
};
pub use secrets::{
    delete_actor_private_env, delete_group_private_env, delete_profile_secrets,
    load_actor_private_env, load_profile_secrets, mask_secret_value, masked_env,
    update_actor_private_env, update_profile_secrets, validate_env_key, SecretsError,
    PRIVATE_ENV_MAX_KEYS,
};
pub use settings::{load_settings, save_settings, ObservabilitySettings, SettingsDoc};
