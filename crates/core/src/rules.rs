// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-defined automation rules and the automation section of `group.yaml`.

use crate::event::NotifyPriority;
use crate::id::{ActorId, RuleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named message templates referenced by `snippet_ref`.
pub type Snippets = BTreeMap<String, String>;

/// Rule visibility: group-wide or private to one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    #[default]
    Group,
    Personal,
}

/// When a rule fires.
///
/// Cron expressions are standard 5-field (minute hour day-of-month month
/// day-of-week) evaluated at minute boundaries in `timezone`. When both
/// day-of-month and day-of-week are restricted, a time matches if *either*
/// matches (Vixie cron union semantics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleTrigger {
    Interval {
        every_seconds: u64,
    },
    Cron {
        cron: String,
        #[serde(default = "default_timezone")]
        timezone: String,
    },
    /// Fires exactly once at an RFC3339 instant; the rule disables itself
    /// after a successful fire.
    At {
        at: String,
    },
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// What a rule does when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleAction {
    Notify {
        #[serde(default)]
        title: String,
        #[serde(default)]
        message: String,
        /// Preferred over `message` when set and resolvable.
        #[serde(default)]
        snippet_ref: String,
        #[serde(default)]
        priority: NotifyPriority,
        #[serde(default)]
        requires_ack: bool,
    },
    /// Set the group state. Only valid with an `at` trigger.
    GroupState { state: String },
    /// Start/stop/restart actors. Only valid with an `at` trigger.
    ActorControl {
        operation: String,
        targets: Vec<String>,
    },
}

/// One user-defined rule inside `group.automation.rules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub scope: RuleScope,
    /// Required (and equal to the single recipient) for personal rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_actor_id: Option<ActorId>,
    #[serde(default)]
    pub to: Vec<String>,
    pub trigger: RuleTrigger,
    pub action: RuleAction,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// The `automation` section of `group.yaml`: timer knobs (schema-lenient,
/// read with defaults), rule set, snippets, and a monotonic version bumped on
/// every automation update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AutomationSettings {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub rules: Vec<AutomationRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub snippets: Snippets,
    /// Timer thresholds (`nudge_after_seconds`, `silence_timeout_seconds`, …)
    /// plus any unknown keys. Kept loose so older files stay readable; the
    /// automation manager applies defaults on read.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AutomationSettings {
    /// Integer knob lookup with default, clamped at zero.
    pub fn knob(&self, key: &str, default: i64) -> i64 {
        let v = self.extra.get(key).and_then(value_as_i64).unwrap_or(default);
        v.max(0)
    }

    pub fn find_rule(&self, rule_id: &str) -> Option<&AutomationRule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }

    pub fn find_rule_mut(&mut self, rule_id: &str) -> Option<&mut AutomationRule> {
        self.rules.iter_mut().find(|r| r.id == rule_id)
    }
}

fn value_as_i64(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
