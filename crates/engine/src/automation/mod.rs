// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automation manager: the 1 Hz brain that keeps agents productive
//! without spamming them.
//!
//! Each tick runs, in order: nudge, actor-idle, keepalive, silence,
//! help-nudge, then user-defined rules. State lives in
//! `state/automation.json` and is re-read on every tick so external tools
//! stay in sync. Gating: `paused` skips everything, `idle` runs only user
//! rules, `active` runs all checks.

pub mod cron;

use crate::delivery::DeliveryPipeline;
use crate::inbox::{obligation_status_batch, ObligationStatus};
use cccc_core::{
    enabled_recipient_actor_ids, is_message_for_actor, parse_utc_iso, utc_now_iso, EventKind,
    GroupDoc, GroupState, LedgerEvent, NotifyData, NotifyKind, RuleAction, RuleScope, RuleTrigger,
    RunnerKind, TranscriptVisibility,
};
use cccc_runner::{effective_runner_kind, HeadlessSupervisor, PtySupervisor, SessionAdapter};
use cccc_storage::{
    get_cursor, iter_events, load_automation_state, load_group, save_automation_state, Home,
    LedgerService,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback into the daemon op dispatcher, used by rule actions
/// (`group_state`, `actor_control`) and one-time-rule disabling so the
/// automation thread never duplicates op logic.
pub type OpFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, String>> + Send>>;
pub type OpInvoker = Arc<dyn Fn(&str, serde_json::Value) -> OpFuture + Send + Sync>;

/// Threshold knobs read from `group.automation` with defaults.
#[derive(Debug, Clone, Copy)]
pub struct AutomationConfig {
    pub nudge_after_seconds: i64,
    pub reply_required_nudge_after_seconds: i64,
    pub attention_ack_nudge_after_seconds: i64,
    pub unread_nudge_after_seconds: i64,
    pub nudge_digest_min_interval_seconds: i64,
    pub nudge_max_repeats_per_obligation: i64,
    pub nudge_escalate_after_repeats: i64,
    pub actor_idle_timeout_seconds: i64,
    pub keepalive_delay_seconds: i64,
    pub keepalive_max_per_actor: i64,
    pub silence_timeout_seconds: i64,
    pub help_nudge_interval_seconds: i64,
    pub help_nudge_min_messages: i64,
}

impl AutomationConfig {
    pub fn from_group(group: &GroupDoc) -> Self {
        let a = &group.automation;
        let nudge_after = a.knob("nudge_after_seconds", 300);
        Self {
            nudge_after_seconds: nudge_after,
            reply_required_nudge_after_seconds: a.knob("reply_required_nudge_after_seconds", nudge_after),
            attention_ack_nudge_after_seconds: a
                .knob("attention_ack_nudge_after_seconds", (nudge_after * 2).max(1)),
            unread_nudge_after_seconds: a.knob("unread_nudge_after_seconds", (nudge_after * 3).max(1)),
            nudge_digest_min_interval_seconds: a.knob("nudge_digest_min_interval_seconds", 120),
            nudge_max_repeats_per_obligation: a.knob("nudge_max_repeats_per_obligation", 3),
            nudge_escalate_after_repeats: a.knob("nudge_escalate_after_repeats", 2),
            actor_idle_timeout_seconds: a.knob("actor_idle_timeout_seconds", 600),
            keepalive_delay_seconds: a.knob("keepalive_delay_seconds", 120),
            keepalive_max_per_actor: a.knob("keepalive_max_per_actor", 3),
            silence_timeout_seconds: a.knob("silence_timeout_seconds", 600),
            help_nudge_interval_seconds: a.knob("help_nudge_interval_seconds", 600),
            help_nudge_min_messages: a.knob("help_nudge_min_messages", 10),
        }
    }
}

pub struct AutomationManager<S: SessionAdapter> {
    home: Home,
    ledger: LedgerService,
    pty: PtySupervisor<S>,
    headless: HeadlessSupervisor,
    delivery: DeliveryPipeline<S>,
    ops: Mutex<Option<OpInvoker>>,
}

impl<S: SessionAdapter> AutomationManager<S> {
    pub fn new(
        home: Home,
        ledger: LedgerService,
        pty: PtySupervisor<S>,
        headless: HeadlessSupervisor,
        delivery: DeliveryPipeline<S>,
    ) -> Self {
        Self {
            home,
            ledger,
            pty,
            headless,
            delivery,
            ops: Mutex::new(None),
        }
    }

    /// Wire the daemon op dispatcher (rule actions route through it).
    pub fn set_op_invoker(&self, invoker: OpInvoker) {
        *self.ops.lock() = Some(invoker);
    }

    async fn invoke_op(&self, op: &str, args: serde_json::Value) -> Result<serde_json::Value, String> {
        let invoker = self.ops.lock().clone();
        match invoker {
            Some(f) => f(op, args).await,
            None => Err("automation op invoker not wired".to_string()),
        }
    }

    /// Reset timers on resume (`idle|paused → active`). No catch-up: all
    /// timing starts from now.
    pub fn on_resume(&self, group: &GroupDoc) {
        let gid = group.group_id.as_str();
        let now = utc_now_iso();
        let mut state = match load_automation_state(&self.home, gid) {
            Ok(s) => s,
            Err(e) => {
                warn!(gid, error = %e, "failed to load automation state on resume");
                return;
            }
        };
        state.resume_at = now.clone();
        state.last_silence_notify_at = now.clone();
        state.help_ledger_pos = Some(
            std::fs::metadata(self.home.ledger_path(gid))
                .map(|m| m.len())
                .unwrap_or(0),
        );
        for rule in &group.automation.rules {
            let st = state.rule_mut(rule.id.as_str());
            st.last_fired_at = now.clone();
            st.last_error_at.clear();
            st.last_error.clear();
        }
        for actor in &group.actors {
            let aid = actor.id.as_str();
            let session_key = match effective_runner_kind(actor.runner) {
                RunnerKind::Headless => self
                    .headless
                    .get(gid, aid)
                    .map(|h| h.started_at)
                    .unwrap_or_default(),
                RunnerKind::Pty => self.pty.session_key(gid, aid).unwrap_or_default(),
            };
            let st = state.actor_mut(aid);
            st.last_idle_notify_at = now.clone();
            st.keepalive_count = 0;
            st.last_keepalive_at = now.clone();
            st.last_nudge_event_id.clear();
            st.last_nudge_at = now.clone();
            st.nudge_items.clear();
            st.help_last_nudge_at = now.clone();
            st.help_msg_count_since = 0;
            st.help_session_key = session_key;
        }
        if let Err(e) = save_automation_state(&self.home, gid, &mut state) {
            warn!(gid, error = %e, "failed to save automation state on resume");
        }
    }

    /// One pass over all running groups.
    pub async fn tick(&self) {
        for gid in cccc_storage::list_group_ids(&self.home) {
            let group = match load_group(&self.home, &gid) {
                Ok(Some(g)) => g,
                _ => continue,
            };
            if !(self.pty.group_running(&gid) || self.headless.group_running(&gid)) {
                continue;
            }
            match group.state {
                GroupState::Paused => continue,
                GroupState::Idle => {
                    // Idle groups run user rules only.
                    self.check_rules(&group, Utc::now()).await;
                }
                GroupState::Active => {
                    self.tick_group(&group, Utc::now()).await;
                }
            }
        }
    }

    /// Run all checks for one active group at `now`.
    pub async fn tick_group(&self, group: &GroupDoc, now: DateTime<Utc>) {
        let cfg = AutomationConfig::from_group(group);
        self.check_nudge(group, &cfg, now).await;
        self.check_actor_idle(group, &cfg, now).await;
        self.check_keepalive(group, &cfg, now).await;
        self.check_silence(group, &cfg, now).await;
        self.check_help_nudge(group, &cfg, now).await;
        self.check_rules(group, now).await;
    }

    fn actor_running(&self, group: &GroupDoc, actor_id: &str) -> bool {
        let gid = group.group_id.as_str();
        match group
            .find_actor(actor_id)
            .map(|a| effective_runner_kind(a.runner))
        {
            Some(RunnerKind::Headless) => self.headless.actor_running(gid, actor_id),
            Some(RunnerKind::Pty) => self.pty.actor_running(gid, actor_id),
            None => false,
        }
    }

    /// Append a `system.notify`, queue it for PTY targets, and flush.
    async fn emit_notify(&self, group: &GroupDoc, notify: NotifyData) -> Option<LedgerEvent> {
        let gid = group.group_id.as_str();
        let target = notify.target_actor_id.clone();
        let event = match self.ledger.append(
            &self.home.ledger_path(gid),
            EventKind::SystemNotify,
            &group.group_id,
            "",
            "system",
            serde_json::to_value(&notify).ok()?,
        ) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(gid, error = %e, "failed to append automation notify");
                return None;
            }
        };
        if let Some(actor_id) = target {
            let is_pty = group
                .find_actor(&actor_id)
                .map(|a| effective_runner_kind(a.runner) == RunnerKind::Pty)
                .unwrap_or(false);
            if is_pty && self.pty.actor_running(gid, &actor_id) {
                self.delivery.queue_system_notify(group, &actor_id, &event, &notify);
                self.delivery.flush_pending(group, &actor_id).await;
            }
        }
        Some(event)
    }

    // -- Level 1: message obligations ------------------------------------

    async fn check_nudge(&self, group: &GroupDoc, cfg: &AutomationConfig, now: DateTime<Utc>) {
        if cfg.reply_required_nudge_after_seconds <= 0
            && cfg.attention_ack_nudge_after_seconds <= 0
            && cfg.unread_nudge_after_seconds <= 0
            && cfg.nudge_after_seconds <= 0
        {
            return;
        }
        let gid = group.group_id.as_str();
        let roster: Vec<_> = group.enabled_actors().cloned().collect();
        if roster.is_empty() {
            return;
        }

        let all_events: Vec<LedgerEvent> = iter_events(&self.home.ledger_path(gid))
            .filter(|ev| ev.kind.is_chat_message() || ev.kind.is_notify())
            .collect();
        let chat_events: Vec<LedgerEvent> = all_events
            .iter()
            .filter(|ev| ev.kind.is_chat_message())
            .cloned()
            .collect();
        let obligations = obligation_status_batch(&self.home, group, &chat_events);

        let now_iso = cccc_core::time_fmt::format_utc_iso(now);
        let mut state = match load_automation_state(&self.home, gid) {
            Ok(s) => s,
            Err(_) => return,
        };
        let resume_dt = parse_utc_iso(&state.resume_at);
        let foreman_id = group.foreman_id().map(|f| f.as_str().to_string());

        struct DueNudge {
            actor_id: String,
            title: String,
            lines: Vec<String>,
            escalate: bool,
        }
        let mut to_nudge: Vec<DueNudge> = Vec::new();
        let mut dirty = false;

        for actor in &roster {
            let aid = actor.id.as_str();
            if !self.actor_running(group, aid) {
                continue;
            }
            let cursor = get_cursor(&self.home, gid, aid).unwrap_or_default();

            let mut pending_reply = 0usize;
            let mut pending_ack = 0usize;
            let mut oldest_unread_ts = String::new();
            let mut alive_keys: HashSet<String> = HashSet::new();
            let mut due_keys: Vec<String> = Vec::new();
            let mut reply_due_keys: HashSet<String> = HashSet::new();
            let mut lines: Vec<String> = Vec::new();

            for ev in &all_events {
                if ev.kind.is_chat_message() && ev.by == aid {
                    continue;
                }
                if !is_message_for_actor(group, aid, ev) {
                    continue;
                }
                let Some(ev_dt) = parse_utc_iso(&ev.ts) else {
                    continue;
                };
                // Deadlines never reach back before the last resume.
                let base_dt = match resume_dt {
                    Some(r) if ev_dt < r => r,
                    _ => ev_dt,
                };

                if oldest_unread_ts.is_empty() && cursor.is_before(ev.id.as_str(), &ev.ts) {
                    oldest_unread_ts = ev.ts.clone();
                }
                if !ev.kind.is_chat_message() {
                    continue;
                }

                let status: Option<&ObligationStatus> = obligations
                    .get(ev.id.as_str())
                    .and_then(|m| m.get(aid));
                let Some(st) = status else { continue };
                let is_attention = ev
                    .chat_message()
                    .map(|d| d.priority.is_attention())
                    .unwrap_or(false);

                if st.reply_required && !st.replied {
                    pending_reply += 1;
                    let item_key = format!("reply_required:{}", ev.id);
                    alive_keys.insert(item_key.clone());
                    let repeats = nudge_repeat_count(&state, aid, &item_key);
                    if cfg.nudge_max_repeats_per_obligation > 0
                        && repeats >= cfg.nudge_max_repeats_per_obligation
                    {
                        continue;
                    }
                    if (now - base_dt).num_seconds() < cfg.reply_required_nudge_after_seconds {
                        continue;
                    }
                    reply_due_keys.insert(item_key.clone());
                    due_keys.push(item_key);
                    lines.push(format!(
                        "REPLY REQUIRED: event_id={} (since {}). Reply via cccc_message_reply(event_id={}, ...).",
                        ev.id, ev.ts, ev.id
                    ));
                    continue;
                }

                if is_attention && !st.acked {
                    pending_ack += 1;
                    let item_key = format!("attention_ack:{}", ev.id);
                    alive_keys.insert(item_key.clone());
                    let repeats = nudge_repeat_count(&state, aid, &item_key);
                    if cfg.nudge_max_repeats_per_obligation > 0
                        && repeats >= cfg.nudge_max_repeats_per_obligation
                    {
                        continue;
                    }
                    if (now - base_dt).num_seconds() < cfg.attention_ack_nudge_after_seconds {
                        continue;
                    }
                    due_keys.push(item_key);
                    lines.push(format!(
                        "IMPORTANT awaiting ACK: event_id={} (since {}). Use cccc_inbox_mark_read(event_id={}).",
                        ev.id, ev.ts, ev.id
                    ));
                }
            }

            // Unread backlog as one synthetic item.
            if !oldest_unread_ts.is_empty() {
                if let Some(unread_dt) = parse_utc_iso(&oldest_unread_ts) {
                    let base_dt = match resume_dt {
                        Some(r) if unread_dt < r => r,
                        _ => unread_dt,
                    };
                    let item_key = "unread_backlog".to_string();
                    alive_keys.insert(item_key.clone());
                    let repeats = nudge_repeat_count(&state, aid, &item_key);
                    let capped = cfg.nudge_max_repeats_per_obligation > 0
                        && repeats >= cfg.nudge_max_repeats_per_obligation;
                    if !capped && (now - base_dt).num_seconds() >= cfg.unread_nudge_after_seconds {
                        due_keys.push(item_key);
                        lines.push(format!(
                            "Unread backlog: oldest from {oldest_unread_ts}. Use cccc_inbox_list() to review."
                        ));
                    }
                }
            }

            // GC tracked items whose obligations are gone.
            let actor_state = state.actor_mut(aid);
            let before = actor_state.nudge_items.len();
            actor_state.nudge_items.retain(|k, _| alive_keys.contains(k));
            dirty |= before != actor_state.nudge_items.len();

            if lines.is_empty() {
                continue;
            }

            // Digest rate limit per actor.
            if cfg.nudge_digest_min_interval_seconds > 0 {
                if let Some(last) = parse_utc_iso(&actor_state.last_nudge_at) {
                    if (now - last).num_seconds() < cfg.nudge_digest_min_interval_seconds {
                        continue;
                    }
                }
            }

            let mut escalate = false;
            let mut seen: HashSet<String> = HashSet::new();
            for item_key in &due_keys {
                if !seen.insert(item_key.clone()) {
                    continue;
                }
                let item = actor_state.nudge_items.entry(item_key.clone()).or_default();
                item.count += 1;
                item.last_nudged_at = now_iso.clone();
                if reply_due_keys.contains(item_key)
                    && i64::from(item.count) >= cfg.nudge_escalate_after_repeats.max(1)
                    && foreman_id.as_deref().is_some_and(|f| f != aid)
                {
                    escalate = true;
                }
            }
            actor_state.last_nudge_at = now_iso.clone();
            actor_state.last_nudge_event_id = "digest".to_string();
            dirty = true;

            let mut title_parts: Vec<String> = Vec::new();
            if pending_reply > 0 {
                title_parts.push(format!("reply_required={pending_reply}"));
            }
            if pending_ack > 0 {
                title_parts.push(format!("attention_ack={pending_ack}"));
            }
            if !oldest_unread_ts.is_empty() {
                title_parts.push("unread>0".to_string());
            }
            let title = if title_parts.is_empty() {
                "Action items pending".to_string()
            } else {
                format!("Action items pending ({})", title_parts.join(", "))
            };
            to_nudge.push(DueNudge {
                actor_id: aid.to_string(),
                title,
                lines,
                escalate,
            });
        }

        if dirty {
            let _ = save_automation_state(&self.home, gid, &mut state);
        }

        for due in to_nudge {
            // Digest body caps at 5 lines plus an overflow marker.
            let mut lines = due.lines.clone();
            if lines.len() > 5 {
                let extra = lines.len() - 5;
                lines.truncate(5);
                lines.push(format!("... and {extra} more pending item(s)."));
            }
            let notify = NotifyData::new(NotifyKind::Nudge, due.title, lines.join("\n"))
                .target(due.actor_id.clone());
            self.emit_notify(group, notify).await;

            if due.escalate {
                if let Some(fid) = group.foreman_id() {
                    if fid.as_str() != due.actor_id {
                        let escalation = NotifyData::new(
                            NotifyKind::Nudge,
                            "Escalation: pending replies",
                            format!(
                                "{} has repeated pending obligations. Please intervene if needed.",
                                due.actor_id
                            ),
                        )
                        .target(fid.as_str());
                        self.emit_notify(group, escalation).await;
                    }
                }
            }
        }
    }

    // -- Level 2: session signals ----------------------------------------

    async fn check_actor_idle(&self, group: &GroupDoc, cfg: &AutomationConfig, now: DateTime<Utc>) {
        if cfg.actor_idle_timeout_seconds <= 0 {
            return;
        }
        let gid = group.group_id.as_str();
        let Some(foreman_id) = group.foreman_id() else {
            return;
        };

        let mut state = match load_automation_state(&self.home, gid) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut to_notify: Vec<(String, f64)> = Vec::new();
        let mut dirty = false;

        for actor in group.enabled_actors() {
            let aid = actor.id.as_str();
            if aid == foreman_id.as_str() || !self.actor_running(group, aid) {
                continue;
            }

            // PTY output is the authoritative signal; ledger activity is
            // the fallback for headless actors.
            let pty_idle = self.pty.idle_seconds(gid, aid);
            let ledger_idle = last_actor_activity(&self.home, gid, aid)
                .map(|dt| (now - dt).num_seconds() as f64);
            let idle_seconds = match (pty_idle, ledger_idle) {
                (Some(p), _) => p,
                (None, Some(l)) => l,
                (None, None) => continue,
            };
            if idle_seconds < cfg.actor_idle_timeout_seconds as f64 {
                continue;
            }

            let st = state.actor_mut(aid);
            if let Some(last) = parse_utc_iso(&st.last_idle_notify_at) {
                if (now - last).num_seconds() < cfg.actor_idle_timeout_seconds {
                    continue;
                }
            }
            st.last_idle_notify_at = cccc_core::time_fmt::format_utc_iso(now);
            dirty = true;
            to_notify.push((aid.to_string(), idle_seconds));
        }

        if dirty {
            let _ = save_automation_state(&self.home, gid, &mut state);
        }

        for (aid, idle_seconds) in to_notify {
            let mut msg = format!(
                "Actor {aid} has been quiet for {}s. They might be stuck or waiting for input.",
                idle_seconds as i64
            );
            let tt = &group.terminal_transcript;
            if tt.notify_tail && tt.visibility != TranscriptVisibility::Off {
                let n_lines = tt.notify_lines.clamp(1, 80);
                let snippet = self.terminal_tail_snippet(gid, &aid, n_lines);
                if !snippet.is_empty() {
                    msg = format!(
                        "{msg}\n\n---\nTerminal tail ({aid}, last {n_lines} lines):\n{snippet}"
                    );
                }
            }
            let notify = NotifyData::new(
                NotifyKind::ActorIdle,
                format!("Actor {aid} may need attention"),
                msg,
            )
            .target(foreman_id.as_str());
            self.emit_notify(group, notify).await;
        }
    }

    fn terminal_tail_snippet(&self, gid: &str, actor_id: &str, lines: u32) -> String {
        if !self.pty.actor_running(gid, actor_id) {
            return String::new();
        }
        let raw = self.pty.tail_output(gid, actor_id, 200_000);
        let text = String::from_utf8_lossy(&raw);
        let tail: Vec<&str> = text.lines().collect();
        let start = tail.len().saturating_sub(lines as usize);
        let mut snippet = tail[start..].join("\n").trim_end().to_string();
        if snippet.len() > 6000 {
            let cut = snippet.len() - 6000;
            // Cut at a char boundary.
            let boundary = (cut..snippet.len())
                .find(|i| snippet.is_char_boundary(*i))
                .unwrap_or(cut);
            snippet = snippet.split_off(boundary);
        }
        snippet
    }

    async fn check_keepalive(&self, group: &GroupDoc, cfg: &AutomationConfig, now: DateTime<Utc>) {
        if cfg.keepalive_delay_seconds <= 0 {
            return;
        }
        let gid = group.group_id.as_str();
        let mut state = match load_automation_state(&self.home, gid) {
            Ok(s) => s,
            Err(_) => return,
        };
        let resume_dt = parse_utc_iso(&state.resume_at);
        let mut to_keepalive: Vec<(String, String)> = Vec::new();
        let mut dirty = false;

        for actor in group.enabled_actors() {
            let aid = actor.id.as_str();
            if !self.actor_running(group, aid) {
                continue;
            }
            let Some((next_text, next_dt)) = actor_declared_next(&self.home, gid, aid) else {
                continue;
            };
            let next_dt = match resume_dt {
                Some(r) if next_dt < r => r,
                _ => next_dt,
            };

            let st = state.actor_mut(aid);
            // A fresh "Next:" declaration resets the counter.
            if st.last_keepalive_next != next_text {
                st.keepalive_count = 0;
                st.last_keepalive_next = next_text.clone();
                st.last_keepalive_at.clear();
                dirty = true;
            }
            if i64::from(st.keepalive_count) >= cfg.keepalive_max_per_actor {
                continue;
            }
            let base_dt = if st.keepalive_count == 0 {
                next_dt
            } else {
                parse_utc_iso(&st.last_keepalive_at).unwrap_or(next_dt)
            };
            if (now - base_dt).num_seconds() < cfg.keepalive_delay_seconds {
                continue;
            }
            st.keepalive_count += 1;
            st.last_keepalive_at = cccc_core::time_fmt::format_utc_iso(now);
            dirty = true;
            to_keepalive.push((aid.to_string(), next_text));
        }

        if dirty {
            let _ = save_automation_state(&self.home, gid, &mut state);
        }

        for (aid, next_text) in to_keepalive {
            let notify = NotifyData::new(
                NotifyKind::Keepalive,
                "Ready to continue?",
                format!("You mentioned: '{next_text}'. Continue when ready."),
            )
            .target(aid);
            self.emit_notify(group, notify).await;
        }
    }

    async fn check_silence(&self, group: &GroupDoc, cfg: &AutomationConfig, now: DateTime<Utc>) {
        if cfg.silence_timeout_seconds <= 0 {
            return;
        }
        let gid = group.group_id.as_str();
        let Some(foreman_id) = group.foreman_id() else {
            return;
        };
        let Some(last_activity) = last_group_activity(&self.home, gid) else {
            return;
        };
        let silence_seconds = (now - last_activity).num_seconds();
        if silence_seconds < cfg.silence_timeout_seconds {
            return;
        }

        let mut state = match load_automation_state(&self.home, gid) {
            Ok(s) => s,
            Err(_) => return,
        };
        if let Some(last) = parse_utc_iso(&state.last_silence_notify_at) {
            if (now - last).num_seconds() < cfg.silence_timeout_seconds {
                return;
            }
        }
        state.last_silence_notify_at = cccc_core::time_fmt::format_utc_iso(now);
        let _ = save_automation_state(&self.home, gid, &mut state);

        let notify = NotifyData::new(
            NotifyKind::SilenceCheck,
            "Group is quiet",
            format!(
                "No activity for {silence_seconds}s. Check if work is complete or if anyone needs help."
            ),
        )
        .target(foreman_id.as_str());
        self.emit_notify(group, notify).await;
    }

    // -- Level 3: help nudges --------------------------------------------

    async fn check_help_nudge(&self, group: &GroupDoc, cfg: &AutomationConfig, now: DateTime<Utc>) {
        if cfg.help_nudge_interval_seconds <= 0 || cfg.help_nudge_min_messages <= 0 {
            return;
        }
        let gid = group.group_id.as_str();

        // (actor_id, session_key) for everything currently running.
        let mut running: Vec<(String, String)> = Vec::new();
        for actor in group.enabled_actors() {
            let aid = actor.id.as_str();
            if !self.actor_running(group, aid) {
                continue;
            }
            let session_key = match effective_runner_kind(actor.runner) {
                RunnerKind::Headless => self
                    .headless
                    .get(gid, aid)
                    .map(|h| h.started_at)
                    .unwrap_or_default(),
                RunnerKind::Pty => self.pty.session_key(gid, aid).unwrap_or_default(),
            };
            running.push((aid.to_string(), session_key));
        }
        if running.is_empty() {
            return;
        }

        let mut state = match load_automation_state(&self.home, gid) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut dirty = false;

        // Ingest newly appended events by byte position. No backfill on
        // first run: counting starts from the current ledger size.
        let ledger_path = self.home.ledger_path(gid);
        let ledger_size = std::fs::metadata(&ledger_path).map(|m| m.len()).unwrap_or(0);
        match state.help_ledger_pos {
            None => {
                state.help_ledger_pos = Some(ledger_size);
                dirty = true;
            }
            Some(pos) if pos > ledger_size => {
                // Ledger was compacted/rewritten below us; restart from size.
                state.help_ledger_pos = Some(ledger_size);
                dirty = true;
            }
            Some(pos) if pos < ledger_size => {
                let (events, next_pos) = cccc_storage::events_from_offset(&ledger_path, pos);
                if next_pos != pos {
                    state.help_ledger_pos = Some(next_pos);
                    dirty = true;
                }
                for ev in &events {
                    if !(ev.kind.is_chat_message() || ev.kind.is_notify()) {
                        continue;
                    }
                    for (aid, _) in &running {
                        if is_message_for_actor(group, aid, ev) {
                            state.actor_mut(aid).help_msg_count_since += 1;
                            dirty = true;
                        }
                    }
                }
            }
            Some(_) => {}
        }

        let mut to_notify: Vec<String> = Vec::new();
        for (aid, session_key) in &running {
            let st = state.actor_mut(aid);
            // Session change resets counters instead of nudging.
            if !session_key.is_empty() && st.help_session_key != *session_key {
                st.help_session_key = session_key.clone();
                st.help_last_nudge_at = cccc_core::time_fmt::format_utc_iso(now);
                st.help_msg_count_since = 0;
                dirty = true;
                continue;
            }
            let Some(last) = parse_utc_iso(&st.help_last_nudge_at) else {
                st.help_last_nudge_at = cccc_core::time_fmt::format_utc_iso(now);
                st.help_msg_count_since = 0;
                dirty = true;
                continue;
            };
            if (now - last).num_seconds() < cfg.help_nudge_interval_seconds {
                continue;
            }
            if (st.help_msg_count_since as i64) < cfg.help_nudge_min_messages {
                continue;
            }
            st.help_last_nudge_at = cccc_core::time_fmt::format_utc_iso(now);
            st.help_msg_count_since = 0;
            dirty = true;
            to_notify.push(aid.clone());
        }

        if dirty {
            let _ = save_automation_state(&self.home, gid, &mut state);
        }

        for aid in to_notify {
            let notify = NotifyData::new(
                NotifyKind::HelpNudge,
                "Refresh collaboration rules",
                "Run `cccc_help` now to refresh collaboration rules (ignoring will keep reminding).",
            )
            .target(aid);
            self.emit_notify(group, notify).await;
        }
    }

    // -- Level 4: user rules ---------------------------------------------

    async fn check_rules(&self, group: &GroupDoc, now: DateTime<Utc>) {
        if group.automation.rules.is_empty() {
            return;
        }
        let gid = group.group_id.as_str();
        let now_iso = cccc_core::time_fmt::format_utc_iso(now);
        let group_title = group.title.clone();
        let actor_names: Vec<String> = group
            .enabled_actors()
            .map(|a| {
                if a.title.trim().is_empty() {
                    a.id.as_str().to_string()
                } else {
                    a.title.clone()
                }
            })
            .collect();
        let actor_names = actor_names.join(", ");

        struct DueRule {
            rule_id: String,
            trigger_kind: &'static str,
            slot_key: String,
            payload: DuePayload,
        }
        enum DuePayload {
            Notify {
                title: String,
                rendered: String,
                priority: cccc_core::NotifyPriority,
                requires_ack: bool,
                recipient_ids: Vec<String>,
            },
            GroupState {
                state: String,
            },
            ActorControl {
                operation: String,
                targets: Vec<String>,
            },
        }

        let mut due: Vec<DueRule> = Vec::new();
        {
            let mut state = match load_automation_state(&self.home, gid) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut dirty = false;

            for rule in &group.automation.rules {
                let rid = rule.id.as_str();
                if rid.is_empty() || !rule.enabled {
                    continue;
                }
                let trigger_kind;
                let mut slot_key = String::new();
                let mut scheduled_at = String::new();
                let mut interval_seconds: u64 = 0;

                match &rule.trigger {
                    RuleTrigger::Interval { every_seconds } => {
                        trigger_kind = "interval";
                        interval_seconds = *every_seconds;
                        if interval_seconds == 0 {
                            continue;
                        }
                        let st = state.rule_mut(rid);
                        let Some(last_dt) = parse_utc_iso(&st.last_fired_at) else {
                            // New interval rule: count from now, no
                            // immediate fire.
                            st.last_fired_at = now_iso.clone();
                            dirty = true;
                            continue;
                        };
                        if (now - last_dt).num_seconds() < interval_seconds as i64 {
                            continue;
                        }
                        scheduled_at = cccc_core::time_fmt::format_utc_iso(
                            last_dt + chrono::Duration::seconds(interval_seconds as i64),
                        );
                    }
                    RuleTrigger::Cron { cron: expr, timezone } => {
                        trigger_kind = "cron";
                        let spec = match cron::CronSpec::parse(expr) {
                            Ok(s) => s,
                            Err(e) => {
                                dirty |= record_rule_error(&mut state, rid, &now_iso, format!("invalid cron trigger: {e}"));
                                continue;
                            }
                        };
                        let tz = match cron::resolve_timezone(timezone) {
                            Ok(tz) => tz,
                            Err(e) => {
                                dirty |= record_rule_error(&mut state, rid, &now_iso, format!("invalid cron trigger: {e}"));
                                continue;
                            }
                        };
                        let Some(slot_utc) = cron::matching_slot(&spec, tz, now) else {
                            continue;
                        };
                        let slot = format!("cron:{}", cccc_core::time_fmt::format_utc_iso(slot_utc));
                        let st = state.rule_mut(rid);
                        if st.last_slot_key == slot {
                            continue;
                        }
                        // Mark the slot before delivery so the same minute
                        // is not re-evaluated every second.
                        st.last_slot_key = slot.clone();
                        dirty = true;
                        scheduled_at = cccc_core::time_fmt::format_utc_iso(slot_utc);
                        slot_key = slot;
                    }
                    RuleTrigger::At { at } => {
                        trigger_kind = "at";
                        let Some(at_dt) = parse_utc_iso(at) else {
                            dirty |= record_rule_error(
                                &mut state,
                                rid,
                                &now_iso,
                                "invalid at trigger: expected RFC3339 timestamp".to_string(),
                            );
                            continue;
                        };
                        if state.rule_mut(rid).at_fired {
                            continue;
                        }
                        if now < at_dt {
                            continue;
                        }
                        slot_key = format!("at:{}", cccc_core::time_fmt::format_utc_iso(at_dt));
                        scheduled_at = cccc_core::time_fmt::format_utc_iso(at_dt);
                    }
                }

                match &rule.action {
                    RuleAction::Notify {
                        title,
                        message,
                        snippet_ref,
                        priority,
                        requires_ack,
                    } => {
                        let template = if !snippet_ref.trim().is_empty() {
                            group
                                .automation
                                .snippets
                                .get(snippet_ref.trim())
                                .cloned()
                                .unwrap_or_else(|| message.clone())
                        } else {
                            message.clone()
                        };
                        if template.trim().is_empty() {
                            continue;
                        }
                        let rendered = render_snippet(
                            &template,
                            &[
                                (
                                    "interval_minutes",
                                    if interval_seconds >= 60 {
                                        ((interval_seconds / 60).max(1)).to_string()
                                    } else {
                                        "0".to_string()
                                    },
                                ),
                                ("group_title", group_title.clone()),
                                ("actor_names", actor_names.clone()),
                                ("scheduled_at", scheduled_at.clone()),
                            ],
                        );
                        if rendered.trim().is_empty() {
                            continue;
                        }
                        // Personal rules only ever address their owner.
                        let recipient_ids = if rule.scope == RuleScope::Personal {
                            rule.owner_actor_id
                                .as_ref()
                                .map(|o| vec![o.as_str().to_string()])
                                .unwrap_or_default()
                        } else {
                            enabled_recipient_actor_ids(group, &rule.to)
                        };
                        if recipient_ids.is_empty() {
                            continue;
                        }
                        due.push(DueRule {
                            rule_id: rid.to_string(),
                            trigger_kind,
                            slot_key: slot_key.clone(),
                            payload: DuePayload::Notify {
                                title: if title.trim().is_empty() {
                                    "Reminder".to_string()
                                } else {
                                    title.clone()
                                },
                                rendered: rendered.trim().to_string(),
                                priority: *priority,
                                requires_ack: *requires_ack,
                                recipient_ids,
                            },
                        });
                    }
                    RuleAction::GroupState { state: target } => {
                        if trigger_kind != "at" {
                            dirty |= record_rule_error(
                                &mut state,
                                rid,
                                &now_iso,
                                "invalid schedule: action.kind=group_state only supports one-time schedules"
                                    .to_string(),
                            );
                            continue;
                        }
                        due.push(DueRule {
                            rule_id: rid.to_string(),
                            trigger_kind,
                            slot_key: slot_key.clone(),
                            payload: DuePayload::GroupState {
                                state: target.clone(),
                            },
                        });
                    }
                    RuleAction::ActorControl { operation, targets } => {
                        if trigger_kind != "at" {
                            dirty |= record_rule_error(
                                &mut state,
                                rid,
                                &now_iso,
                                "invalid schedule: action.kind=actor_control only supports one-time schedules"
                                    .to_string(),
                            );
                            continue;
                        }
                        due.push(DueRule {
                            rule_id: rid.to_string(),
                            trigger_kind,
                            slot_key: slot_key.clone(),
                            payload: DuePayload::ActorControl {
                                operation: operation.clone(),
                                targets: targets.clone(),
                            },
                        });
                    }
                }
            }

            if dirty {
                let _ = save_automation_state(&self.home, gid, &mut state);
            }
        }

        if due.is_empty() {
            return;
        }

        // Execute outside the state borrow, then persist results.
        struct RuleResult {
            rule_id: String,
            fired: bool,
            error: String,
            trigger_kind: &'static str,
            slot_key: String,
        }
        let mut results: Vec<RuleResult> = Vec::new();

        for item in due {
            let mut fired = false;
            let mut error = String::new();
            match item.payload {
                DuePayload::Notify {
                    title,
                    rendered,
                    priority,
                    requires_ack,
                    recipient_ids,
                } => {
                    for aid in recipient_ids {
                        if !self.actor_running(group, &aid) {
                            continue;
                        }
                        let notify = NotifyData {
                            kind: NotifyKind::Automation,
                            priority,
                            title: title.clone(),
                            message: rendered.clone(),
                            target_actor_id: Some(aid.clone()),
                            requires_ack,
                            context: Some(serde_json::json!({"rule_id": item.rule_id})),
                        };
                        if self.emit_notify(group, notify).await.is_some() {
                            fired = true;
                        }
                    }
                }
                DuePayload::GroupState { state: target } => {
                    match self.execute_group_state_action(group, &target).await {
                        Ok(()) => fired = true,
                        Err(e) => error = e,
                    }
                }
                DuePayload::ActorControl { operation, targets } => {
                    match self
                        .execute_actor_control_action(group, &operation, &targets)
                        .await
                    {
                        Ok(()) => fired = true,
                        Err(e) => error = e,
                    }
                }
            }
            results.push(RuleResult {
                rule_id: item.rule_id,
                fired,
                error,
                trigger_kind: item.trigger_kind,
                slot_key: item.slot_key,
            });
        }

        let mut one_time_completed: Vec<String> = Vec::new();
        {
            let mut state = match load_automation_state(&self.home, gid) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut dirty = false;
            for r in &results {
                let st = state.rule_mut(&r.rule_id);
                if r.fired {
                    st.last_fired_at = now_iso.clone();
                    st.last_error_at.clear();
                    st.last_error.clear();
                    if r.trigger_kind == "at" {
                        st.at_fired = true;
                        st.last_slot_key = r.slot_key.clone();
                        one_time_completed.push(r.rule_id.clone());
                    } else if r.trigger_kind == "cron" && !r.slot_key.is_empty() {
                        st.last_slot_key = r.slot_key.clone();
                    }
                    dirty = true;
                } else if !r.error.is_empty() {
                    st.last_error_at = now_iso.clone();
                    st.last_error = r.error.chars().take(500).collect();
                    dirty = true;
                }
            }
            if dirty {
                let _ = save_automation_state(&self.home, gid, &mut state);
            }
        }

        // One-time rules invalidate themselves in group.yaml so blueprint
        // re-imports cannot re-fire them.
        for rid in one_time_completed {
            let disable = self
                .invoke_op(
                    "group_automation_manage",
                    serde_json::json!({
                        "group_id": gid,
                        "by": "user",
                        "actions": [{"type": "set_rule_enabled", "rule_id": rid, "enabled": false}],
                    }),
                )
                .await;
            if let Err(e) = disable {
                debug!(gid, rule_id = %rid, error = %e, "failed to auto-disable one-time rule");
                let mut state = match load_automation_state(&self.home, gid) {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                let st = state.rule_mut(&rid);
                st.last_error_at = now_iso.clone();
                st.last_error = format!("auto-disable failed: {e}").chars().take(500).collect();
                let _ = save_automation_state(&self.home, gid, &mut state);
            }
        }
    }

    async fn execute_group_state_action(&self, group: &GroupDoc, target_state: &str) -> Result<(), String> {
        let gid = group.group_id.as_str();
        let target = target_state.trim().to_lowercase();
        match target.as_str() {
            "stopped" => self
                .invoke_op("group_stop", serde_json::json!({"group_id": gid, "by": "user"}))
                .await
                .map(|_| ()),
            "active" | "idle" | "paused" => {
                if target == "active" {
                    let running = load_group(&self.home, gid)
                        .ok()
                        .flatten()
                        .map(|g| g.running)
                        .unwrap_or(false);
                    if !running {
                        self.invoke_op(
                            "group_start",
                            serde_json::json!({"group_id": gid, "by": "user"}),
                        )
                        .await?;
                    }
                }
                self.invoke_op(
                    "group_set_state",
                    serde_json::json!({"group_id": gid, "state": target, "by": "user"}),
                )
                .await
                .map(|_| ())
            }
            other => Err(format!("unsupported group state: {other}")),
        }
    }

    async fn execute_actor_control_action(
        &self,
        group: &GroupDoc,
        operation: &str,
        targets: &[String],
    ) -> Result<(), String> {
        let op = match operation.trim().to_lowercase().as_str() {
            "start" => "actor_start",
            "stop" => "actor_stop",
            "restart" => "actor_restart",
            other => return Err(format!("unsupported actor operation: {other}")),
        };
        let actor_ids = resolve_actor_control_targets(group, targets);
        if actor_ids.is_empty() {
            return Err("no actor targets resolved".to_string());
        }
        let gid = group.group_id.as_str();
        let mut success = 0usize;
        let mut errors: Vec<String> = Vec::new();
        for aid in actor_ids {
            match self
                .invoke_op(
                    op,
                    serde_json::json!({"group_id": gid, "actor_id": aid, "by": "user"}),
                )
                .await
            {
                Ok(_) => success += 1,
                Err(e) => errors.push(format!("{aid}: {e}")),
            }
        }
        if success > 0 {
            Ok(())
        } else if !errors.is_empty() {
            Err(errors.into_iter().take(3).collect::<Vec<_>>().join(" ; "))
        } else {
            Err("no actor operations applied".to_string())
        }
    }
}

/// Record a rule evaluation error (deduplicated). Returns whether the
/// state changed.
fn record_rule_error(
    state: &mut cccc_storage::AutomationStateDoc,
    rule_id: &str,
    now_iso: &str,
    msg: String,
) -> bool {
    let st = state.rule_mut(rule_id);
    let msg: String = msg.chars().take(500).collect();
    if st.last_error == msg {
        return false;
    }
    st.last_error_at = now_iso.to_string();
    st.last_error = msg;
    true
}

fn nudge_repeat_count(state: &cccc_storage::AutomationStateDoc, actor_id: &str, item_key: &str) -> i64 {
    state
        .actors
        .get(actor_id)
        .and_then(|st| st.nudge_items.get(item_key))
        .map(|item| i64::from(item.count))
        .unwrap_or(0)
}

/// Timestamp of the newest event in the ledger.
fn last_group_activity(home: &Home, group_id: &str) -> Option<DateTime<Utc>> {
    cccc_storage::last_event(&home.ledger_path(group_id)).and_then(|ev| parse_utc_iso(&ev.ts))
}

/// Timestamp of the newest event authored by `actor_id`.
fn last_actor_activity(home: &Home, group_id: &str, actor_id: &str) -> Option<DateTime<Utc>> {
    let mut last = None;
    for ev in iter_events(&home.ledger_path(group_id)) {
        if ev.by == actor_id {
            if let Some(dt) = parse_utc_iso(&ev.ts) {
                last = Some(dt);
            }
        }
    }
    last
}

/// Most recent `Next:` declaration in the actor's chat history.
fn actor_declared_next(home: &Home, group_id: &str, actor_id: &str) -> Option<(String, DateTime<Utc>)> {
    let mut last: Option<(String, DateTime<Utc>)> = None;
    for ev in iter_events(&home.ledger_path(group_id)) {
        if !ev.kind.is_chat_message() || ev.by != actor_id {
            continue;
        }
        let Some(data) = ev.chat_message() else { continue };
        let Some(dt) = parse_utc_iso(&ev.ts) else { continue };
        for line in data.text.lines() {
            let trimmed = line.trim();
            if trimmed.to_lowercase().starts_with("next:") {
                last = Some((trimmed.to_string(), dt));
                break;
            }
        }
    }
    last
}

/// Expand `@all | @foreman | @peers | <actor_id>` control targets.
fn resolve_actor_control_targets(group: &GroupDoc, targets: &[String]) -> Vec<String> {
    let actor_ids: Vec<String> = group
        .actors
        .iter()
        .filter(|a| !a.id.is_user())
        .map(|a| a.id.as_str().to_string())
        .collect();
    if actor_ids.is_empty() {
        return Vec::new();
    }
    let foreman_id = group.foreman_id().map(|f| f.as_str().to_string());
    let mut selected: HashSet<String> = HashSet::new();
    for token in targets {
        match token.trim() {
            "" => {}
            "@all" => selected.extend(actor_ids.iter().cloned()),
            "@foreman" => {
                if let Some(fid) = &foreman_id {
                    selected.insert(fid.clone());
                }
            }
            "@peers" => {
                for aid in &actor_ids {
                    if foreman_id.as_deref() != Some(aid.as_str()) {
                        selected.insert(aid.clone());
                    }
                }
            }
            other => {
                if actor_ids.iter().any(|a| a == other) {
                    selected.insert(other.to_string());
                }
            }
        }
    }
    actor_ids.into_iter().filter(|a| selected.contains(a)).collect()
}

/// Substitute `{{var}}` placeholders; unknown vars render empty.
fn render_snippet(template: &str, context: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some((_, value)) = context.iter().find(|(k, _)| *k == key) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[path = "automation_tests.rs"]
mod tests;
