// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recipient token resolution and the inbox addressing predicate.
//!
//! Canonical tokens: `@all`, `@peers`, `@foreman`, `user` (or `@user`), and
//! bare actor ids. A sender is never a recipient of their own message.

use crate::event::{EventKind, LedgerEvent};
use crate::group::GroupDoc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipientError {
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),
}

/// Canonicalize recipient tokens against the group roster.
///
/// Group tokens pass through unchanged; `@<actor_id>` collapses to the bare
/// id; unknown actor ids are an error. Duplicates are removed, first
/// occurrence wins.
pub fn resolve_recipient_tokens(
    group: &GroupDoc,
    tokens: &[String],
) -> Result<Vec<String>, RecipientError> {
    let mut out: Vec<String> = Vec::new();
    for raw in tokens {
        let t = raw.trim();
        if t.is_empty() {
            continue;
        }
        let canon = match t {
            "@all" | "@peers" | "@foreman" => t.to_string(),
            "user" | "@user" => "user".to_string(),
            other => {
                let bare = other.strip_prefix('@').unwrap_or(other);
                if group.find_actor(bare).is_none() {
                    return Err(RecipientError::UnknownRecipient(other.to_string()));
                }
                bare.to_string()
            }
        };
        if !out.iter().any(|x| x == &canon) {
            out.push(canon);
        }
    }
    Ok(out)
}

/// Whether the token list addresses any agent (as opposed to only the user).
pub fn targets_any_agent(to: &[String]) -> bool {
    if to.is_empty() {
        return true;
    }
    to.iter().any(|t| t != "user" && t != "@user")
}

/// Expand tokens to the enabled agent actor ids they cover.
pub fn enabled_recipient_actor_ids(group: &GroupDoc, to: &[String]) -> Vec<String> {
    let foreman_id = group.foreman_id();
    let mut out: Vec<String> = Vec::new();
    let mut push = |id: &str| {
        if !out.iter().any(|x| x == id) {
            out.push(id.to_string());
        }
    };
    let tokens: Vec<&str> = if to.is_empty() {
        vec!["@all"]
    } else {
        to.iter().map(|s| s.as_str()).collect()
    };
    for t in tokens {
        match t {
            "@all" => {
                for a in group.enabled_actors() {
                    push(a.id.as_str());
                }
            }
            "@peers" => {
                for a in group.enabled_actors() {
                    if foreman_id.as_ref().map(|f| f.as_str()) != Some(a.id.as_str()) {
                        push(a.id.as_str());
                    }
                }
            }
            "@foreman" => {
                if let Some(f) = &foreman_id {
                    push(f.as_str());
                }
            }
            "user" | "@user" => {}
            other => {
                if group.find_actor(other).is_some_and(|a| a.enabled) {
                    push(other);
                }
            }
        }
    }
    out
}

/// Does this chat/notify event land in `actor_id`'s inbox?
///
/// Chat: evaluates recipient tokens against the actor's id and effective
/// role; the author never sees their own message. Notify: matched by
/// `target_actor_id`, broadcast when unset. Other kinds never match.
pub fn is_message_for_actor(group: &GroupDoc, actor_id: &str, event: &LedgerEvent) -> bool {
    match event.kind {
        EventKind::ChatMessage => {
            if event.by == actor_id {
                return false;
            }
            let Some(data) = event.chat_message() else {
                return false;
            };
            let to = if data.to.is_empty() {
                vec!["@all".to_string()]
            } else {
                data.to
            };
            let foreman_id = group.foreman_id();
            let is_user = actor_id == "user";
            for t in &to {
                match t.as_str() {
                    "@all" => {
                        // Broadcast covers the user and every enabled agent.
                        if is_user || group.find_actor(actor_id).is_some_and(|a| a.enabled) {
                            return true;
                        }
                    }
                    "@peers" => {
                        if !is_user
                            && group.find_actor(actor_id).is_some_and(|a| a.enabled)
                            && foreman_id.as_ref().map(|f| f.as_str()) != Some(actor_id)
                        {
                            return true;
                        }
                    }
                    "@foreman" => {
                        if foreman_id.as_ref().map(|f| f.as_str()) == Some(actor_id) {
                            return true;
                        }
                    }
                    "user" | "@user" => {
                        if is_user {
                            return true;
                        }
                    }
                    other => {
                        if other == actor_id {
                            return true;
                        }
                    }
                }
            }
            false
        }
        EventKind::SystemNotify => {
            let Some(notify) = event.notify() else {
                return false;
            };
            match notify.target_actor_id.as_deref() {
                Some(target) => target == actor_id,
                None => actor_id != "user",
            }
        }
        _ => false,
    }
}

/// Default recipients for a reply: the original author, falling back to the
/// original recipient list minus the replier.
pub fn default_reply_recipients(
    group: &GroupDoc,
    by: &str,
    original: &LedgerEvent,
) -> Vec<String> {
    let author = original.by.trim();
    if !author.is_empty() && author != by && author != "system" {
        return vec![author.to_string()];
    }
    let Some(data) = original.chat_message() else {
        return Vec::new();
    };
    data.to
        .into_iter()
        .filter(|t| t != by)
        .filter(|t| {
            matches!(t.as_str(), "@all" | "@peers" | "@foreman" | "user" | "@user")
                || group.find_actor(t).is_some()
        })
        .collect()
}

#[cfg(test)]
#[path = "recipient_tests.rs"]
mod tests;
