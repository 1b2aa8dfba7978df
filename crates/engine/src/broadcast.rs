// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event broadcaster: fan-out of ledger appends to live subscribers.
//!
//! Wired as the ledger append hook. Delivery to each subscriber is
//! ordered, filtered (kinds allow-list + permission scope), and never
//! blocks the append path: a subscriber whose bounded buffer fills is
//! dropped from the registry and handed a final overflow frame instead of
//! stalling the writer.

use cccc_core::{is_message_for_actor, GroupDoc, LedgerEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Bounded per-subscriber buffer.
const SUBSCRIBER_BUFFER: usize = 256;

pub type SubscriptionId = u64;

/// One frame on a subscription channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Event(LedgerEvent),
    /// The subscriber fell behind; the stream ends after this frame.
    Overflow,
}

struct Subscriber {
    id: SubscriptionId,
    by: String,
    kinds: Option<HashSet<String>>,
    tx: mpsc::Sender<StreamFrame>,
}

#[derive(Default)]
struct Registry {
    by_group: HashMap<String, Vec<Subscriber>>,
    next_id: SubscriptionId,
}

/// Process-wide subscriber registry keyed by group id.
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live subscription. Catch-up events are the caller's
    /// responsibility and must be sent before consuming this receiver.
    pub fn subscribe(
        &self,
        group_id: &str,
        by: &str,
        kinds: Option<HashSet<String>>,
    ) -> (SubscriptionId, mpsc::Receiver<StreamFrame>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut reg = self.inner.lock();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.by_group.entry(group_id.to_string()).or_default().push(Subscriber {
            id,
            by: by.to_string(),
            kinds,
            tx,
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, group_id: &str, id: SubscriptionId) {
        let mut reg = self.inner.lock();
        if let Some(subs) = reg.by_group.get_mut(group_id) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                reg.by_group.remove(group_id);
            }
        }
    }

    pub fn subscriber_count(&self, group_id: &str) -> usize {
        self.inner
            .lock()
            .by_group
            .get(group_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Fan an appended event out to matching subscribers. Called
    /// synchronously from the append hook; never blocks.
    pub fn publish(&self, group: &GroupDoc, event: &LedgerEvent) {
        let mut overflowed: Vec<Subscriber> = Vec::new();
        {
            let mut reg = self.inner.lock();
            let Some(subs) = reg.by_group.get_mut(group.group_id.as_str()) else {
                return;
            };
            let mut i = 0;
            while i < subs.len() {
                let sub = &subs[i];
                if !Self::event_visible(group, &sub.by, sub.kinds.as_ref(), event) {
                    i += 1;
                    continue;
                }
                match sub.tx.try_send(StreamFrame::Event(event.clone())) {
                    Ok(()) => i += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(
                            group_id = %group.group_id,
                            by = %subs[i].by,
                            "slow events subscriber, disconnecting"
                        );
                        overflowed.push(subs.remove(i));
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        subs.remove(i);
                    }
                }
            }
            if subs.is_empty() {
                reg.by_group.remove(group.group_id.as_str());
            }
        }
        // Deliver the overflow marker off the append path; the receiver
        // sees it once it finally drains its backlog.
        for sub in overflowed {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = sub.tx.send(StreamFrame::Overflow).await;
                });
            }
        }
    }

    /// Permission + kind filter for one subscriber.
    ///
    /// `user` and the foreman see everything; other actors see group-scope
    /// lifecycle events plus chat/notify they authored or that is
    /// addressed to them.
    fn event_visible(
        group: &GroupDoc,
        by: &str,
        kinds: Option<&HashSet<String>>,
        event: &LedgerEvent,
    ) -> bool {
        if let Some(kinds) = kinds {
            if !kinds.contains(event.kind.as_str()) {
                return false;
            }
        }
        if by.is_empty() || by == "user" {
            return true;
        }
        if group.foreman_id().is_some_and(|f| f.as_str() == by) {
            return true;
        }
        match event.kind.family() {
            "chat" | "system" => {
                event.by == by || is_message_for_actor(group, by, event) || referenced_actor(event) == Some(by)
            }
            _ => true,
        }
    }
}

/// Actor referenced by a read/ack marker's payload.
fn referenced_actor(event: &LedgerEvent) -> Option<&str> {
    event.data.get("actor_id").and_then(|v| v.as_str())
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
