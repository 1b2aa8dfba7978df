// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monotonic ledger event-id generation.
//!
//! Ids are ULID-like: `ev_` + 10 chars of Crockford-base32 millisecond
//! timestamp + 4 chars of per-process sequence + 6 chars of random tail.
//! Fixed width makes lexical order equal append order. The generator never
//! goes backwards even if the wall clock does: each id is clamped to be
//! strictly greater than the previous one.

use crate::id::EventId;
use parking_lot::Mutex;
use std::sync::Arc;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const TIME_CHARS: usize = 10;
const SEQ_CHARS: usize = 4;
const TAIL_CHARS: usize = 6;

/// Generates strictly increasing event ids.
///
/// Cheap to clone; clones share the same floor so concurrent appends through
/// one ledger stay ordered.
#[derive(Clone)]
pub struct EventIdGen {
    inner: Arc<Mutex<GenState>>,
}

struct GenState {
    last_ms: u64,
    seq: u32,
    /// Floor id from the existing ledger tail; generated ids must exceed it.
    floor: String,
}

impl Default for EventIdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl EventIdGen {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(GenState {
                last_ms: 0,
                seq: 0,
                floor: String::new(),
            })),
        }
    }

    /// Seed the monotonic floor from the last id already in the ledger, so a
    /// restarted daemon keeps ids strictly increasing even across clock steps.
    pub fn seed_floor(&self, last_id: &EventId) {
        let mut st = self.inner.lock();
        if last_id.as_str() > st.floor.as_str() {
            st.floor = last_id.as_str().to_string();
        }
    }

    pub fn next(&self, now_ms: u64) -> EventId {
        let mut st = self.inner.lock();
        let ms = now_ms.max(st.last_ms);
        if ms == st.last_ms {
            st.seq = st.seq.wrapping_add(1);
        } else {
            st.last_ms = ms;
            st.seq = 0;
        }
        let mut id = format!(
            "ev_{}{}{}",
            encode_fixed(st.last_ms, TIME_CHARS),
            encode_fixed(u64::from(st.seq), SEQ_CHARS),
            random_tail()
        );
        // Clock regressions or a denser foreign ledger tail can still produce
        // an id at or below the floor; bump the sequence until we clear it.
        while !st.floor.is_empty() && id <= st.floor {
            st.seq = st.seq.wrapping_add(1);
            id = format!(
                "ev_{}{}{}",
                encode_fixed(st.last_ms, TIME_CHARS),
                encode_fixed(u64::from(st.seq), SEQ_CHARS),
                random_tail()
            );
        }
        st.floor = id.clone();
        EventId::new(id)
    }
}

fn encode_fixed(mut value: u64, width: usize) -> String {
    let mut buf = vec![b'0'; width];
    for slot in buf.iter_mut().rev() {
        *slot = CROCKFORD[(value & 0x1f) as usize];
        value >>= 5;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn random_tail() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let mut out = String::with_capacity(TAIL_CHARS);
    for b in bytes.iter().take(TAIL_CHARS) {
        out.push(CROCKFORD[(b & 0x1f) as usize] as char);
    }
    out
}

#[cfg(test)]
#[path = "event_id_tests.rs"]
mod tests;
