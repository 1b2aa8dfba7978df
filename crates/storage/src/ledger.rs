// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL ledger, one file per group.
//!
//! Append protocol: compose the event with a fresh monotonic id and UTC
//! timestamp, serialize to a single line, append with `O_APPEND` semantics
//! and flush, then invoke the append hook synchronously. Readers tolerate a
//! partial final line (an interrupted append) by stopping before it; the
//! next append completes on a fresh line.

use cccc_core::{EventId, EventIdGen, EventKind, GroupId, LedgerEvent};
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Callback invoked synchronously after every append (event broadcaster).
pub type AppendHook = Arc<dyn Fn(&LedgerEvent) + Send + Sync>;

/// Writer half of the ledger: id generation plus the append hook.
///
/// One instance serves all groups. Appends hold an internal mutex across
/// id assignment, write, and hook so line order always equals id order
/// even when background tasks append alongside op handlers.
#[derive(Clone, Default)]
pub struct LedgerService {
    idgen: EventIdGen,
    append_lock: Arc<Mutex<()>>,
    /// Ledger files whose tail already seeded the id floor.
    seeded: Arc<Mutex<std::collections::HashSet<std::path::PathBuf>>>,
    hook: Arc<Mutex<Option<AppendHook>>>,
}

impl LedgerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire the append hook; replaces any previous hook.
    pub fn set_append_hook(&self, hook: AppendHook) {
        *self.hook.lock() = Some(hook);
    }

    /// Append one event and return it fully populated.
    pub fn append(
        &self,
        path: &Path,
        kind: EventKind,
        group_id: &GroupId,
        scope_key: &str,
        by: &str,
        data: serde_json::Value,
    ) -> Result<LedgerEvent, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _append_guard = self.append_lock.lock();
        // First append per file after a restart: seed the monotonic floor
        // from the tail so ids keep increasing across daemon lifetimes.
        if self.seeded.lock().insert(path.to_path_buf()) {
            if let Some(last) = last_event(path) {
                self.idgen.seed_floor(&last.id);
            }
        }
        let now = Utc::now();
        let event = LedgerEvent {
            id: self.idgen.next(now.timestamp_millis().max(0) as u64),
            ts: cccc_core::time_fmt::format_utc_iso(now),
            kind,
            group_id: group_id.clone(),
            scope_key: scope_key.to_string(),
            by: by.to_string(),
            data,
        };
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;
        file.flush()?;
        file.sync_data()?;

        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&event);
        }
        Ok(event)
    }
}

/// Iterate all parseable events in append order.
///
/// Unparseable or partial lines are skipped with a warning; a missing file
/// yields nothing.
pub fn iter_events(path: &Path) -> impl Iterator<Item = LedgerEvent> {
    let reader = std::fs::File::open(path).ok().map(BufReader::new);
    LedgerIter {
        reader,
        offset: 0,
        path: path.display().to_string(),
    }
}

struct LedgerIter {
    reader: Option<BufReader<std::fs::File>>,
    offset: u64,
    path: String,
}

impl Iterator for LedgerIter {
    type Item = LedgerEvent;

    fn next(&mut self) -> Option<LedgerEvent> {
        let reader = self.reader.as_mut()?;
        loop {
            let mut line = String::new();
            let n = match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(_) => return None,
            };
            self.offset += n as u64;
            // A line without a trailing newline is an append still in
            // flight; stop here and let the next pass pick it up complete.
            if !line.ends_with('\n') {
                return None;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEvent>(trimmed) {
                Ok(ev) => return Some(ev),
                Err(e) => {
                    warn!(path = %self.path, offset = self.offset, error = %e, "skipping corrupt ledger line");
                    continue;
                }
            }
        }
    }
}

/// Scan for a specific event id. O(n) by design; there is no index.
pub fn find_event(path: &Path, event_id: &str) -> Option<LedgerEvent> {
    iter_events(path).find(|ev| ev.id == event_id)
}

/// The last parseable event in the file.
pub fn last_event(path: &Path) -> Option<LedgerEvent> {
    iter_events(path).last()
}

/// Last `n` events in append order.
pub fn tail_events(path: &Path, n: usize) -> Vec<LedgerEvent> {
    let mut buf: std::collections::VecDeque<LedgerEvent> = std::collections::VecDeque::new();
    for ev in iter_events(path) {
        if buf.len() == n {
            buf.pop_front();
        }
        buf.push_back(ev);
    }
    buf.into_iter().collect()
}

/// Events strictly after the `(since_event_id, since_ts)` resume point.
///
/// Id comparison wins when the id is present (ids are lexically ordered by
/// append); the timestamp is the fallback for archived/foreign cursors.
pub fn events_after(path: &Path, since_event_id: &str, since_ts: &str) -> Vec<LedgerEvent> {
    let since_id = since_event_id.trim();
    let since_ts = since_ts.trim();
    iter_events(path)
        .filter(|ev| {
            if !since_id.is_empty() {
                ev.id.as_str() > since_id
            } else if !since_ts.is_empty() {
                ev.ts.as_str() > since_ts
            } else {
                true
            }
        })
        .collect()
}

/// Resume helper used by cursors: `(event_id, ts)` of the last event.
pub fn last_cursor_position(path: &Path) -> Option<(EventId, String)> {
    last_event(path).map(|ev| (ev.id, ev.ts))
}

/// Read events starting at a byte offset, stopping before any partial
/// final line. Returns the events plus the next offset to resume from.
pub fn events_from_offset(path: &Path, offset: u64) -> (Vec<LedgerEvent>, u64) {
    use std::io::{Read, Seek, SeekFrom};
    let mut events = Vec::new();
    let mut pos = offset;
    let Ok(mut file) = std::fs::File::open(path) else {
        return (events, pos);
    };
    if file.seek(SeekFrom::Start(offset)).is_err() {
        return (events, pos);
    }
    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).is_err() {
        return (events, pos);
    }
    let mut line_start = 0usize;
    for (i, b) in buf.iter().enumerate() {
        if *b != b'\n' {
            continue;
        }
        let line = &buf[line_start..i];
        line_start = i + 1;
        pos = offset + line_start as u64;
        let trimmed = String::from_utf8_lossy(line);
        let trimmed = trimmed.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(ev) = serde_json::from_str::<LedgerEvent>(trimmed) {
            events.push(ev);
        }
    }
    (events, pos)
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
