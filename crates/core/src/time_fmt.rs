// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RFC3339 timestamp helpers and human-readable durations.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time as an RFC3339 string with a trailing `Z`.
pub fn utc_now_iso() -> String {
    format_utc_iso(Utc::now())
}

/// Format a UTC instant as RFC3339 with millisecond precision.
pub fn format_utc_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 timestamp, tolerating missing offsets. Returns `None` on
/// anything unparseable; callers treat that as "no timestamp".
pub fn parse_utc_iso(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Format seconds as a short human-readable duration: `"5s"`, `"2m"`, `"1h30m"`, `"3d"`.
pub fn format_elapsed(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        if m > 0 {
            format!("{}h{}m", h, m)
        } else {
            format!("{}h", h)
        }
    } else {
        format!("{}d", secs / 86400)
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
