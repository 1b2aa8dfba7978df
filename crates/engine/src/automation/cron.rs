// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field cron matching with IANA timezones.
//!
//! `minute hour day-of-month month day-of-week`, evaluated at minute
//! boundaries in the rule's timezone. Day-of-week uses 0–7 with both 0 and
//! 7 meaning Sunday. When both day fields are restricted, a time matches
//! if *either* matches (Vixie cron union semantics).

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CronError {
    #[error("cron expression must have 5 fields, got {0}")]
    FieldCount(usize),
    #[error("invalid {field} value: {value}")]
    BadValue { field: &'static str, value: String },
    #[error("unknown timezone: {0}")]
    BadTimezone(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSpec {
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    days_of_week: BTreeSet<u32>,
    dom_any: bool,
    dow_any: bool,
}

impl CronSpec {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }
        let minutes = parse_field(fields[0], 0, 59, "minute")?;
        let hours = parse_field(fields[1], 0, 23, "hour")?;
        let (days_of_month, dom_any) = parse_field_any(fields[2], 1, 31, "day-of-month")?;
        let months = parse_field(fields[3], 1, 12, "month")?;
        let (mut days_of_week, dow_any) = parse_field_any(fields[4], 0, 7, "day-of-week")?;
        // 7 is an alias for Sunday.
        if days_of_week.remove(&7) {
            days_of_week.insert(0);
        }
        Ok(Self {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_any,
            dow_any,
        })
    }

    /// Match a local wall-clock minute.
    pub fn matches_local<T: TimeZone>(&self, local: &DateTime<T>) -> bool {
        if !self.minutes.contains(&local.minute()) {
            return false;
        }
        if !self.hours.contains(&local.hour()) {
            return false;
        }
        if !self.months.contains(&local.month()) {
            return false;
        }
        let dom_hit = self.days_of_month.contains(&local.day());
        let dow_hit = self
            .days_of_week
            .contains(&local.weekday().num_days_from_sunday());
        match (self.dom_any, self.dow_any) {
            (true, true) => true,
            (true, false) => dow_hit,
            (false, true) => dom_hit,
            // Both restricted: either may match (Vixie union).
            (false, false) => dom_hit || dow_hit,
        }
    }
}

/// Resolve an IANA timezone name.
pub fn resolve_timezone(name: &str) -> Result<Tz, CronError> {
    let n = name.trim();
    let n = if n.is_empty() { "UTC" } else { n };
    n.parse::<Tz>().map_err(|_| CronError::BadTimezone(n.to_string()))
}

/// The minute slot (UTC instant truncated to the zone's minute boundary)
/// this expression matches at `now_utc`, if any.
pub fn matching_slot(spec: &CronSpec, tz: Tz, now_utc: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local = now_utc.with_timezone(&tz);
    let slot_local = local.with_second(0)?.with_nanosecond(0)?;
    if spec.matches_local(&slot_local) {
        Some(slot_local.with_timezone(&Utc))
    } else {
        None
    }
}

fn parse_field(
    raw: &str,
    min_v: u32,
    max_v: u32,
    field: &'static str,
) -> Result<BTreeSet<u32>, CronError> {
    parse_field_any(raw, min_v, max_v, field).map(|(set, _)| set)
}

/// Parse one field; the bool is "this field is `*` (unrestricted)".
fn parse_field_any(
    raw: &str,
    min_v: u32,
    max_v: u32,
    field: &'static str,
) -> Result<(BTreeSet<u32>, bool), CronError> {
    let raw = raw.trim();
    let bad = || CronError::BadValue {
        field,
        value: raw.to_string(),
    };
    let mut out = BTreeSet::new();
    let mut is_any = true;

    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(bad());
        }
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| bad())?;
                if step == 0 {
                    return Err(bad());
                }
                (r, step)
            }
            None => (part, 1),
        };
        let (lo, hi) = if range_part == "*" {
            (min_v, max_v)
        } else {
            is_any = false;
            match range_part.split_once('-') {
                Some((a, b)) => {
                    let a: u32 = a.trim().parse().map_err(|_| bad())?;
                    let b: u32 = b.trim().parse().map_err(|_| bad())?;
                    (a, b)
                }
                None => {
                    let v: u32 = range_part.parse().map_err(|_| bad())?;
                    (v, v)
                }
            }
        };
        if lo < min_v || hi > max_v || lo > hi {
            return Err(bad());
        }
        let mut v = lo;
        while v <= hi {
            out.insert(v);
            v += step;
        }
        // A step over `*` still restricts the field.
        if step != 1 {
            is_any = false;
        }
    }
    if out.is_empty() {
        return Err(bad());
    }
    Ok((out, is_any && raw == "*"))
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
