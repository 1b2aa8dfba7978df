// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn local(tz: &str, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<chrono_tz::Tz> {
    let tz = resolve_timezone(tz).unwrap();
    tz.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
}

#[yare::parameterized(
    every_minute   = { "* * * * *" },
    morning        = { "0 9 * * *" },
    weekdays       = { "30 8 * * 1-5" },
    steps          = { "*/15 * * * *" },
    lists          = { "0,30 9,17 * * *" },
    sunday_seven   = { "0 0 * * 7" },
)]
fn valid_expressions_parse(expr: &str) {
    assert!(CronSpec::parse(expr).is_ok(), "{expr} should parse");
}

#[yare::parameterized(
    too_few        = { "* * * *" },
    too_many       = { "* * * * * *" },
    bad_minute     = { "61 * * * *" },
    bad_dow        = { "* * * * 9" },
    zero_step      = { "*/0 * * * *" },
    reversed_range = { "9-3 * * * *" },
    garbage        = { "a b c d e" },
)]
fn invalid_expressions_fail(expr: &str) {
    assert!(CronSpec::parse(expr).is_err(), "{expr} should fail");
}

#[test]
fn minute_and_hour_match() {
    let spec = CronSpec::parse("30 9 * * *").unwrap();
    assert!(spec.matches_local(&local("UTC", 2026, 3, 2, 9, 30)));
    assert!(!spec.matches_local(&local("UTC", 2026, 3, 2, 9, 31)));
    assert!(!spec.matches_local(&local("UTC", 2026, 3, 2, 10, 30)));
}

#[test]
fn weekday_range_matches() {
    // 2026-03-02 is a Monday.
    let spec = CronSpec::parse("0 9 * * 1-5").unwrap();
    assert!(spec.matches_local(&local("UTC", 2026, 3, 2, 9, 0)));
    // Sunday 2026-03-01 is excluded.
    assert!(!spec.matches_local(&local("UTC", 2026, 3, 1, 9, 0)));
}

#[test]
fn sunday_is_zero_and_seven() {
    let zero = CronSpec::parse("0 0 * * 0").unwrap();
    let seven = CronSpec::parse("0 0 * * 7").unwrap();
    let sunday = local("UTC", 2026, 3, 1, 0, 0);
    assert!(zero.matches_local(&sunday));
    assert!(seven.matches_local(&sunday));
}

#[test]
fn dom_dow_union_when_both_restricted() {
    // Vixie semantics: "0 0 13 * 5" fires on the 13th OR on Fridays.
    let spec = CronSpec::parse("0 0 13 * 5").unwrap();
    // 2026-03-13 is a Friday (both match).
    assert!(spec.matches_local(&local("UTC", 2026, 3, 13, 0, 0)));
    // 2026-03-06 is a Friday but not the 13th.
    assert!(spec.matches_local(&local("UTC", 2026, 3, 6, 0, 0)));
    // 2026-04-13 is a Monday but is the 13th.
    assert!(spec.matches_local(&local("UTC", 2026, 4, 13, 0, 0)));
    // 2026-03-04 is a Wednesday, not the 13th.
    assert!(!spec.matches_local(&local("UTC", 2026, 3, 4, 0, 0)));
}

#[test]
fn dom_restricted_dow_any_uses_dom_only() {
    let spec = CronSpec::parse("0 0 13 * *").unwrap();
    assert!(spec.matches_local(&local("UTC", 2026, 4, 13, 0, 0)));
    // A Friday that is not the 13th must not match.
    assert!(!spec.matches_local(&local("UTC", 2026, 3, 6, 0, 0)));
}

#[test]
fn timezone_shifts_the_slot() {
    let spec = CronSpec::parse("0 9 * * *").unwrap();
    let tz = resolve_timezone("Asia/Tokyo").unwrap();
    // 00:00 UTC == 09:00 Asia/Tokyo.
    let now = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 30).single().unwrap();
    let slot = matching_slot(&spec, tz, now).unwrap();
    assert_eq!(slot, chrono::Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).single().unwrap());
    // 09:00 UTC is 18:00 Tokyo; no match.
    let now = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 30).single().unwrap();
    assert!(matching_slot(&spec, tz, now).is_none());
}

#[test]
fn unknown_timezone_is_rejected() {
    assert_eq!(
        resolve_timezone("Mars/Olympus"),
        Err(CronError::BadTimezone("Mars/Olympus".to_string()))
    );
    // Empty falls back to UTC.
    assert!(resolve_timezone("").is_ok());
}

#[test]
fn step_over_star_restricts_field() {
    let spec = CronSpec::parse("*/20 * * * *").unwrap();
    assert!(spec.matches_local(&local("UTC", 2026, 3, 2, 5, 0)));
    assert!(spec.matches_local(&local("UTC", 2026, 3, 2, 5, 40)));
    assert!(!spec.matches_local(&local("UTC", 2026, 3, 2, 5, 25)));
}
