// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::EventIdGen;
use crate::id::EventId;

#[test]
fn ids_have_prefix_and_fixed_width() {
    let g = EventIdGen::new();
    let id = g.next(1_700_000_000_000);
    assert!(id.as_str().starts_with("ev_"));
    assert_eq!(id.as_str().len(), 3 + 10 + 4 + 6);
}

#[test]
fn ids_increase_within_one_millisecond() {
    let g = EventIdGen::new();
    let mut prev = g.next(1_700_000_000_000);
    for _ in 0..100 {
        let next = g.next(1_700_000_000_000);
        assert!(next > prev, "{next} should sort after {prev}");
        prev = next;
    }
}

#[test]
fn ids_increase_across_milliseconds() {
    let g = EventIdGen::new();
    let a = g.next(1_700_000_000_000);
    let b = g.next(1_700_000_000_001);
    assert!(b > a);
}

#[test]
fn clock_regression_does_not_go_backwards() {
    let g = EventIdGen::new();
    let a = g.next(1_700_000_000_500);
    let b = g.next(1_700_000_000_000);
    assert!(b > a);
}

#[test]
fn seeded_floor_is_respected() {
    let g = EventIdGen::new();
    // A floor far in the future relative to the supplied clock.
    let floor = EventIdGen::new().next(1_900_000_000_000);
    g.seed_floor(&floor);
    let id = g.next(1_700_000_000_000);
    assert!(id > floor);
}

#[test]
fn seed_floor_ignores_smaller_ids() {
    let g = EventIdGen::new();
    let a = g.next(1_700_000_000_000);
    g.seed_floor(&EventId::new("ev_0"));
    let b = g.next(1_700_000_000_000);
    assert!(b > a);
}

#[test]
fn clones_share_the_floor() {
    let g = EventIdGen::new();
    let g2 = g.clone();
    let a = g.next(1_700_000_000_000);
    let b = g2.next(1_700_000_000_000);
    assert!(b > a);
}
