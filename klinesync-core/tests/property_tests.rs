//! Property tests for the reconcile and merge invariants.
//!
//! Uses proptest to verify:
//! 1. Row conservation — one output row per valid input date, same order
//! 2. Forward-fill — a factor is only ever carried from an earlier date
//! 3. Append monotonicity — history dates stay strictly increasing and
//!    existing rows survive every merge unchanged

use chrono::NaiveDate;
use klinesync_core::provider::{AdjustedBar, AdjustmentPoint, DailyBar};
use klinesync_core::reconcile::{reconcile, DEFAULT_ADJ_FACTOR};
use klinesync_core::merge;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn day(offset: u64) -> NaiveDate {
    base_date() + chrono::Duration::days(offset as i64)
}

fn bar_on(date: NaiveDate, close: f64) -> DailyBar {
    DailyBar {
        date,
        symbol: "000001".into(),
        open: close,
        high: close * 1.05,
        low: close * 0.95,
        close,
        volume: 1_000,
        amount: close * 1_000.0,
    }
}

fn adjusted_on(date: NaiveDate, close: f64, factor: f64) -> AdjustmentPoint {
    AdjustmentPoint {
        date,
        raw_close: close,
        adjusted_close: close * factor,
    }
}

// ── Strategies ──────────────────────────────────────────────────────

/// Unique, sorted day offsets within a ~4-year window.
fn arb_offsets(max_len: usize) -> impl Strategy<Value = BTreeSet<u64>> {
    proptest::collection::btree_set(0u64..1500, 1..max_len)
}

fn arb_close() -> impl Strategy<Value = f64> {
    (1.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_factor() -> impl Strategy<Value = f64> {
    (0.05..1.0_f64).prop_map(|f| (f * 1000.0).round() / 1000.0)
}

proptest! {
    /// Every valid raw date produces exactly one output row, in order.
    #[test]
    fn reconcile_conserves_rows(
        offsets in arb_offsets(50),
        close in arb_close(),
        adj_offsets in arb_offsets(20),
        factor in arb_factor(),
    ) {
        let raw: Vec<DailyBar> = offsets.iter().map(|&o| bar_on(day(o), close)).collect();
        let adjustments: Vec<AdjustmentPoint> = adj_offsets
            .iter()
            .map(|&o| adjusted_on(day(o), close, factor))
            .collect();

        let out = reconcile(raw, &adjustments);

        prop_assert_eq!(out.bars.len(), offsets.len());
        prop_assert_eq!(out.bars_skipped, 0);
        let dates: Vec<NaiveDate> = out.bars.iter().map(|b| b.date).collect();
        let expected: Vec<NaiveDate> = offsets.iter().map(|&o| day(o)).collect();
        prop_assert_eq!(dates, expected);
    }

    /// The factor at each date equals the factor of the latest adjustment
    /// date at or before it — never one from the future — and defaults to
    /// 1.0 before the first adjustment date.
    #[test]
    fn reconcile_forward_fill_never_looks_ahead(
        offsets in arb_offsets(50),
        close in arb_close(),
        adj_offsets in arb_offsets(20),
    ) {
        let raw: Vec<DailyBar> = offsets.iter().map(|&o| bar_on(day(o), close)).collect();
        // Give each adjustment date a distinct factor so lookups are traceable.
        let adjustments: Vec<AdjustmentPoint> = adj_offsets
            .iter()
            .enumerate()
            .map(|(i, &o)| adjusted_on(day(o), close, 0.1 + i as f64 * 0.01))
            .collect();

        let out = reconcile(raw, &adjustments);

        for bar in &out.bars {
            let expected = adjustments
                .iter()
                .filter(|p| p.date <= bar.date)
                .last()
                .map(|p| p.adjusted_close / p.raw_close)
                .unwrap_or(DEFAULT_ADJ_FACTOR);
            prop_assert!((bar.adj_factor - expected).abs() < 1e-9);
        }
    }

    /// Appending any fresh rows keeps dates strictly increasing and leaves
    /// the existing prefix untouched; every fresh row is either appended or
    /// dropped, never both.
    #[test]
    fn append_preserves_monotonicity_and_prefix(
        existing_offsets in arb_offsets(40),
        fresh_offsets in arb_offsets(40),
    ) {
        let existing: Vec<AdjustedBar> = existing_offsets
            .iter()
            .map(|&o| AdjustedBar::from_bar(bar_on(day(o), 10.0), 1.0))
            .collect();
        let fresh: Vec<AdjustedBar> = fresh_offsets
            .iter()
            .map(|&o| AdjustedBar::from_bar(bar_on(day(o), 11.0), 1.0))
            .collect();
        let fresh_len = fresh.len();

        let out = merge::append(existing.clone(), fresh);

        prop_assert!(out.history.windows(2).all(|w| w[0].date < w[1].date));
        prop_assert_eq!(&out.history[..existing.len()], &existing[..]);
        prop_assert_eq!(out.appended + out.overlap_dropped, fresh_len);
        prop_assert_eq!(out.history.len(), existing.len() + out.appended);
    }
}
