//! Incremental merge: fetch-window planning and append-only history growth.
//!
//! Persisted history is append-only — existing rows are never rewritten or
//! reordered. A fresh row dated at or before the last stored date indicates
//! provider misbehavior or clock skew and is dropped with a warning rather
//! than silently duplicating history.

use crate::provider::AdjustedBar;
use chrono::{Days, NaiveDate};

/// The date range a fetch should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Where an incremental fetch should start: the day after the last stored
/// date, or the requested full-range start when nothing is stored yet.
pub fn effective_start(existing: &[AdjustedBar], requested_start: NaiveDate) -> NaiveDate {
    match existing.last() {
        Some(last) => last
            .date
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX),
        None => requested_start,
    }
}

/// Plan the fetch window for an incremental update. `None` means the stored
/// history already reaches `end` — the steady-state no-op, not an error.
pub fn plan_window(
    existing: &[AdjustedBar],
    requested_start: NaiveDate,
    end: NaiveDate,
) -> Option<FetchWindow> {
    let start = effective_start(existing, requested_start);
    (start <= end).then_some(FetchWindow { start, end })
}

/// Result of appending freshly reconciled rows onto existing history.
#[derive(Debug)]
pub struct MergeOutcome {
    pub history: Vec<AdjustedBar>,
    pub appended: usize,
    pub overlap_dropped: usize,
}

impl MergeOutcome {
    /// True when nothing changed — the fetch produced no appendable rows.
    pub fn is_noop(&self) -> bool {
        self.appended == 0
    }
}

/// Append fresh rows onto existing history, preserving the strictly
/// increasing date invariant. Existing rows pass through untouched; fresh
/// rows dated ≤ the current tail are dropped and counted.
pub fn append(existing: Vec<AdjustedBar>, fresh: Vec<AdjustedBar>) -> MergeOutcome {
    let mut history = existing;
    let mut appended = 0usize;
    let mut overlap_dropped = 0usize;
    let mut tail = history.last().map(|bar| bar.date);

    for bar in fresh {
        if let Some(t) = tail.filter(|t| bar.date <= *t) {
            tracing::warn!(
                "dropping overlapping row for {} on {} (history tail {t})",
                bar.symbol,
                bar.date,
            );
            overlap_dropped += 1;
            continue;
        }
        tail = Some(bar.date);
        history.push(bar);
        appended += 1;
    }

    MergeOutcome {
        history,
        appended,
        overlap_dropped,
    }
}
