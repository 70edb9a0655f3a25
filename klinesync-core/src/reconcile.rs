//! Reconciler: align raw OHLCV rows with the adjustment series by date.
//!
//! Produces exactly one adjusted bar per raw trading date. Dates missing from
//! the adjustment series carry the most recent earlier factor forward; dates
//! before the first known factor default to 1.0. Adjustment points with no
//! matching raw date are unused — raw dates alone drive the output.

use crate::provider::{AdjustedBar, AdjustmentPoint, DailyBar, DataError};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Factor applied when no adjustment data exists for a date. An entirely
/// empty adjustment series is valid — it means no corporate-action history.
pub const DEFAULT_ADJ_FACTOR: f64 = 1.0;

/// Reconciliation result: canonical bars plus counts of rows dropped for
/// data-quality reasons (reported, never fatal).
#[derive(Debug)]
pub struct Reconciled {
    pub bars: Vec<AdjustedBar>,
    /// Raw rows dropped: malformed OHLC or duplicate date.
    pub bars_skipped: usize,
    /// Adjustment points dropped: zero/negative close or unusable factor.
    pub points_skipped: usize,
}

/// Build the date → factor mapping from the adjustment series.
///
/// Points that cannot produce a positive finite factor (zero-price rows
/// upstream of the division) are skipped with a warning.
fn factor_map(points: &[AdjustmentPoint]) -> (BTreeMap<NaiveDate, f64>, usize) {
    let mut map = BTreeMap::new();
    let mut skipped = 0usize;

    for point in points {
        match point.factor() {
            Some(factor) => {
                map.insert(point.date, factor);
            }
            None => {
                let err = DataError::DataQuality {
                    date: point.date,
                    reason: format!(
                        "unusable adjustment point (raw_close={}, adjusted_close={})",
                        point.raw_close, point.adjusted_close
                    ),
                };
                tracing::warn!("{err}");
                skipped += 1;
            }
        }
    }

    (map, skipped)
}

/// Reconcile a raw OHLCV series with its adjustment series.
///
/// Deterministic: same inputs, same output. The forward-fill scan never
/// looks ahead — a gap is filled only from factors at earlier dates.
pub fn reconcile(raw: Vec<DailyBar>, adjustments: &[AdjustmentPoint]) -> Reconciled {
    let (factors, points_skipped) = factor_map(adjustments);

    // Sort ascending and keep the first row per date. The provider is
    // expected to send sorted, unique rows; enforcing it here means a
    // misbehaving provider cannot violate store invariants downstream.
    let mut raw = raw;
    raw.sort_by_key(|bar| bar.date);

    let mut bars = Vec::with_capacity(raw.len());
    let mut bars_skipped = 0usize;
    let mut last_date: Option<NaiveDate> = None;
    let mut last_factor: Option<f64> = None;

    for bar in raw {
        if last_date == Some(bar.date) {
            tracing::warn!("dropping duplicate raw row for {} on {}", bar.symbol, bar.date);
            bars_skipped += 1;
            continue;
        }
        if !bar.is_well_formed() {
            let err = DataError::DataQuality {
                date: bar.date,
                reason: format!(
                    "malformed bar for {} (o={} h={} l={} c={})",
                    bar.symbol, bar.open, bar.high, bar.low, bar.close
                ),
            };
            tracing::warn!("{err}");
            bars_skipped += 1;
            continue;
        }

        let factor = match factors.get(&bar.date) {
            Some(f) => {
                last_factor = Some(*f);
                *f
            }
            None => last_factor.unwrap_or(DEFAULT_ADJ_FACTOR),
        };

        last_date = Some(bar.date);
        bars.push(AdjustedBar::from_bar(bar, factor));
    }

    Reconciled {
        bars,
        bars_skipped,
        points_skipped,
    }
}
