//! Quote provider boundary: row types, structured errors, and the provider trait.
//!
//! The QuoteProvider trait abstracts over quote sources so the pipeline can be
//! exercised against a scripted in-memory provider in tests. Providers do one
//! attempt per call — retry policy lives above them (see `retry`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unadjusted daily OHLCV row as returned by a provider.
///
/// `volume` is in shares; `amount` is the traded turnover in currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub amount: f64,
}

impl DailyBar {
    /// Bar sanity: finite positive prices, high/low bracket open and close,
    /// non-negative turnover.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return false;
        }
        self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
    }
}

/// One point of the adjustment series: the same date quoted both raw and
/// forward-adjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentPoint {
    pub date: NaiveDate,
    pub raw_close: f64,
    pub adjusted_close: f64,
}

impl AdjustmentPoint {
    /// Derived adjustment factor, or None when the point cannot produce a
    /// usable one (zero/negative raw close, non-finite sides).
    pub fn factor(&self) -> Option<f64> {
        if !self.raw_close.is_finite() || !self.adjusted_close.is_finite() {
            return None;
        }
        if self.raw_close <= 0.0 {
            return None;
        }
        let f = self.adjusted_close / self.raw_close;
        (f.is_finite() && f > 0.0).then_some(f)
    }
}

/// The unit of persistence: a daily bar enriched with its adjustment factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedBar {
    pub date: NaiveDate,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub amount: f64,
    pub adj_factor: f64,
}

impl AdjustedBar {
    pub fn from_bar(bar: DailyBar, adj_factor: f64) -> Self {
        Self {
            date: bar.date,
            symbol: bar.symbol,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            amount: bar.amount,
            adj_factor,
        }
    }
}

/// A listed security as reported by the universe endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: String,
}

/// Structured error types for the whole pipeline.
///
/// The transient/permanent split drives the retry policy: only errors from
/// the network boundary that can plausibly clear on their own are retried.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider server error: {0}")]
    ServerError(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<DataError> },

    #[error("bad data on {date}: {reason}")]
    DataQuality { date: NaiveDate, reason: String },

    #[error("incremental merge for '{symbol}' dropped {dropped} overlapping row(s)")]
    Overlap { symbol: String, dropped: usize },

    #[error("store error: {0}")]
    StoreError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no stored history for symbol '{symbol}'")]
    NoHistory { symbol: String },

    #[error("universe error: {0}")]
    UniverseError(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether a retry has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
                | DataError::ServerError(_)
        )
    }
}

/// Trait for quote providers.
///
/// All three fetch operations block the calling thread for the duration of
/// the network round trip. Implementations classify failures into the
/// transient/permanent taxonomy above and never retry internally.
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// List the full security universe.
    fn list_symbols(&self) -> Result<Vec<SymbolInfo>, DataError>;

    /// Fetch unadjusted daily OHLCV rows for a symbol over a date range.
    /// May legitimately return an empty vec (suspended listing, no trading
    /// days in range) — the caller decides what that means.
    fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataError>;

    /// Fetch the adjustment series for a symbol over a date range: per date,
    /// the raw close paired with the forward-adjusted close.
    fn fetch_adjustments(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AdjustmentPoint>, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, open: f64, high: f64, low: f64, close: f64) -> DailyBar {
        DailyBar {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            symbol: "000001".into(),
            open,
            high,
            low,
            close,
            volume: 1000,
            amount: 10_000.0,
        }
    }

    #[test]
    fn well_formed_bar_passes() {
        assert!(bar("2024-01-02", 10.0, 10.5, 9.8, 10.2).is_well_formed());
    }

    #[test]
    fn inverted_bar_rejected() {
        // high below the open
        assert!(!bar("2024-01-02", 10.0, 9.5, 9.0, 9.2).is_well_formed());
        // low above the close
        assert!(!bar("2024-01-02", 10.0, 10.5, 10.1, 10.0).is_well_formed());
    }

    #[test]
    fn non_positive_price_rejected() {
        assert!(!bar("2024-01-02", 0.0, 10.5, 9.8, 10.2).is_well_formed());
        assert!(!bar("2024-01-02", -1.0, 10.5, -2.0, 10.2).is_well_formed());
    }

    #[test]
    fn factor_derivation() {
        let p = AdjustmentPoint {
            date: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            raw_close: 10.0,
            adjusted_close: 8.0,
        };
        assert_eq!(p.factor(), Some(0.8));
    }

    #[test]
    fn factor_rejects_zero_raw_close() {
        let p = AdjustmentPoint {
            date: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            raw_close: 0.0,
            adjusted_close: 8.0,
        };
        assert_eq!(p.factor(), None);
    }

    #[test]
    fn transient_classification() {
        assert!(DataError::NetworkUnreachable("conn reset".into()).is_transient());
        assert!(DataError::RateLimited { retry_after_secs: 5 }.is_transient());
        assert!(DataError::ServerError("HTTP 502".into()).is_transient());
        assert!(!DataError::SymbolNotFound { symbol: "X".into() }.is_transient());
        assert!(!DataError::ResponseFormatChanged("shape".into()).is_transient());
        let exhausted = DataError::RetriesExhausted {
            attempts: 3,
            last: Box::new(DataError::NetworkUnreachable("timeout".into())),
        };
        assert!(!exhausted.is_transient());
    }
}
