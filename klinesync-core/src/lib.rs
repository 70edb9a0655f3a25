//! klinesync core — daily k-line sync pipeline.
//!
//! Pulls unadjusted daily OHLCV history plus a forward-adjustment series for
//! a universe of listed securities, reconciles the two into per-date
//! adjustment factors, and maintains one append-only Parquet table per
//! symbol:
//! - Provider boundary and error taxonomy (`provider`, `eastmoney`)
//! - Bounded retry with linear backoff (`retry`)
//! - Date-aligned reconciliation with forward-filled factors (`reconcile`)
//! - Incremental window planning and overlap-safe append (`merge`)
//! - Atomic per-symbol Parquet store with metadata sidecars (`store`)
//! - Universe snapshot (`universe`) and batch orchestration (`pipeline`)

pub mod config;
pub mod eastmoney;
pub mod merge;
pub mod pipeline;
pub mod provider;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod universe;

pub use config::SyncConfig;
pub use eastmoney::EastMoneyProvider;
pub use merge::{FetchWindow, MergeOutcome};
pub use pipeline::{Pipeline, StdoutProgress, SyncAction, SyncProgress, SyncSummary};
pub use provider::{
    AdjustedBar, AdjustmentPoint, DailyBar, DataError, QuoteProvider, SymbolInfo,
};
pub use retry::RetryPolicy;
pub use store::{HistoryMeta, KlineStore, StoreStatus};
pub use universe::Universe;
