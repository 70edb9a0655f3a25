//! Per-security sync orchestration.
//!
//! For each symbol: plan the fetch window, fetch the raw and adjustment
//! series under the retry policy, reconcile, merge onto stored history, and
//! persist atomically. One security's failure never aborts the batch; a
//! fixed courtesy delay separates consecutive securities.

use crate::config::SyncConfig;
use crate::merge::{self, FetchWindow};
use crate::provider::{DataError, QuoteProvider};
use crate::reconcile::{self, Reconciled};
use crate::store::KlineStore;

/// What a single-symbol sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Full history written — first fetch for the symbol, or a forced
    /// full-range rebuild.
    FullWrite { rows: usize },
    /// Incremental rows appended onto existing history.
    Appended { rows: usize },
    /// Stored history already reaches the requested end date.
    UpToDate,
}

/// Summary of a batch run.
#[derive(Debug)]
pub struct SyncSummary {
    pub total: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub errors: Vec<(String, DataError)>,
}

impl SyncSummary {
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}

/// Progress callbacks for a batch run.
pub trait SyncProgress: Send {
    /// Called when starting a symbol.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a symbol finishes, either way.
    fn on_complete(
        &self,
        symbol: &str,
        index: usize,
        total: usize,
        result: &Result<SyncAction, DataError>,
    );

    /// Called once when the whole batch is done.
    fn on_batch_complete(&self, summary: &SyncSummary);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl SyncProgress for StdoutProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        println!("[{}/{}] Syncing {symbol}...", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<SyncAction, DataError>,
    ) {
        match result {
            Ok(SyncAction::FullWrite { rows }) => println!("  OK: {symbol} ({rows} rows)"),
            Ok(SyncAction::Appended { rows }) => println!("  OK: {symbol} (+{rows} rows)"),
            Ok(SyncAction::UpToDate) => println!("  OK: {symbol} (up to date)"),
            Err(e) => println!("  FAIL: {symbol}: {e}"),
        }
    }

    fn on_batch_complete(&self, summary: &SyncSummary) {
        println!(
            "\nSync complete: {} updated, {} up to date, {} failed ({} total)",
            summary.updated, summary.up_to_date, summary.failed, summary.total
        );
    }
}

/// The sync pipeline: provider + store + config, wired per run.
pub struct Pipeline<'a> {
    provider: &'a dyn QuoteProvider,
    store: &'a KlineStore,
    config: &'a SyncConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        provider: &'a dyn QuoteProvider,
        store: &'a KlineStore,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Sync one symbol. On any failure the stored history is left exactly
    /// as it was — the only write is the final atomic replace.
    pub fn sync_symbol(&self, symbol: &str) -> Result<SyncAction, DataError> {
        if self.config.incremental {
            self.sync_incremental(symbol)
        } else {
            self.sync_full(symbol)
        }
    }

    fn sync_full(&self, symbol: &str) -> Result<SyncAction, DataError> {
        let window = FetchWindow {
            start: self.config.start_date,
            end: self.config.end_date,
        };
        let reconciled = self.fetch_window(symbol, window)?;
        if reconciled.bars.is_empty() {
            // A full backfill that yields nothing is a failure for this
            // symbol, unlike the incremental steady state.
            return Err(DataError::Other(format!(
                "provider returned no rows for '{symbol}' in {}..{}",
                window.start, window.end
            )));
        }

        let rows = reconciled.bars.len();
        self.store
            .write(symbol, &reconciled.bars, self.provider.name())?;
        Ok(SyncAction::FullWrite { rows })
    }

    fn sync_incremental(&self, symbol: &str) -> Result<SyncAction, DataError> {
        let existing = match self.store.load(symbol) {
            Ok(bars) => bars,
            Err(DataError::NoHistory { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let Some(window) =
            merge::plan_window(&existing, self.config.start_date, self.config.end_date)
        else {
            return Ok(SyncAction::UpToDate);
        };

        let reconciled = self.fetch_window(symbol, window)?;
        if reconciled.bars.is_empty() {
            // Nothing new upstream (holiday stretch, suspended listing).
            return Ok(SyncAction::UpToDate);
        }

        let had_history = !existing.is_empty();
        let outcome = merge::append(existing, reconciled.bars);
        if outcome.overlap_dropped > 0 {
            let overlap = DataError::Overlap {
                symbol: symbol.to_string(),
                dropped: outcome.overlap_dropped,
            };
            tracing::warn!("{overlap}");
        }
        if outcome.is_noop() {
            return Ok(SyncAction::UpToDate);
        }

        self.store
            .write(symbol, &outcome.history, self.provider.name())?;
        Ok(if had_history {
            SyncAction::Appended {
                rows: outcome.appended,
            }
        } else {
            SyncAction::FullWrite {
                rows: outcome.appended,
            }
        })
    }

    /// Fetch both series for a window, retry-wrapped, and reconcile them.
    fn fetch_window(&self, symbol: &str, window: FetchWindow) -> Result<Reconciled, DataError> {
        let retry = &self.config.retry;

        let raw = retry.run(|| self.provider.fetch_daily(symbol, window.start, window.end))?;
        if raw.is_empty() {
            return Ok(Reconciled {
                bars: Vec::new(),
                bars_skipped: 0,
                points_skipped: 0,
            });
        }

        let adjustments =
            retry.run(|| self.provider.fetch_adjustments(symbol, window.start, window.end))?;

        let reconciled = reconcile::reconcile(raw, &adjustments);
        if reconciled.bars_skipped > 0 || reconciled.points_skipped > 0 {
            tracing::warn!(
                "{symbol}: skipped {} raw row(s) and {} adjustment point(s) in {}..{}",
                reconciled.bars_skipped,
                reconciled.points_skipped,
                window.start,
                window.end,
            );
        }
        Ok(reconciled)
    }

    /// Run the batch over `symbols` in order. Failures are collected, not
    /// propagated; the inter-symbol delay applies after every symbol except
    /// the last, regardless of outcome.
    pub fn sync_all(&self, symbols: &[String], progress: &dyn SyncProgress) -> SyncSummary {
        let total = symbols.len();
        let mut summary = SyncSummary {
            total,
            updated: 0,
            up_to_date: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (i, symbol) in symbols.iter().enumerate() {
            progress.on_start(symbol, i, total);
            let result = self.sync_symbol(symbol);
            progress.on_complete(symbol, i, total, &result);

            match result {
                Ok(SyncAction::UpToDate) => summary.up_to_date += 1,
                Ok(_) => summary.updated += 1,
                Err(e) => {
                    summary.failed += 1;
                    summary.errors.push((symbol.clone(), e));
                }
            }

            if i + 1 < total {
                std::thread::sleep(self.config.request_delay);
            }
        }

        progress.on_batch_complete(&summary);
        summary
    }
}
