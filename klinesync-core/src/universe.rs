//! Security universe: the set of symbols eligible for a sync run.
//!
//! Fetched from the provider's listing endpoint and persisted as a CSV
//! snapshot so a run's universe is durable and inspectable after the fact.

use crate::provider::{DataError, QuoteProvider, SymbolInfo};
use crate::retry::RetryPolicy;
use std::path::Path;

/// Default snapshot filename under the data directory.
pub const SNAPSHOT_FILE: &str = "universe.csv";

#[derive(Debug, Clone)]
pub struct Universe {
    pub symbols: Vec<SymbolInfo>,
}

impl Universe {
    /// Fetch the full universe from the provider, retry-wrapped. A failure
    /// here is fatal to the run — there is nothing to iterate without it.
    pub fn fetch(provider: &dyn QuoteProvider, retry: &RetryPolicy) -> Result<Self, DataError> {
        let symbols = retry.run(|| provider.list_symbols())?;
        if symbols.is_empty() {
            return Err(DataError::UniverseError(
                "provider returned an empty symbol list".into(),
            ));
        }
        Ok(Self { symbols })
    }

    /// Build a universe from an explicit symbol list (the `--symbols` flag).
    /// Names are unknown in this path and left empty.
    pub fn from_symbols(symbols: impl IntoIterator<Item = String>) -> Self {
        Self {
            symbols: symbols
                .into_iter()
                .map(|symbol| SymbolInfo {
                    symbol,
                    name: String::new(),
                })
                .collect(),
        }
    }

    /// Keep only the first `limit` symbols.
    pub fn truncate(&mut self, limit: usize) {
        self.symbols.truncate(limit);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbol identifiers in universe order.
    pub fn symbol_ids(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.symbol.clone()).collect()
    }

    /// Persist the universe snapshot as CSV (`symbol,name` with header).
    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DataError::UniverseError(format!("create dir: {e}")))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| DataError::UniverseError(format!("open snapshot: {e}")))?;
        for info in &self.symbols {
            writer
                .serialize(info)
                .map_err(|e| DataError::UniverseError(format!("write snapshot row: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| DataError::UniverseError(format!("flush snapshot: {e}")))?;
        Ok(())
    }

    /// Load a previously saved snapshot.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| DataError::UniverseError(format!("open snapshot: {e}")))?;
        let mut symbols = Vec::new();
        for row in reader.deserialize() {
            let info: SymbolInfo =
                row.map_err(|e| DataError::UniverseError(format!("read snapshot row: {e}")))?;
            symbols.push(info);
        }
        Ok(Self { symbols })
    }
}
