//! Per-symbol Parquet store.
//!
//! Layout: `{data_dir}/kline_daily/{SYMBOL}.parquet` plus a JSON metadata
//! sidecar `{SYMBOL}.meta.json` (date range, row count, content hash).
//!
//! Writes are whole-file and atomic: the new history is written to a `.tmp`
//! file and renamed into place, so a reader never observes a partial table.
//! "Append" at this boundary therefore means "replace with a strictly longer
//! history" — the merge layer guarantees the prior rows are unchanged.

use crate::provider::{AdjustedBar, DataError};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata sidecar for one stored symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub row_count: usize,
    pub data_hash: String,
    pub source: String,
    pub written_at: NaiveDateTime,
}

/// Store status for a single symbol, as reported to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatus {
    pub symbol: String,
    pub stored: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: Option<usize>,
}

/// The per-symbol k-line store.
pub struct KlineStore {
    data_dir: PathBuf,
}

impl KlineStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Root data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding the per-symbol tables.
    pub fn kline_dir(&self) -> PathBuf {
        self.data_dir.join("kline_daily")
    }

    fn table_path(&self, symbol: &str) -> PathBuf {
        self.kline_dir().join(format!("{symbol}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.kline_dir().join(format!("{symbol}.meta.json"))
    }

    /// Whether a table exists for this symbol.
    pub fn exists(&self, symbol: &str) -> bool {
        self.table_path(symbol).exists()
    }

    /// Persist the full history for a symbol, atomically replacing any
    /// previous table, then refresh the metadata sidecar.
    pub fn write(&self, symbol: &str, bars: &[AdjustedBar], source: &str) -> Result<(), DataError> {
        if bars.is_empty() {
            return Err(DataError::StoreError(format!(
                "refusing to persist empty history for '{symbol}'"
            )));
        }

        let dir = self.kline_dir();
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::StoreError(format!("failed to create dir: {e}")))?;

        let df = bars_to_dataframe(bars)?;
        let path = self.table_path(symbol);
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::StoreError(format!("atomic rename failed: {e}"))
        })?;

        let meta = HistoryMeta {
            symbol: symbol.to_string(),
            start_date: bars.first().expect("non-empty").date,
            end_date: bars.last().expect("non-empty").date,
            row_count: bars.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(bars)
                    .map_err(|e| DataError::StoreError(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            source: source.to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::StoreError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol), meta_json)
            .map_err(|e| DataError::StoreError(format!("meta write: {e}")))?;

        Ok(())
    }

    /// Load the full stored history for a symbol, sorted by date ascending.
    pub fn load(&self, symbol: &str) -> Result<Vec<AdjustedBar>, DataError> {
        let path = self.table_path(symbol);
        if !path.exists() {
            return Err(DataError::NoHistory {
                symbol: symbol.to_string(),
            });
        }

        let mut bars = read_and_validate_parquet(&path)?;
        bars.sort_by_key(|bar| bar.date);
        Ok(bars)
    }

    /// Metadata sidecar for a symbol, if present and parseable.
    pub fn meta(&self, symbol: &str) -> Option<HistoryMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Latest stored date for a symbol. Answered from the sidecar when
    /// possible; falls back to a full load when the sidecar is missing.
    pub fn latest_date(&self, symbol: &str) -> Result<Option<NaiveDate>, DataError> {
        if let Some(meta) = self.meta(symbol) {
            return Ok(Some(meta.end_date));
        }
        if !self.exists(symbol) {
            return Ok(None);
        }
        Ok(self.load(symbol)?.last().map(|bar| bar.date))
    }

    /// All symbols with a stored table, sorted.
    pub fn stored_symbols(&self) -> Result<Vec<String>, DataError> {
        let dir = self.kline_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries =
            fs::read_dir(&dir).map_err(|e| DataError::StoreError(format!("read dir: {e}")))?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::StoreError(format!("dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    /// Status report over a set of symbols (sidecar-only, no table loads).
    pub fn status(&self, symbols: &[String]) -> Vec<StoreStatus> {
        symbols
            .iter()
            .map(|symbol| {
                let meta = self.meta(symbol);
                StoreStatus {
                    symbol: symbol.clone(),
                    stored: self.exists(symbol),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    row_count: meta.as_ref().map(|m| m.row_count),
                }
            })
            .collect()
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const COLUMNS: [&str; 9] = [
    "date",
    "symbol",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "amount",
    "adj_factor",
];

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch")
}

fn bars_to_dataframe(bars: &[AdjustedBar]) -> Result<DataFrame, DataError> {
    let dates: Vec<i32> = bars
        .iter()
        .map(|b| (b.date - epoch()).num_days() as i32)
        .collect();
    let symbols: Vec<String> = bars.iter().map(|b| b.symbol.clone()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();
    let amounts: Vec<f64> = bars.iter().map(|b| b.amount).collect();
    let factors: Vec<f64> = bars.iter().map(|b| b.adj_factor).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("symbol".into(), symbols),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("amount".into(), amounts),
        Column::new("adj_factor".into(), factors),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_and_validate_parquet(path: &Path) -> Result<Vec<AdjustedBar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::StoreError(format!(
            "empty table at {}",
            path.display()
        )));
    }
    for col_name in &COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::StoreError(format!(
                "missing column '{col_name}' in {}",
                path.display()
            )));
        }
    }

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<AdjustedBar>, DataError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("column read: {e}")))
    };

    let date_ca = col("date")?
        .date()
        .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?
        .clone();
    let symbol_ca = col("symbol")?
        .str()
        .map_err(|e| DataError::ParquetError(format!("symbol column type: {e}")))?
        .clone();
    let open_ca = col("open")?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("open column type: {e}")))?
        .clone();
    let high_ca = col("high")?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("high column type: {e}")))?
        .clone();
    let low_ca = col("low")?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("low column type: {e}")))?
        .clone();
    let close_ca = col("close")?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("close column type: {e}")))?
        .clone();
    let volume_ca = col("volume")?
        .u64()
        .map_err(|e| DataError::ParquetError(format!("volume column type: {e}")))?
        .clone();
    let amount_ca = col("amount")?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("amount column type: {e}")))?
        .clone();
    let factor_ca = col("adj_factor")?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("adj_factor column type: {e}")))?
        .clone();

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    let epoch = epoch();

    for i in 0..n {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        let date = epoch + chrono::Duration::days(date_days as i64);

        bars.push(AdjustedBar {
            date,
            symbol: symbol_ca.get(i).unwrap_or_default().to_string(),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: volume_ca.get(i).unwrap_or(0),
            amount: amount_ca.get(i).unwrap_or(f64::NAN),
            adj_factor: factor_ca.get(i).unwrap_or(1.0),
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_data_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("klinesync_test_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_bars() -> Vec<AdjustedBar> {
        vec![
            AdjustedBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                symbol: "000001".into(),
                open: 10.0,
                high: 10.4,
                low: 9.9,
                close: 10.2,
                volume: 120_000,
                amount: 1_224_000.0,
                adj_factor: 0.8,
            },
            AdjustedBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                symbol: "000001".into(),
                open: 10.2,
                high: 10.6,
                low: 10.1,
                close: 10.5,
                volume: 98_000,
                amount: 1_029_000.0,
                adj_factor: 0.8,
            },
        ]
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = temp_data_dir();
        let store = KlineStore::new(&dir);

        store.write("000001", &sample_bars(), "test").unwrap();
        let loaded = store.load("000001").unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(loaded[0].symbol, "000001");
        assert_eq!(loaded[0].adj_factor, 0.8);
        assert_eq!(loaded[1].close, 10.5);
        assert_eq!(loaded[1].volume, 98_000);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_missing_symbol_is_no_history() {
        let dir = temp_data_dir();
        let store = KlineStore::new(&dir);

        assert!(matches!(
            store.load("999999"),
            Err(DataError::NoHistory { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_refuses_empty_history() {
        let dir = temp_data_dir();
        let store = KlineStore::new(&dir);

        assert!(store.write("000001", &[], "test").is_err());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = temp_data_dir();
        let store = KlineStore::new(&dir);

        store.write("000001", &sample_bars(), "test").unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.kline_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn meta_sidecar_tracks_range_and_count() {
        let dir = temp_data_dir();
        let store = KlineStore::new(&dir);

        store.write("000001", &sample_bars(), "test").unwrap();
        let meta = store.meta("000001").unwrap();

        assert_eq!(meta.symbol, "000001");
        assert_eq!(meta.row_count, 2);
        assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(meta.end_date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(meta.source, "test");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn latest_date_from_sidecar_and_fallback() {
        let dir = temp_data_dir();
        let store = KlineStore::new(&dir);

        store.write("000001", &sample_bars(), "test").unwrap();
        assert_eq!(
            store.latest_date("000001").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3)
        );

        // Remove the sidecar: the answer must survive via a full load.
        fs::remove_file(store.kline_dir().join("000001.meta.json")).unwrap();
        assert_eq!(
            store.latest_date("000001").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3)
        );

        assert_eq!(store.latest_date("999999").unwrap(), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rewrite_replaces_table() {
        let dir = temp_data_dir();
        let store = KlineStore::new(&dir);

        let bars = sample_bars();
        store.write("000001", &bars[..1], "test").unwrap();
        store.write("000001", &bars, "test").unwrap();

        assert_eq!(store.load("000001").unwrap().len(), 2);
        assert_eq!(store.meta("000001").unwrap().row_count, 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn stored_symbols_and_status() {
        let dir = temp_data_dir();
        let store = KlineStore::new(&dir);

        store.write("600000", &sample_bars(), "test").unwrap();
        store.write("000001", &sample_bars(), "test").unwrap();

        assert_eq!(store.stored_symbols().unwrap(), vec!["000001", "600000"]);

        let status = store.status(&["000001".into(), "999999".into()]);
        assert_eq!(status.len(), 2);
        assert!(status[0].stored);
        assert_eq!(status[0].row_count, Some(2));
        assert!(!status[1].stored);
        assert_eq!(status[1].row_count, None);

        let _ = fs::remove_dir_all(&dir);
    }
}
