//! Run configuration.
//!
//! Everything the pipeline needs is carried in one struct handed to it at
//! construction — no module-level paths or mutable globals. A TOML file can
//! seed the config; CLI flags override individual fields on top.

use crate::provider::DataError;
use crate::retry::RetryPolicy;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root data directory (kline tables and universe snapshot live below).
    pub data_dir: PathBuf,
    /// Full-range start date. Daily history reaches back to 1991.
    pub start_date: NaiveDate,
    /// End of the fetch range, normally today.
    pub end_date: NaiveDate,
    /// Incremental mode: start each symbol the day after its stored tail.
    pub incremental: bool,
    /// Explicit symbol subset; None means the full provider universe.
    pub symbols: Option<Vec<String>>,
    /// Cap on universe size (testing / smoke runs).
    pub limit: Option<usize>,
    /// Courtesy delay between securities.
    pub request_delay: Duration,
    /// Retry policy applied to every provider call.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            start_date: default_start_date(),
            end_date: chrono::Local::now().date_naive(),
            incremental: false,
            symbols: None,
            limit: None,
            request_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

/// Earliest date daily history is available from the provider.
pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1991, 1, 1).expect("valid date")
}

/// On-disk TOML shape. Every key is optional; absent keys keep defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    start_date: Option<String>,
    end_date: Option<String>,
    update: Option<bool>,
    symbols: Option<Vec<String>>,
    limit: Option<usize>,
    request_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
}

impl SyncConfig {
    /// Load a config file, applying its keys over the defaults.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a TOML config string, applying its keys over the defaults.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| DataError::Config(format!("parse config: {e}")))?;

        let mut config = Self::default();
        if let Some(dir) = file.data_dir {
            config.data_dir = dir;
        }
        if let Some(s) = file.start_date {
            config.start_date = parse_date("start_date", &s)?;
        }
        if let Some(s) = file.end_date {
            config.end_date = parse_date("end_date", &s)?;
        }
        if let Some(update) = file.update {
            config.incremental = update;
        }
        if let Some(symbols) = file.symbols {
            config.symbols = Some(symbols);
        }
        if let Some(limit) = file.limit {
            config.limit = Some(limit);
        }
        if let Some(ms) = file.request_delay_ms {
            config.request_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = file.max_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = file.retry_base_delay_ms {
            config.retry.base_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate, DataError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| DataError::Config(format!("{key} {value:?}: {e}")))
}
