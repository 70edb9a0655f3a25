//! East Money quote API provider.
//!
//! Fetches the A-share universe and daily k-lines from the push2 endpoints.
//! Raw bars come from `fqt=0`, the adjustment series from pairing the
//! forward-adjusted (`fqt=1`) close with the raw close per date.
//!
//! The API is unofficial and subject to unannounced format changes; parse
//! failures are classified permanent so the retry layer does not hammer an
//! endpoint that changed shape.

use crate::provider::{AdjustmentPoint, DailyBar, DataError, QuoteProvider, SymbolInfo};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

// ── Response models ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    total: u64,
    #[serde(default)]
    diff: Vec<ListRow>,
}

#[derive(Debug, Deserialize)]
struct ListRow {
    #[serde(rename = "f12")]
    code: String,
    #[serde(rename = "f14")]
    name: String,
}

/// One parsed k-line record (`fields2=f51..f57`).
#[derive(Debug, Clone)]
struct Kline {
    date: NaiveDate,
    open: f64,
    close: f64,
    high: f64,
    low: f64,
    volume: u64,
    amount: f64,
}

// ── Provider ────────────────────────────────────────────────────────

/// Blocking East Money client. One HTTP attempt per call — retries are the
/// caller's retry policy. `request_pause` is slept between the paired
/// requests a single operation needs (adjustment series, listing pages).
pub struct EastMoneyProvider {
    client: reqwest::blocking::Client,
    request_pause: Duration,
    page_size: usize,
}

impl EastMoneyProvider {
    pub fn new() -> Self {
        Self::with_pause(Duration::from_millis(500))
    }

    pub fn with_pause(request_pause: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            request_pause,
            page_size: 200,
        }
    }

    /// Market-qualified security id: Shanghai codes (6xx/9xx) are prefixed
    /// `1.`, Shenzhen/Beijing `0.`.
    fn secid(symbol: &str) -> String {
        if symbol.starts_with('6') || symbol.starts_with('9') {
            format!("1.{symbol}")
        } else {
            format!("0.{symbol}")
        }
    }

    fn kline_url(symbol: &str, fqt: u8, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "https://push2his.eastmoney.com/api/qt/stock/kline/get\
             ?secid={}&fields1=f1,f2,f3,f4,f5,f6\
             &fields2=f51,f52,f53,f54,f55,f56,f57\
             &klt=101&fqt={fqt}&beg={}&end={}",
            Self::secid(symbol),
            start.format("%Y%m%d"),
            end.format("%Y%m%d"),
        )
    }

    fn list_url(&self, page: usize) -> String {
        format!(
            "https://push2.eastmoney.com/api/qt/clist/get\
             ?pn={page}&pz={}&po=0&np=1&fltt=2&invt=2&fid=f12\
             &fs=m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23,m:0+t:81+s:2048\
             &fields=f12,f14",
            self.page_size,
        )
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, DataError> {
        let resp = self.client.get(url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                DataError::NetworkUnreachable(e.to_string())
            } else {
                DataError::Other(format!("request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status.is_server_error() {
            return Err(DataError::ServerError(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(DataError::InvalidRequest(format!("HTTP {status}")));
        }

        resp.json()
            .map_err(|e| DataError::ResponseFormatChanged(format!("parse response: {e}")))
    }

    fn fetch_klines(
        &self,
        symbol: &str,
        fqt: u8,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Kline>, DataError> {
        let url = Self::kline_url(symbol, fqt, start, end);
        let resp: KlineResponse = self.get_json(&url)?;

        let data = resp.data.ok_or_else(|| DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;

        data.klines
            .iter()
            .map(|line| parse_kline(line))
            .collect()
    }
}

impl Default for EastMoneyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteProvider for EastMoneyProvider {
    fn name(&self) -> &str {
        "eastmoney"
    }

    fn list_symbols(&self) -> Result<Vec<SymbolInfo>, DataError> {
        let mut symbols: Vec<SymbolInfo> = Vec::new();
        let mut page = 1usize;

        loop {
            if page > 1 {
                std::thread::sleep(self.request_pause);
            }

            let resp: ListResponse = self.get_json(&self.list_url(page))?;
            let data = resp
                .data
                .ok_or_else(|| DataError::UniverseError("listing returned no data".into()))?;

            if data.diff.is_empty() {
                break;
            }
            let before = symbols.len();
            symbols.extend(data.diff.into_iter().map(|row| SymbolInfo {
                symbol: row.code,
                name: row.name,
            }));

            // Stop on total reached, or on a page that added nothing (the
            // endpoint occasionally repeats the last page instead of 404ing).
            if symbols.len() as u64 >= data.total || symbols.len() == before {
                break;
            }
            page += 1;
        }

        Ok(symbols)
    }

    fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataError> {
        let klines = self.fetch_klines(symbol, 0, start, end)?;
        Ok(klines
            .into_iter()
            .map(|k| DailyBar {
                date: k.date,
                symbol: symbol.to_string(),
                open: k.open,
                high: k.high,
                low: k.low,
                close: k.close,
                volume: k.volume,
                amount: k.amount,
            })
            .collect())
    }

    fn fetch_adjustments(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AdjustmentPoint>, DataError> {
        let raw = self.fetch_klines(symbol, 0, start, end)?;
        std::thread::sleep(self.request_pause);
        let adjusted = self.fetch_klines(symbol, 1, start, end)?;
        Ok(pair_closes(&raw, &adjusted))
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

/// Parse one k-line record: `date,open,close,high,low,volume,amount`.
fn parse_kline(line: &str) -> Result<Kline, DataError> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 7 {
        return Err(DataError::ResponseFormatChanged(format!(
            "kline record has {} fields, expected 7: {line:?}",
            parts.len()
        )));
    }

    let date = NaiveDate::parse_from_str(parts[0], "%Y-%m-%d")
        .map_err(|e| DataError::ResponseFormatChanged(format!("kline date {:?}: {e}", parts[0])))?;

    let num = |idx: usize| -> Result<f64, DataError> {
        parts[idx].parse::<f64>().map_err(|e| {
            DataError::ResponseFormatChanged(format!("kline field {idx} {:?}: {e}", parts[idx]))
        })
    };

    let volume = num(5)?;
    if volume < 0.0 {
        return Err(DataError::ResponseFormatChanged(format!(
            "negative volume in kline record: {line:?}"
        )));
    }

    Ok(Kline {
        date,
        open: num(1)?,
        close: num(2)?,
        high: num(3)?,
        low: num(4)?,
        volume: volume as u64,
        amount: num(6)?,
    })
}

/// Pair the raw and forward-adjusted series by date. Dates present in only
/// one of the two series are dropped — the two fetches are independent and
/// may be misaligned at the edges.
fn pair_closes(raw: &[Kline], adjusted: &[Kline]) -> Vec<AdjustmentPoint> {
    let adjusted_by_date: HashMap<NaiveDate, f64> =
        adjusted.iter().map(|k| (k.date, k.close)).collect();

    raw.iter()
        .filter_map(|k| {
            adjusted_by_date.get(&k.date).map(|adj| AdjustmentPoint {
                date: k.date,
                raw_close: k.close,
                adjusted_close: *adj,
            })
        })
        .collect()
}
