//! klinesync CLI — daily k-line sync and store inspection.
//!
//! Commands:
//! - `sync` — fetch daily history for the universe (full or incremental)
//!   and persist one Parquet table per symbol
//! - `status` — report stored symbols and their date ranges

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use klinesync_core::{
    EastMoneyProvider, KlineStore, Pipeline, StdoutProgress, SyncConfig, Universe,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "klinesync", about = "Daily k-line sync pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily history for the universe and persist per-symbol tables.
    Sync {
        /// Path to a TOML config file; flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Explicit symbols, comma-separated (e.g. 000001,600000).
        /// Skips the universe fetch.
        #[arg(long)]
        symbols: Option<String>,

        /// Cap on universe size (testing / smoke runs).
        #[arg(long)]
        limit: Option<usize>,

        /// Start date (YYYY-MM-DD). Defaults to 1991-01-01.
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end_date: Option<String>,

        /// Incremental mode: fetch only dates after each symbol's stored tail.
        #[arg(long, default_value_t = false)]
        update: bool,

        /// Data directory. Defaults to ./data.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Report stored symbols and their date ranges.
    Status {
        /// Data directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Restrict the report to these symbols (comma-separated).
        #[arg(long)]
        symbols: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            config,
            symbols,
            limit,
            start_date,
            end_date,
            update,
            data_dir,
        } => run_sync(config, symbols, limit, start_date, end_date, update, data_dir),
        Commands::Status { data_dir, symbols } => run_status(data_dir, symbols),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_sync(
    config_path: Option<PathBuf>,
    symbols: Option<String>,
    limit: Option<usize>,
    start_date: Option<String>,
    end_date: Option<String>,
    update: bool,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => SyncConfig::from_file(&path)?,
        None => SyncConfig::default(),
    };

    if let Some(list) = symbols {
        config.symbols = Some(parse_symbol_list(&list));
    }
    if let Some(limit) = limit {
        config.limit = Some(limit);
    }
    if let Some(s) = start_date {
        config.start_date = parse_date(&s)?;
    }
    if let Some(s) = end_date {
        config.end_date = parse_date(&s)?;
    }
    if update {
        config.incremental = true;
    }
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }

    println!("Range: {} to {}", config.start_date, config.end_date);
    println!("Mode:  {}", if config.incremental { "incremental" } else { "full" });

    let provider = EastMoneyProvider::with_pause(config.request_delay);
    let store = KlineStore::new(&config.data_dir);

    // Universe: explicit subset, or fetched from the provider and snapshotted.
    let mut universe = match &config.symbols {
        Some(list) => Universe::from_symbols(list.clone()),
        None => {
            let universe = Universe::fetch(&provider, &config.retry)?;
            let snapshot = config.data_dir.join(klinesync_core::universe::SNAPSHOT_FILE);
            universe.save(&snapshot)?;
            println!("Universe: {} symbols (snapshot at {})", universe.len(), snapshot.display());
            universe
        }
    };
    if let Some(limit) = config.limit {
        universe.truncate(limit);
        println!("Universe limited to {} symbols", universe.len());
    }

    let pipeline = Pipeline::new(&provider, &store, &config);
    let summary = pipeline.sync_all(&universe.symbol_ids(), &StdoutProgress);

    if !summary.all_ok() {
        for (symbol, err) in &summary.errors {
            eprintln!("Error for {symbol}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run_status(data_dir: PathBuf, symbols: Option<String>) -> Result<()> {
    let store = KlineStore::new(&data_dir);

    let symbols = match symbols {
        Some(list) => parse_symbol_list(&list),
        None => store.stored_symbols()?,
    };

    if symbols.is_empty() {
        println!("Store is empty: {}", store.kline_dir().display());
        return Ok(());
    }

    println!("Store: {}", store.kline_dir().display());
    println!();
    println!("{:<10} {:<25} {:>10}", "Symbol", "Date Range", "Rows");
    println!("{}", "-".repeat(47));

    for status in store.status(&symbols) {
        let range = match (status.start_date, status.end_date) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            _ if status.stored => "(no meta)".into(),
            _ => "(not stored)".into(),
        };
        let rows = status
            .row_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<10} {:<25} {:>10}", status.symbol, range, rows);
    }

    Ok(())
}

fn parse_symbol_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
}
