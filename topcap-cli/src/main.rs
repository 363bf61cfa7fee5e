//! topcap CLI: synthetic data, index builds, queries, export and cache commands.
//!
//! Commands:
//! - `generate`: write a deterministic synthetic universe into the Parquet price archive
//! - `build`: compute and persist compositions for a date range
//! - `performance`, `composition`, `changes`: query the built index
//! - `export`: write the CSV bundle for a range
//! - `cache status` / `cache clear`: inspect or flush the read cache

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use topcap_core::dates::parse_date;
use topcap_core::domain::{CompositionChange, CompositionView, DailyChangeSummary, PerformanceEntry};
use topcap_core::store::ParquetPriceStore;
use topcap_core::synthetic::generate_universe;
use topcap_engine::{BuildSummary, CacheStatus, DayOutcome, IndexConfig, IndexService};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "topcap", about = "topcap CLI: equal-weighted top market-cap index engine")]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write synthetic daily prices into the Parquet price archive.
    Generate {
        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Number of synthetic symbols.
        #[arg(long, default_value_t = 120)]
        symbols: usize,

        /// Random walk seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Build daily compositions for a date range.
    Build {
        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD). Defaults to the start date.
        #[arg(long)]
        end: Option<String>,
    },
    /// Print the index level series for a range.
    Performance {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Print the composition snapshot for one date.
    Composition {
        #[arg(long)]
        date: String,
    },
    /// Print composition changes between consecutive snapshots.
    Changes {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,

        /// Per-date entered/exited digest instead of the full change list.
        #[arg(long, default_value_t = false)]
        summary: bool,
    },
    /// Write the CSV export bundle for a range.
    Export {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,

        /// Output directory. Defaults to ./exports.
        #[arg(long, default_value = "exports")]
        out: PathBuf,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report backend, entry count and hit/miss counters.
    Status,
    /// Remove every cached entry.
    Clear,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("topcap=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let json = cli.json;

    match cli.command {
        Commands::Generate {
            start,
            end,
            symbols,
            seed,
        } => run_generate(&config, &start, &end, symbols, seed),
        Commands::Build { start, end } => run_build(config, &start, end.as_deref(), json),
        Commands::Performance { start, end } => run_performance(config, &start, &end, json),
        Commands::Composition { date } => run_composition(config, &date, json),
        Commands::Changes { start, end, summary } => run_changes(config, &start, &end, summary, json),
        Commands::Export { start, end, out } => run_export(config, &start, &end, out),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(config, json),
            CacheAction::Clear => run_cache_clear(config),
        },
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<IndexConfig> {
    match path {
        Some(path) => Ok(IndexConfig::from_file(path)?),
        None => Ok(IndexConfig::default()),
    }
}

fn date(s: &str) -> Result<NaiveDate> {
    Ok(parse_date(s)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("failed to serialize output")?);
    Ok(())
}

fn run_generate(config: &IndexConfig, start: &str, end: &str, count: usize, seed: u64) -> Result<()> {
    let (start, end) = (date(start)?, date(end)?);
    topcap_core::dates::validate_range(start, end)?;

    let archive = ParquetPriceStore::new(&config.storage.prices_dir);
    let mut written = 0;
    for (symbol, rows) in generate_universe(count, start, end, seed) {
        if rows.is_empty() {
            continue;
        }
        archive.write(&symbol, &rows)?;
        written += 1;
    }
    println!(
        "Wrote {written} symbols ({start} to {end}) to {}",
        archive.dir().display()
    );
    Ok(())
}

fn run_build(config: IndexConfig, start: &str, end: Option<&str>, json: bool) -> Result<()> {
    let start = date(start)?;
    let end = match end {
        Some(end) => date(end)?,
        None => start,
    };
    let service = IndexService::open(config)?;
    let summary = service.build(start, end)?;
    if json {
        return print_json(&summary);
    }
    print_build_summary(&summary);
    Ok(())
}

fn run_performance(config: IndexConfig, start: &str, end: &str, json: bool) -> Result<()> {
    let service = IndexService::open(config)?;
    let series = service.get_performance(date(start)?, date(end)?)?;
    if json {
        return print_json(&series);
    }
    print_performance(&series);
    Ok(())
}

fn run_composition(config: IndexConfig, on: &str, json: bool) -> Result<()> {
    let service = IndexService::open(config)?;
    let views = service.get_composition(date(on)?)?;
    if json {
        return print_json(&views);
    }
    print_composition(&views);
    Ok(())
}

fn run_changes(config: IndexConfig, start: &str, end: &str, summary: bool, json: bool) -> Result<()> {
    let service = IndexService::open(config)?;
    let (start, end) = (date(start)?, date(end)?);
    if summary {
        let digest = service.get_change_summary(start, end)?;
        if json {
            return print_json(&digest);
        }
        print_change_summary(&digest);
    } else {
        let changes = service.get_changes(start, end)?;
        if json {
            return print_json(&changes);
        }
        print_changes(&changes);
    }
    Ok(())
}

fn run_export(config: IndexConfig, start: &str, end: &str, out: PathBuf) -> Result<()> {
    let service = IndexService::open(config)?;
    let bundle = service.export(date(start)?, date(end)?, &out)?;
    println!("Export written to: {}", bundle.display());
    Ok(())
}

fn run_cache_status(config: IndexConfig, json: bool) -> Result<()> {
    let service = IndexService::open(config)?;
    let status = service.cache_status();
    if json {
        return print_json(&status);
    }
    print_cache_status(&status);
    Ok(())
}

fn run_cache_clear(config: IndexConfig) -> Result<()> {
    let service = IndexService::open(config)?;
    match service.clear_cache() {
        Some(n) => println!("Removed {n} cache entries"),
        None => println!("Cache is disabled or unavailable; nothing cleared"),
    }
    Ok(())
}

// ─── Output ─────────────────────────────────────────────────────────

fn print_build_summary(summary: &BuildSummary) {
    println!();
    println!("=== Build Result ===");
    println!("Period:         {} to {}", summary.start, summary.end);
    println!("Built:          {}", summary.built);
    println!("Skipped:        {}", summary.skipped);
    println!("Written:        {}", summary.written);
    println!("Rewritten:      {}", summary.rewritten.len());
    if summary.truncated_performance > 0 {
        println!("Stale points:   {} dropped", summary.truncated_performance);
    }

    let degraded: Vec<String> = summary
        .days
        .iter()
        .filter_map(|day| match day {
            DayOutcome::Built {
                date, degraded: true, symbols, ..
            } => Some(format!("{date} ({})", symbols.len())),
            _ => None,
        })
        .collect();
    if !degraded.is_empty() {
        println!("Short days:     {}", degraded.join(", "));
    }

    println!();
    println!("--- Performance ---");
    match (&summary.performance, &summary.performance_error) {
        (Some(tail), _) => {
            println!("As of:          {}", tail.date);
            println!("Index value:    {:.4}", tail.index_value);
            println!("Cumulative:     {:.2}%", tail.cumulative_return * 100.0);
            println!("Points:         {}", tail.points);
        }
        (None, Some(err)) => println!("Not extended:   {err}"),
        (None, None) => println!("Not extended"),
    }
}

fn print_performance(series: &[PerformanceEntry]) {
    if series.is_empty() {
        println!("No performance data in range");
        return;
    }
    println!("{:<12} {:>12} {:>12} {:>14}", "Date", "Daily", "Cumulative", "Index");
    println!("{}", "-".repeat(53));
    for e in series {
        println!(
            "{:<12} {:>11.4}% {:>11.4}% {:>14.4}",
            e.date.to_string(),
            e.daily_return * 100.0,
            e.cumulative_return * 100.0,
            e.index_value
        );
    }
}

fn print_composition(views: &[CompositionView]) {
    let Some(first) = views.first() else {
        return;
    };
    println!("Composition on {} ({} constituents)", first.date, views.len());
    println!();
    println!("{:>5} {:<10} {:>10} {:>20} {:>12}", "Rank", "Symbol", "Weight", "Market Cap", "Close");
    println!("{}", "-".repeat(61));
    for v in views {
        let close = v.price.map(|p| format!("{p:.4}")).unwrap_or_else(|| "-".into());
        println!(
            "{:>5} {:<10} {:>9.4}% {:>20.0} {:>12}",
            v.rank,
            v.symbol,
            v.weight * 100.0,
            v.market_cap,
            close
        );
    }
}

fn print_changes(changes: &[CompositionChange]) {
    if changes.is_empty() {
        println!("No composition changes in range");
        return;
    }
    let rank = |r: Option<u32>| r.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
    println!("{:<12} {:<10} {:<14} {:>8} {:>8}", "Date", "Symbol", "Kind", "Old", "New");
    println!("{}", "-".repeat(56));
    for c in changes {
        println!(
            "{:<12} {:<10} {:<14} {:>8} {:>8}",
            c.date.to_string(),
            c.symbol,
            c.kind.as_str(),
            rank(c.old_rank),
            rank(c.new_rank)
        );
    }
}

fn print_change_summary(summary: &[DailyChangeSummary]) {
    if summary.is_empty() {
        println!("No composition changes in range");
        return;
    }
    for s in summary {
        println!("{} ({} changes)", s.date, s.total_changes);
        if !s.entered.is_empty() {
            println!("  entered: {}", s.entered.join(", "));
        }
        if !s.exited.is_empty() {
            println!("  exited:  {}", s.exited.join(", "));
        }
        if s.rank_changes > 0 {
            println!("  rank moves: {}", s.rank_changes);
        }
    }
}

fn print_cache_status(status: &CacheStatus) {
    if !status.enabled {
        println!("Cache: disabled");
        return;
    }
    println!("Backend:          {}", status.backend.as_deref().unwrap_or("-"));
    match status.entries {
        Some(n) => println!("Entries:          {n}"),
        None => println!("Entries:          (unavailable)"),
    }
    println!("Hits / misses:    {} / {}", status.hits, status.misses);
    println!("Transport errors: {}", status.transport_errors);
    println!("Breaker:          {}", if status.breaker_open { "open" } else { "closed" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_end_is_optional() {
        let cli = Cli::try_parse_from(["topcap", "build", "--start", "2024-01-15"]).unwrap();
        match cli.command {
            Commands::Build { start, end } => {
                assert_eq!(start, "2024-01-15");
                assert!(end.is_none());
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["topcap", "cache", "status", "--json", "--config", "topcap.toml"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("topcap.toml")));
    }

    #[test]
    fn malformed_dates_are_rejected() {
        assert!(date("2024-13-01").is_err());
        assert!(date("15/01/2024").is_err());
        assert_eq!(date("2024-01-15").unwrap(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/topcap/config.toml");
        assert!(load_config(Some(&path)).is_err());
        assert_eq!(load_config(None).unwrap().index.top_k, 100);
    }
}
