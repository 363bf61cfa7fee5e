//! Export bundle: CSV tables plus a JSON manifest for one date range.
//!
//! Bundle layout (`{out}/index_{start}_{end}/`):
//! - `performance.csv`: date, daily_return, cumulative_return, index_value
//! - `compositions.csv`: every stored snapshot in the range, joined with close
//! - `changes.csv`: change list between consecutive snapshots
//! - `change_summary.csv`: per-date entered/exited digest
//! - `prices.csv`: daily rows of every symbol that was a constituent
//! - `manifest.json`: range, row counts, `schema_version`

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use topcap_core::domain::{CompositionChange, CompositionView, DailyChangeSummary, DailyPrice, PerformanceEntry};

use crate::changes::summarize;
use crate::service::IndexService;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub generated_at: String,
    pub top_k: usize,
    pub strategy: String,
    pub base_value: f64,
    /// Data rows per file, header excluded.
    pub rows: BTreeMap<String, usize>,
}

/// Load a manifest, rejecting newer schema versions.
pub fn read_manifest(path: &Path) -> Result<ExportManifest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest: {}", path.display()))?;
    let manifest: ExportManifest = serde_json::from_str(&json).context("failed to parse manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── CSV tables ─────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn performance_csv(series: &[PerformanceEntry]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "daily_return", "cumulative_return", "index_value"])?;
    for e in series {
        wtr.write_record([
            &e.date.to_string(),
            &format!("{:.8}", e.daily_return),
            &format!("{:.8}", e.cumulative_return),
            &format!("{:.4}", e.index_value),
        ])?;
    }
    finish(wtr)
}

pub fn compositions_csv(views: &[CompositionView]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "rank", "symbol", "weight", "market_cap", "close"])?;
    for v in views {
        wtr.write_record([
            &v.date.to_string(),
            &v.rank.to_string(),
            &v.symbol,
            &format!("{:.8}", v.weight),
            &format!("{:.0}", v.market_cap),
            &v.price.map(|p| format!("{p:.4}")).unwrap_or_default(),
        ])?;
    }
    finish(wtr)
}

pub fn changes_csv(changes: &[CompositionChange]) -> Result<String> {
    let opt = |v: Option<String>| v.unwrap_or_default();
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "symbol", "kind", "old_rank", "new_rank", "old_weight", "new_weight"])?;
    for c in changes {
        wtr.write_record([
            &c.date.to_string(),
            &c.symbol,
            &c.kind.as_str().to_string(),
            &opt(c.old_rank.map(|r| r.to_string())),
            &opt(c.new_rank.map(|r| r.to_string())),
            &opt(c.old_weight.map(|w| format!("{w:.8}"))),
            &opt(c.new_weight.map(|w| format!("{w:.8}"))),
        ])?;
    }
    finish(wtr)
}

/// Symbol lists are `;`-separated within their cell.
pub fn change_summary_csv(summary: &[DailyChangeSummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "entered", "exited", "rank_changes", "total_changes"])?;
    for s in summary {
        wtr.write_record([
            &s.date.to_string(),
            &s.entered.join(";"),
            &s.exited.join(";"),
            &s.rank_changes.to_string(),
            &s.total_changes.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn prices_csv(rows: &[DailyPrice]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "date", "open", "high", "low", "close", "volume", "market_cap"])?;
    for p in rows {
        wtr.write_record([
            &p.symbol,
            &p.date.to_string(),
            &format!("{:.4}", p.open),
            &format!("{:.4}", p.high),
            &format!("{:.4}", p.low),
            &format!("{:.4}", p.close),
            &p.volume.to_string(),
            &format!("{:.0}", p.market_cap),
        ])?;
    }
    finish(wtr)
}

// ─── Bundle ─────────────────────────────────────────────────────────

/// Write the full bundle for `[start, end]` and return its directory.
///
/// Fails before writing anything if the range is invalid or not fully built.
pub fn export_bundle(service: &IndexService, start: NaiveDate, end: NaiveDate, out_dir: &Path) -> Result<PathBuf> {
    let performance = service.get_performance(start, end)?;
    let changes = service.get_changes(start, end)?;
    let summary = summarize(&changes);

    let stores = service.stores();
    let snapshots = stores.compositions.get_composition_range(start, end)?;
    let mut views = Vec::new();
    let mut constituents = BTreeSet::new();
    for (date, snapshot) in &snapshots {
        let symbols: Vec<&str> = snapshot.iter().map(|e| e.symbol.as_str()).collect();
        let closes = stores.market.closes_for(&symbols, *date)?;
        for e in snapshot {
            constituents.insert(e.symbol.clone());
            views.push(CompositionView::new(e, closes.get(&e.symbol).copied()));
        }
    }

    let mut prices = Vec::new();
    for symbol in &constituents {
        prices.extend(stores.market.price_history(symbol, start, end)?);
    }

    let bundle_dir = out_dir.join(format!("index_{start}_{end}"));
    std::fs::create_dir_all(&bundle_dir)
        .with_context(|| format!("failed to create export dir: {}", bundle_dir.display()))?;

    let files = [
        ("performance.csv", performance_csv(&performance)?, performance.len()),
        ("compositions.csv", compositions_csv(&views)?, views.len()),
        ("changes.csv", changes_csv(&changes)?, changes.len()),
        ("change_summary.csv", change_summary_csv(&summary)?, summary.len()),
        ("prices.csv", prices_csv(&prices)?, prices.len()),
    ];

    let mut rows = BTreeMap::new();
    for (name, content, count) in files {
        let path = bundle_dir.join(name);
        std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
        rows.insert(name.to_string(), count);
    }

    let config = service.config();
    let manifest = ExportManifest {
        schema_version: SCHEMA_VERSION,
        start,
        end,
        generated_at: chrono::Utc::now().to_rfc3339(),
        top_k: config.index.top_k,
        strategy: config.index.strategy.clone(),
        base_value: config.index.base_value,
        rows,
    };
    let json = serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;
    std::fs::write(bundle_dir.join("manifest.json"), json)?;

    tracing::info!(dir = %bundle_dir.display(), "export written");
    Ok(bundle_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use topcap_core::domain::ChangeKind;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn performance_csv_has_header_and_rows() {
        let csv = performance_csv(&[
            PerformanceEntry::base(d("2024-01-15"), 1000.0),
            PerformanceEntry::compound(d("2024-01-16"), 1000.0, 0.01, 1000.0),
        ])
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,daily_return,cumulative_return,index_value");
        assert_eq!(lines[2], "2024-01-16,0.01000000,0.01000000,1010.0000");
    }

    #[test]
    fn changes_csv_leaves_absent_sides_empty() {
        let csv = changes_csv(&[CompositionChange {
            date: d("2024-01-16"),
            symbol: "ABC".into(),
            kind: ChangeKind::Added,
            old_rank: None,
            new_rank: Some(3),
            old_weight: None,
            new_weight: Some(0.5),
        }])
        .unwrap();
        assert_eq!(csv.lines().nth(1), Some("2024-01-16,ABC,ADDED,,3,,0.50000000"));
    }

    #[test]
    fn summary_csv_joins_symbols() {
        let csv = change_summary_csv(&[DailyChangeSummary {
            date: d("2024-01-16"),
            entered: vec!["ABC".into(), "DEF".into()],
            exited: vec!["XYZ".into()],
            rank_changes: 1,
            total_changes: 3,
        }])
        .unwrap();
        assert_eq!(csv.lines().nth(1), Some("2024-01-16,ABC;DEF,XYZ,1,3"));
    }

    #[test]
    fn newer_manifest_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut manifest = ExportManifest {
            schema_version: SCHEMA_VERSION + 1,
            start: d("2024-01-01"),
            end: d("2024-01-31"),
            generated_at: "2024-02-01T00:00:00Z".into(),
            top_k: 100,
            strategy: "equal_weight".into(),
            base_value: 1000.0,
            rows: BTreeMap::new(),
        };
        std::fs::write(&path, serde_json::to_string(&manifest).unwrap()).unwrap();
        assert!(read_manifest(&path).is_err());

        manifest.schema_version = SCHEMA_VERSION;
        std::fs::write(&path, serde_json::to_string(&manifest).unwrap()).unwrap();
        assert_eq!(read_manifest(&path).unwrap(), manifest);
    }
}
