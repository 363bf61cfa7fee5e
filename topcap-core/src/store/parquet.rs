//! Parquet price archive with Hive-style partitioning.
//!
//! Layout: `{dir}/symbol={SYMBOL}/{year}.parquet`
//!
//! This is the format the ingestion job writes daily prices in. Features:
//! - Atomic writes (private temp file, renamed into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per symbol (hash, date range, row count)
//!
//! `load` reads every partition into a date-indexed `MemoryMarketData`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::file::{replace_atomic, write_atomic};
use super::memory::MemoryMarketData;
use crate::domain::DailyPrice;
use crate::error::IndexError;

const EXPECTED_COLUMNS: [&str; 7] = ["date", "open", "high", "low", "close", "volume", "market_cap"];

/// Metadata sidecar for one archived symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub row_count: usize,
    pub data_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

pub struct ParquetPriceStore {
    dir: PathBuf,
}

impl ParquetPriceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("symbol={symbol}"))
    }

    fn year_path(&self, symbol: &str, year: i32) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    /// Replace one symbol's archive with `rows`, one Parquet file per
    /// calendar year.
    ///
    /// Rows must all belong to `symbol`. Each year partition is replaced
    /// atomically, year partitions absent from `rows` are removed, and the
    /// `meta.json` sidecar is recomputed from what is on disk afterwards.
    pub fn write(&self, symbol: &str, rows: &[DailyPrice]) -> Result<(), IndexError> {
        if rows.is_empty() {
            return Err(IndexError::Storage(format!("no rows to archive for {symbol}")));
        }
        if let Some(stray) = rows.iter().find(|r| r.symbol != symbol) {
            return Err(IndexError::Storage(format!(
                "row for {} passed to archive of {symbol}",
                stray.symbol
            )));
        }

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| IndexError::Storage(format!("failed to create dir: {e}")))?;

        let mut sorted: Vec<&DailyPrice> = rows.iter().collect();
        sorted.sort_by_key(|r| r.date);

        let mut by_year: HashMap<i32, Vec<&DailyPrice>> = HashMap::new();
        for row in &sorted {
            by_year.entry(row.date.year()).or_default().push(row);
        }

        for (year, year_rows) in &by_year {
            let df = rows_to_dataframe(year_rows)?;
            replace_atomic(&self.year_path(symbol, *year), |file| write_parquet(&df, file))?;
        }

        for (year, path) in self.partitions(symbol)? {
            if !by_year.contains_key(&year) {
                fs::remove_file(&path)
                    .map_err(|e| IndexError::Storage(format!("remove {}: {e}", path.display())))?;
            }
        }

        self.refresh_meta(symbol)
    }

    /// Year partitions currently on disk for `symbol`.
    fn partitions(&self, symbol: &str) -> Result<Vec<(i32, PathBuf)>, IndexError> {
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&sym_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(year) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse().ok()) {
                out.push((year, path));
            }
        }
        out.sort();
        Ok(out)
    }

    /// Rewrite the sidecar so it describes the whole archive of `symbol`.
    fn refresh_meta(&self, symbol: &str) -> Result<(), IndexError> {
        let rows = self.load_symbol(symbol)?;
        let (first, last) = match (rows.first(), rows.last()) {
            (Some(f), Some(l)) => (f.date, l.date),
            _ => return Ok(()),
        };
        let meta = PriceMeta {
            symbol: symbol.to_string(),
            start_date: first,
            end_date: last,
            row_count: rows.len(),
            data_hash: blake3::hash(&serde_json::to_vec(&rows)?).to_hex().to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        write_atomic(&self.meta_path(symbol), &serde_json::to_vec_pretty(&meta)?)
    }

    /// Symbols with an archive directory, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, IndexError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(symbol) = name.strip_prefix("symbol=") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// One symbol's rows, sorted by date.
    pub fn load_symbol(&self, symbol: &str) -> Result<Vec<DailyPrice>, IndexError> {
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        for entry in fs::read_dir(&sym_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            match load_and_validate_parquet(&path, symbol) {
                Ok(year_rows) => rows.extend(year_rows),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "quarantining corrupt price partition"
                    );
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }

    /// Load the whole archive into a date-indexed reader.
    pub fn load(&self) -> Result<MemoryMarketData, IndexError> {
        let mut data = MemoryMarketData::new();
        for symbol in self.symbols()? {
            for row in self.load_symbol(&symbol)? {
                data.insert(row);
            }
        }
        tracing::info!(
            dir = %self.dir.display(),
            rows = data.len(),
            "loaded price archive"
        );
        Ok(data)
    }

    pub fn get_meta(&self, symbol: &str) -> Option<PriceMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn rows_to_dataframe(rows: &[&DailyPrice]) -> Result<DataFrame, IndexError> {
    let epoch = epoch();
    let dates: Vec<i32> = rows.iter().map(|r| (r.date - epoch).num_days() as i32).collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<u64> = rows.iter().map(|r| r.volume).collect();
    let caps: Vec<f64> = rows.iter().map(|r| r.market_cap).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| IndexError::Storage(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("market_cap".into(), caps),
    ])
    .map_err(|e| IndexError::Storage(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, file: &mut fs::File) -> Result<(), IndexError> {
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| IndexError::Storage(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path, symbol: &str) -> Result<Vec<DailyPrice>, IndexError> {
    let file = fs::File::open(path).map_err(|e| IndexError::Storage(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| IndexError::Storage(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(IndexError::Storage("empty parquet file".into()));
    }
    for col_name in &EXPECTED_COLUMNS {
        if df.column(col_name).is_err() {
            return Err(IndexError::Storage(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_rows(&df, symbol)
}

fn dataframe_to_rows(df: &DataFrame, symbol: &str) -> Result<Vec<DailyPrice>, IndexError> {
    let col_err = |name: &str, e: PolarsError| IndexError::Storage(format!("{name} column: {e}"));

    let dates = df.column("date").map_err(|e| col_err("date", e))?;
    let date_ca = dates.date().map_err(|e| col_err("date", e))?;
    let open_ca = df.column("open").map_err(|e| col_err("open", e))?.f64().map_err(|e| col_err("open", e))?;
    let high_ca = df.column("high").map_err(|e| col_err("high", e))?.f64().map_err(|e| col_err("high", e))?;
    let low_ca = df.column("low").map_err(|e| col_err("low", e))?.f64().map_err(|e| col_err("low", e))?;
    let close_ca = df.column("close").map_err(|e| col_err("close", e))?.f64().map_err(|e| col_err("close", e))?;
    let vol_ca = df.column("volume").map_err(|e| col_err("volume", e))?.u64().map_err(|e| col_err("volume", e))?;
    let cap_ca = df
        .column("market_cap")
        .map_err(|e| col_err("market_cap", e))?
        .f64()
        .map_err(|e| col_err("market_cap", e))?;

    let epoch = epoch();
    let n = df.height();
    let mut rows = Vec::with_capacity(n);

    for i in 0..n {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| IndexError::Storage(format!("null date at row {i}")))?;

        rows.push(DailyPrice {
            symbol: symbol.to_string(),
            date: epoch + chrono::Duration::days(date_days as i64),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
            market_cap: cap_ca.get(i).unwrap_or(f64::NAN),
        });
    }

    Ok(rows)
}
