//! Storage traits and implementations.
//!
//! The engine consumes three narrow query surfaces so the storage engine can
//! be swapped or mocked:
//! - `MarketDataReader`: read-only daily prices written by the ingestion job
//! - `CompositionStore`: composition snapshots, replaced atomically per date
//! - `PerformanceStore`: the persisted index level series
//!
//! Implementations: in-memory (`memory`), JSON files with atomic renames
//! (`file`), and the Hive-partitioned Parquet price archive (`parquet`).

pub mod file;
pub mod memory;
pub mod parquet;

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::domain::{CompositionEntry, DailyPrice, PerformanceEntry};
use crate::error::IndexError;

pub use file::{replace_atomic, write_atomic, FileIndexStore};
pub use memory::{MemoryIndexStore, MemoryMarketData};
pub use parquet::{ParquetPriceStore, PriceMeta};

/// Read-only access to ingested daily prices.
pub trait MarketDataReader: Send + Sync {
    /// All rows for `date`, ordered by symbol.
    fn prices_on(&self, date: NaiveDate) -> Result<Vec<DailyPrice>, IndexError>;

    /// Rows for the given symbols on `date`; symbols without a row are absent.
    fn prices_for(&self, symbols: &[&str], date: NaiveDate) -> Result<Vec<DailyPrice>, IndexError>;

    /// One symbol's rows in `[start, end]`, ordered by date.
    fn price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyPrice>, IndexError>;

    /// Dates in `[start, end]` with at least one rankable row (finite,
    /// positive market cap), ascending. These are the dates the index trades.
    fn trading_dates(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, IndexError>;

    /// The latest trading date strictly before `date`.
    fn previous_trading_date(&self, date: NaiveDate) -> Result<Option<NaiveDate>, IndexError>;

    /// Close prices keyed by symbol for `symbols` on `date`.
    fn closes_for(&self, symbols: &[&str], date: NaiveDate) -> Result<HashMap<String, f64>, IndexError> {
        Ok(self
            .prices_for(symbols, date)?
            .into_iter()
            .map(|p| (p.symbol, p.close))
            .collect())
    }
}

/// Persisted composition snapshots.
pub trait CompositionStore: Send + Sync {
    /// The snapshot for `date` ordered by rank; empty if never built.
    fn get_composition(&self, date: NaiveDate) -> Result<Vec<CompositionEntry>, IndexError>;

    /// Replace the whole snapshot for `date`. Readers see either the previous
    /// snapshot or the new one, never a mix.
    fn put_composition(&self, date: NaiveDate, entries: &[CompositionEntry]) -> Result<(), IndexError>;

    /// Snapshots in `[start, end]` grouped by date, ascending.
    fn get_composition_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<CompositionEntry>>, IndexError>;

    /// The earliest date with a stored snapshot: the base of the tracked history.
    fn first_composition_date(&self) -> Result<Option<NaiveDate>, IndexError>;
}

/// The persisted index level series.
pub trait PerformanceStore: Send + Sync {
    fn get_performance(&self, date: NaiveDate) -> Result<Option<PerformanceEntry>, IndexError>;

    /// Insert or replace one entry per date.
    fn put_performance(&self, entries: &[PerformanceEntry]) -> Result<(), IndexError>;

    fn get_performance_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PerformanceEntry>, IndexError>;

    /// Drop every entry on or after `date`; later values depend on it.
    fn truncate_performance_from(&self, date: NaiveDate) -> Result<usize, IndexError>;
}
