//! In-memory stores.
//!
//! `MemoryMarketData` is the date-indexed reader the Parquet archive loads
//! into; `MemoryIndexStore` keeps compositions and performance in maps
//! behind read/write locks, so a snapshot swap for one date is all-or-nothing.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use parking_lot::RwLock;

use super::{CompositionStore, MarketDataReader, PerformanceStore};
use crate::domain::{CompositionEntry, DailyPrice, PerformanceEntry};
use crate::error::IndexError;

/// Daily prices indexed by date, each day's rows sorted by symbol.
#[derive(Debug, Default)]
pub struct MemoryMarketData {
    by_date: BTreeMap<NaiveDate, Vec<DailyPrice>>,
}

impl MemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary rows. A later row for the same (symbol, date)
    /// replaces an earlier one.
    pub fn from_prices(prices: impl IntoIterator<Item = DailyPrice>) -> Self {
        let mut data = Self::new();
        for p in prices {
            data.insert(p);
        }
        data
    }

    pub fn insert(&mut self, price: DailyPrice) {
        let day = self.by_date.entry(price.date).or_default();
        match day.binary_search_by(|p| p.symbol.as_str().cmp(price.symbol.as_str())) {
            Ok(i) => day[i] = price,
            Err(i) => day.insert(i, price),
        }
    }

    pub fn len(&self) -> usize {
        self.by_date.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    /// Distinct symbols across all dates, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .by_date
            .values()
            .flat_map(|day| day.iter().map(|p| p.symbol.clone()))
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// First and last dates with data.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = *self.by_date.keys().next()?;
        let last = *self.by_date.keys().next_back()?;
        Some((first, last))
    }
}

impl MarketDataReader for MemoryMarketData {
    fn prices_on(&self, date: NaiveDate) -> Result<Vec<DailyPrice>, IndexError> {
        Ok(self.by_date.get(&date).cloned().unwrap_or_default())
    }

    fn prices_for(&self, symbols: &[&str], date: NaiveDate) -> Result<Vec<DailyPrice>, IndexError> {
        let Some(day) = self.by_date.get(&date) else {
            return Ok(Vec::new());
        };
        Ok(symbols
            .iter()
            .filter_map(|s| {
                day.binary_search_by(|p| p.symbol.as_str().cmp(*s))
                    .ok()
                    .map(|i| day[i].clone())
            })
            .collect())
    }

    fn price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyPrice>, IndexError> {
        if end < start {
            return Ok(Vec::new());
        }
        Ok(self
            .by_date
            .range(start..=end)
            .filter_map(|(_, day)| {
                day.binary_search_by(|p| p.symbol.as_str().cmp(symbol))
                    .ok()
                    .map(|i| day[i].clone())
            })
            .collect())
    }

    fn trading_dates(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, IndexError> {
        if end < start {
            return Ok(Vec::new());
        }
        Ok(self
            .by_date
            .range(start..=end)
            .filter(|(_, day)| day.iter().any(DailyPrice::is_eligible))
            .map(|(d, _)| *d)
            .collect())
    }

    fn previous_trading_date(&self, date: NaiveDate) -> Result<Option<NaiveDate>, IndexError> {
        Ok(self
            .by_date
            .range(..date)
            .rev()
            .find(|(_, day)| day.iter().any(DailyPrice::is_eligible))
            .map(|(d, _)| *d))
    }
}

/// Compositions and performance held in memory.
#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    compositions: RwLock<BTreeMap<NaiveDate, Vec<CompositionEntry>>>,
    performance: RwLock<BTreeMap<NaiveDate, PerformanceEntry>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompositionStore for MemoryIndexStore {
    fn get_composition(&self, date: NaiveDate) -> Result<Vec<CompositionEntry>, IndexError> {
        Ok(self.compositions.read().get(&date).cloned().unwrap_or_default())
    }

    fn put_composition(&self, date: NaiveDate, entries: &[CompositionEntry]) -> Result<(), IndexError> {
        let mut snapshot = entries.to_vec();
        snapshot.sort_by_key(|e| e.rank);
        self.compositions.write().insert(date, snapshot);
        Ok(())
    }

    fn get_composition_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<CompositionEntry>>, IndexError> {
        if end < start {
            return Ok(BTreeMap::new());
        }
        Ok(self
            .compositions
            .read()
            .range(start..=end)
            .map(|(d, entries)| (*d, entries.clone()))
            .collect())
    }

    fn first_composition_date(&self) -> Result<Option<NaiveDate>, IndexError> {
        Ok(self.compositions.read().keys().next().copied())
    }
}

impl PerformanceStore for MemoryIndexStore {
    fn get_performance(&self, date: NaiveDate) -> Result<Option<PerformanceEntry>, IndexError> {
        Ok(self.performance.read().get(&date).cloned())
    }

    fn put_performance(&self, entries: &[PerformanceEntry]) -> Result<(), IndexError> {
        let mut series = self.performance.write();
        for e in entries {
            series.insert(e.date, e.clone());
        }
        Ok(())
    }

    fn get_performance_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PerformanceEntry>, IndexError> {
        if end < start {
            return Ok(Vec::new());
        }
        Ok(self
            .performance
            .read()
            .range(start..=end)
            .map(|(_, e)| e.clone())
            .collect())
    }

    fn truncate_performance_from(&self, date: NaiveDate) -> Result<usize, IndexError> {
        let mut series = self.performance.write();
        let stale: Vec<NaiveDate> = series.range(date..).map(|(d, _)| *d).collect();
        for d in &stale {
            series.remove(d);
        }
        Ok(stale.len())
    }
}
