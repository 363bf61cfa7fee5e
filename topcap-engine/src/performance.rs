//! Index level series: daily returns compounded from the base value.
//!
//! The base is the first date of the tracked history (the earliest stored
//! composition), where the index starts at `base_value` with a zero return.
//! For a later trading date `t` with previous trading date `p`, the daily
//! return is the weighted close-to-close change from `p` to `t` of the
//! constituents held on `t`. Constituents without a positive close on `p`
//! are left out and the remaining weights are not renormalized.

use std::collections::HashMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use topcap_core::dates::validate_range;
use topcap_core::domain::{CompositionEntry, PerformanceEntry};
use topcap_core::IndexError;

use crate::stores::IndexStores;

pub struct PerformanceCalculator {
    stores: IndexStores,
    base_value: f64,
    parallel: bool,
}

impl PerformanceCalculator {
    pub fn new(stores: IndexStores, base_value: f64, parallel: bool) -> Self {
        Self {
            stores,
            base_value,
            parallel,
        }
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    /// Performance for every trading date in `[start, end]`, persisted as a
    /// side effect. Recomputing an unchanged range gives identical entries.
    pub fn compute(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PerformanceEntry>, IndexError> {
        validate_range(start, end)?;
        let covered = self.stores.covered_snapshots(start, end)?;
        let Some((first, _)) = covered.first() else {
            return Ok(Vec::new());
        };
        let first = *first;

        let base = self
            .stores
            .compositions
            .first_composition_date()?
            .ok_or(IndexError::MissingComposition { date: first })?;

        let returns: Vec<f64> = if self.parallel {
            covered
                .par_iter()
                .map(|(date, snapshot)| self.daily_return(*date, snapshot, base))
                .collect::<Result<_, _>>()?
        } else {
            covered
                .iter()
                .map(|(date, snapshot)| self.daily_return(*date, snapshot, base))
                .collect::<Result<_, _>>()?
        };

        let mut previous_value = if first == base {
            None
        } else {
            Some(self.seed_value(first, base)?)
        };

        let mut series = Vec::with_capacity(covered.len());
        for ((date, _), daily_return) in covered.iter().zip(returns) {
            let entry = match previous_value {
                None => PerformanceEntry::base(*date, self.base_value),
                Some(prev) => PerformanceEntry::compound(*date, prev, daily_return, self.base_value),
            };
            previous_value = Some(entry.index_value);
            series.push(entry);
        }

        self.stores.performance.put_performance(&series)?;
        tracing::debug!(%start, %end, points = series.len(), "performance computed");
        Ok(series)
    }

    /// Index value on the trading date before `first`: the persisted point
    /// if there is one, otherwise recomputed from the base.
    fn seed_value(&self, first: NaiveDate, base: NaiveDate) -> Result<f64, IndexError> {
        let Some(prev) = self.stores.market.previous_trading_date(first)? else {
            return Ok(self.base_value);
        };
        if let Some(entry) = self.stores.performance.get_performance(prev)? {
            return Ok(entry.index_value);
        }
        tracing::debug!(%base, %prev, "no persisted seed, recomputing from base");
        let history = self.compute(base, prev)?;
        Ok(history.last().map_or(self.base_value, |e| e.index_value))
    }

    fn daily_return(
        &self,
        date: NaiveDate,
        snapshot: &[CompositionEntry],
        base: NaiveDate,
    ) -> Result<f64, IndexError> {
        if date == base {
            return Ok(0.0);
        }
        let Some(prev) = self.stores.market.previous_trading_date(date)? else {
            return Ok(0.0);
        };

        let symbols: Vec<&str> = snapshot.iter().map(|e| e.symbol.as_str()).collect();
        let prev_closes = self.stores.market.closes_for(&symbols, prev)?;
        let closes = self.stores.market.closes_for(&symbols, date)?;
        Ok(portfolio_return(snapshot, &prev_closes, &closes))
    }
}

/// Weighted close-to-close return of `snapshot` between two sets of closes.
///
/// Entries missing either close, or with a non-positive previous close,
/// contribute nothing.
pub fn portfolio_return(
    snapshot: &[CompositionEntry],
    prev_closes: &HashMap<String, f64>,
    closes: &HashMap<String, f64>,
) -> f64 {
    snapshot
        .iter()
        .filter_map(|e| {
            let prev = *prev_closes.get(&e.symbol)?;
            let close = *closes.get(&e.symbol)?;
            (prev.is_finite() && prev > 0.0 && close.is_finite())
                .then(|| e.weight * (close - prev) / prev)
        })
        .sum()
}
