//! Daily composition construction over a date range.
//!
//! For each calendar date in the range: select the top K by market cap,
//! weight the selection, and replace the stored snapshot for that date.
//! Dates without eligible data are skipped and reported, not fatal.
//!
//! Selection and weighting for independent dates can fan out over rayon;
//! results are persisted in date order either way.

use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use topcap_core::dates::{calendar_days, validate_range};
use topcap_core::domain::{snapshot_violations, CompositionEntry};
use topcap_core::selector::ConstituentSelector;
use topcap_core::weighting::WeightingStrategy;
use topcap_core::IndexError;

use crate::performance::PerformanceCalculator;
use crate::stores::IndexStores;

/// What happened to one date of a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DayOutcome {
    Built {
        date: NaiveDate,
        symbols: Vec<String>,
        degraded: bool,
        /// The date already had a different snapshot.
        replaced: bool,
    },
    Skipped {
        date: NaiveDate,
        reason: String,
    },
}

impl DayOutcome {
    pub fn date(&self) -> NaiveDate {
        match self {
            DayOutcome::Built { date, .. } | DayOutcome::Skipped { date, .. } => *date,
        }
    }
}

/// Last point of the performance series after a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTail {
    pub date: NaiveDate,
    pub index_value: f64,
    pub cumulative_return: f64,
    pub points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<DayOutcome>,
    pub built: usize,
    pub skipped: usize,
    /// Snapshots persisted: new dates plus changed ones. Unchanged dates are not rewritten.
    pub written: usize,
    /// Dates whose existing snapshot was replaced by a different one.
    pub rewritten: Vec<NaiveDate>,
    /// Persisted performance entries dropped because their inputs changed.
    pub truncated_performance: usize,
    pub performance: Option<PerformanceTail>,
    /// Why performance could not be extended, when it was requested.
    pub performance_error: Option<String>,
}

pub struct IndexBuilder {
    stores: IndexStores,
    selector: ConstituentSelector,
    strategy: Arc<dyn WeightingStrategy>,
    calculator: Arc<PerformanceCalculator>,
    parallel: bool,
}

impl IndexBuilder {
    pub fn new(
        stores: IndexStores,
        top_k: usize,
        strategy: Arc<dyn WeightingStrategy>,
        calculator: Arc<PerformanceCalculator>,
        parallel: bool,
    ) -> Self {
        let selector = ConstituentSelector::new(stores.market.clone(), top_k);
        Self {
            stores,
            selector,
            strategy,
            calculator,
            parallel,
        }
    }

    pub fn top_k(&self) -> usize {
        self.selector.top_k()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Selection plus weighting for one date, not persisted.
    pub fn compose(&self, date: NaiveDate) -> Result<(Vec<CompositionEntry>, bool), IndexError> {
        let selection = self.selector.select(date)?;
        let weights = self.strategy.assign_weights(&selection.constituents);

        let entries: Vec<CompositionEntry> = selection
            .constituents
            .iter()
            .enumerate()
            .map(|(i, c)| CompositionEntry {
                date,
                symbol: c.symbol.clone(),
                weight: weights.get(&c.symbol).copied().unwrap_or(0.0),
                market_cap: c.market_cap,
                rank: i as u32 + 1,
            })
            .collect();

        let problems = snapshot_violations(&entries);
        if !problems.is_empty() {
            return Err(IndexError::InvalidSnapshot {
                date,
                reason: problems.join("; "),
            });
        }
        Ok((entries, selection.degraded))
    }

    /// Build and persist compositions for `[start, end]`.
    ///
    /// With `extend_performance`, the performance series is recomputed over
    /// the range afterwards; a failure there is reported in the summary and
    /// does not undo the compositions.
    pub fn build(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        extend_performance: bool,
    ) -> Result<BuildSummary, IndexError> {
        validate_range(start, end)?;
        let days = calendar_days(start, end);
        tracing::info!(%start, %end, days = days.len(), top_k = self.top_k(), "building index");

        let composed: Vec<(NaiveDate, Result<(Vec<CompositionEntry>, bool), IndexError>)> = if self.parallel {
            days.par_iter().map(|d| (*d, self.compose(*d))).collect()
        } else {
            days.iter().map(|d| (*d, self.compose(*d))).collect()
        };

        let mut outcomes = Vec::with_capacity(composed.len());
        let mut rewritten = Vec::new();
        let mut pending: Vec<(NaiveDate, Vec<CompositionEntry>)> = Vec::new();

        for (date, result) in composed {
            match result {
                Ok((entries, degraded)) => {
                    let previous = self.stores.compositions.get_composition(date)?;
                    let replaced = !previous.is_empty() && previous != entries;
                    if replaced {
                        rewritten.push(date);
                    }
                    outcomes.push(DayOutcome::Built {
                        date,
                        symbols: entries.iter().map(|e| e.symbol.clone()).collect(),
                        degraded,
                        replaced,
                    });
                    if previous != entries {
                        pending.push((date, entries));
                    }
                }
                Err(e) if e.is_skippable() => {
                    tracing::debug!(%date, reason = %e, "skipping date");
                    outcomes.push(DayOutcome::Skipped {
                        date,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        // Index values from the first changed date on were compounded over the
        // old snapshots. Drop them before any write so a failed write cannot
        // leave them behind.
        let earliest_new = pending.first().map(|(date, _)| *date);
        let truncated_performance = match earliest_new {
            Some(from) => self.stores.performance.truncate_performance_from(from)?,
            None => 0,
        };
        if truncated_performance > 0 {
            tracing::info!(from = ?earliest_new, dropped = truncated_performance, "dropped stale performance");
        }

        for (date, entries) in &pending {
            self.stores.compositions.put_composition(*date, entries)?;
        }

        let built = outcomes
            .iter()
            .filter(|o| matches!(o, DayOutcome::Built { .. }))
            .count();
        let skipped = outcomes.len() - built;

        let (performance, performance_error) = if extend_performance && built > 0 {
            match self.calculator.compute(start, end) {
                Ok(series) => (
                    series.last().map(|last| PerformanceTail {
                        date: last.date,
                        index_value: last.index_value,
                        cumulative_return: last.cumulative_return,
                        points: series.len(),
                    }),
                    None,
                ),
                Err(e) => {
                    tracing::warn!(%start, %end, error = %e, "performance not extended");
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        tracing::info!(%start, %end, built, skipped, rewritten = rewritten.len(), "build complete");
        Ok(BuildSummary {
            start,
            end,
            days: outcomes,
            built,
            skipped,
            written: pending.len(),
            rewritten,
            truncated_performance,
            performance,
            performance_error,
        })
    }
}
