//! Composition snapshots: the constituents, ranks and weights held on one date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::WEIGHT_SUM_TOLERANCE;

/// A ranked candidate produced by constituent selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    pub symbol: String,
    pub market_cap: f64,
}

/// Output of selecting the top K symbols on one date.
///
/// `constituents` is ordered by rank (largest market cap first). `degraded`
/// is set when fewer than K eligible symbols had data that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub date: NaiveDate,
    pub constituents: Vec<Constituent>,
    pub degraded: bool,
}

/// One constituent of the index on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionEntry {
    pub date: NaiveDate,
    pub symbol: String,
    pub weight: f64,
    pub market_cap: f64,
    /// 1 = largest market cap.
    pub rank: u32,
}

/// A composition entry joined with the constituent's close on that date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionView {
    pub date: NaiveDate,
    pub symbol: String,
    pub weight: f64,
    pub market_cap: f64,
    pub rank: u32,
    pub price: Option<f64>,
}

impl CompositionView {
    pub fn new(entry: &CompositionEntry, price: Option<f64>) -> Self {
        Self {
            date: entry.date,
            symbol: entry.symbol.clone(),
            weight: entry.weight,
            market_cap: entry.market_cap,
            rank: entry.rank,
            price,
        }
    }
}

/// Check a single-date snapshot against the composition invariants.
///
/// Returns one message per violated invariant; an empty vector means the
/// snapshot is well formed. Checked: single date, unique symbols, ranks a
/// contiguous permutation of `1..=count`, every weight in `(0, 1]`, weights
/// summing to one.
pub fn snapshot_violations(entries: &[CompositionEntry]) -> Vec<String> {
    let mut problems = Vec::new();
    if entries.is_empty() {
        problems.push("snapshot is empty".to_string());
        return problems;
    }

    let date = entries[0].date;
    if entries.iter().any(|e| e.date != date) {
        problems.push("entries span more than one date".to_string());
    }

    let mut symbols: Vec<&str> = entries.iter().map(|e| e.symbol.as_str()).collect();
    symbols.sort_unstable();
    if symbols.windows(2).any(|w| w[0] == w[1]) {
        problems.push("duplicate symbol".to_string());
    }

    let mut ranks: Vec<u32> = entries.iter().map(|e| e.rank).collect();
    ranks.sort_unstable();
    if ranks.iter().enumerate().any(|(i, r)| *r as usize != i + 1) {
        problems.push(format!("ranks are not contiguous 1..={}", entries.len()));
    }

    if let Some(bad) = entries.iter().find(|e| !(e.weight > 0.0 && e.weight <= 1.0)) {
        problems.push(format!("weight {} for {} outside (0, 1]", bad.weight, bad.symbol));
    }

    let total: f64 = entries.iter().map(|e| e.weight).sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        problems.push(format!("weights sum to {total}"));
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, rank: u32, weight: f64) -> CompositionEntry {
        CompositionEntry {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            symbol: symbol.into(),
            weight,
            market_cap: 100.0 * (10 - rank) as f64,
            rank,
        }
    }

    #[test]
    fn well_formed_snapshot_has_no_violations() {
        let snap = vec![entry("A", 1, 0.5), entry("B", 2, 0.5)];
        assert!(snapshot_violations(&snap).is_empty());
    }

    #[test]
    fn detects_gap_in_ranks() {
        let snap = vec![entry("A", 1, 0.5), entry("B", 3, 0.5)];
        let v = snapshot_violations(&snap);
        assert_eq!(v.len(), 1);
        assert!(v[0].contains("ranks"));
    }

    #[test]
    fn detects_bad_weight_sum() {
        let snap = vec![entry("A", 1, 0.5), entry("B", 2, 0.4)];
        assert!(snapshot_violations(&snap)
            .iter()
            .any(|m| m.contains("sum")));
    }

    #[test]
    fn detects_duplicate_symbols() {
        let snap = vec![entry("A", 1, 0.5), entry("A", 2, 0.5)];
        assert!(snapshot_violations(&snap)
            .iter()
            .any(|m| m.contains("duplicate")));
    }

    #[test]
    fn empty_snapshot_is_a_violation() {
        assert_eq!(snapshot_violations(&[]).len(), 1);
    }
}
