//! Composition change detection: diffs between stored snapshots.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use topcap_core::dates::validate_range;
use topcap_core::domain::{ChangeKind, CompositionChange, CompositionEntry, DailyChangeSummary};
use topcap_core::IndexError;

use crate::stores::IndexStores;

/// Weights closer than this are treated as unchanged.
const WEIGHT_EPSILON: f64 = 1e-12;

pub struct ChangeDetector {
    stores: IndexStores,
}

impl ChangeDetector {
    pub fn new(stores: IndexStores) -> Self {
        Self { stores }
    }

    /// Changes from the snapshot on `date_a` to the one on `date_b`.
    ///
    /// `date_a` must be strictly earlier than `date_b`. Both snapshots must
    /// exist.
    pub fn diff(&self, date_a: NaiveDate, date_b: NaiveDate) -> Result<Vec<CompositionChange>, IndexError> {
        if date_a >= date_b {
            return Err(IndexError::InvalidRange {
                start: date_a,
                end: date_b,
            });
        }
        let a = self.stores.compositions.get_composition(date_a)?;
        if a.is_empty() {
            return Err(IndexError::MissingComposition { date: date_a });
        }
        let b = self.stores.compositions.get_composition(date_b)?;
        if b.is_empty() {
            return Err(IndexError::MissingComposition { date: date_b });
        }
        Ok(diff_snapshots(date_b, &a, &b))
    }

    /// Changes between consecutive stored snapshots in `[start, end]`, in
    /// date order. Every trading date in the range must have been built.
    pub fn changes(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CompositionChange>, IndexError> {
        validate_range(start, end)?;
        self.stores.covered_snapshots(start, end)?;

        let snapshots = self.stores.compositions.get_composition_range(start, end)?;
        let ordered: Vec<(&NaiveDate, &Vec<CompositionEntry>)> = snapshots.iter().collect();
        Ok(ordered
            .windows(2)
            .flat_map(|pair| diff_snapshots(*pair[1].0, pair[0].1, pair[1].1))
            .collect())
    }
}

/// Diff two snapshots, labelling every change with `date`. Ordered by symbol.
pub fn diff_snapshots(
    date: NaiveDate,
    before: &[CompositionEntry],
    after: &[CompositionEntry],
) -> Vec<CompositionChange> {
    let mut merged: BTreeMap<&str, (Option<&CompositionEntry>, Option<&CompositionEntry>)> = BTreeMap::new();
    for e in before {
        merged.entry(e.symbol.as_str()).or_default().0 = Some(e);
    }
    for e in after {
        merged.entry(e.symbol.as_str()).or_default().1 = Some(e);
    }

    merged
        .into_iter()
        .filter_map(|(symbol, pair)| {
            let kind = match pair {
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Removed,
                (Some(old), Some(new))
                    if old.rank != new.rank || (old.weight - new.weight).abs() > WEIGHT_EPSILON =>
                {
                    ChangeKind::RankChanged
                }
                _ => return None,
            };
            let (old, new) = pair;
            Some(CompositionChange {
                date,
                symbol: symbol.to_string(),
                kind,
                old_rank: old.map(|e| e.rank),
                new_rank: new.map(|e| e.rank),
                old_weight: old.map(|e| e.weight),
                new_weight: new.map(|e| e.weight),
            })
        })
        .collect()
}

/// Group a date-ordered change list into per-date summaries.
pub fn summarize(changes: &[CompositionChange]) -> Vec<DailyChangeSummary> {
    let mut by_date: BTreeMap<NaiveDate, DailyChangeSummary> = BTreeMap::new();
    for c in changes {
        let summary = by_date.entry(c.date).or_insert_with(|| DailyChangeSummary {
            date: c.date,
            entered: Vec::new(),
            exited: Vec::new(),
            rank_changes: 0,
            total_changes: 0,
        });
        match c.kind {
            ChangeKind::Added => summary.entered.push(c.symbol.clone()),
            ChangeKind::Removed => summary.exited.push(c.symbol.clone()),
            ChangeKind::RankChanged => summary.rank_changes += 1,
        }
    }
    by_date
        .into_values()
        .map(|mut s| {
            s.total_changes = s.entered.len() + s.exited.len();
            s
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn snapshot(date: &str, symbols: &[&str]) -> Vec<CompositionEntry> {
        let w = 1.0 / symbols.len() as f64;
        symbols
            .iter()
            .enumerate()
            .map(|(i, s)| CompositionEntry {
                date: d(date),
                symbol: s.to_string(),
                weight: w,
                market_cap: 100.0 - i as f64,
                rank: i as u32 + 1,
            })
            .collect()
    }

    #[test]
    fn swap_at_the_bottom_is_one_add_one_remove() {
        let a = snapshot("2024-01-15", &["AAA", "BBB", "XYZ"]);
        let b = snapshot("2024-01-16", &["AAA", "BBB", "ABC"]);
        let changes = diff_snapshots(d("2024-01-16"), &a, &b);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].symbol, "ABC");
        assert_eq!(changes[0].kind, ChangeKind::Added);
        assert_eq!(changes[0].old_rank, None);
        assert_eq!(changes[0].new_rank, Some(3));
        assert_eq!(changes[1].symbol, "XYZ");
        assert_eq!(changes[1].kind, ChangeKind::Removed);
        assert_eq!(changes[1].new_weight, None);
    }

    #[test]
    fn rank_swap_is_reported_for_both() {
        let a = snapshot("2024-01-15", &["A", "B"]);
        let b = snapshot("2024-01-16", &["B", "A"]);
        let changes = diff_snapshots(d("2024-01-16"), &a, &b);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::RankChanged));
    }

    #[test]
    fn weight_change_alone_counts() {
        let a = snapshot("2024-01-15", &["A", "B"]);
        let b = snapshot("2024-01-16", &["A", "B", "C"]);
        let changes = diff_snapshots(d("2024-01-16"), &a, &b);
        let kinds: Vec<ChangeKind> = changes.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::RankChanged, ChangeKind::RankChanged, ChangeKind::Added]
        );
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let a = snapshot("2024-01-15", &["A", "B"]);
        assert!(diff_snapshots(d("2024-01-16"), &a, &a).is_empty());
    }

    #[test]
    fn summary_groups_by_date() {
        let mut changes = diff_snapshots(
            d("2024-01-16"),
            &snapshot("2024-01-15", &["A", "B", "XYZ"]),
            &snapshot("2024-01-16", &["A", "B", "ABC"]),
        );
        changes.extend(diff_snapshots(
            d("2024-01-17"),
            &snapshot("2024-01-16", &["A", "B", "ABC"]),
            &snapshot("2024-01-17", &["B", "A", "ABC"]),
        ));

        let summary = summarize(&changes);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].entered, vec!["ABC"]);
        assert_eq!(summary[0].exited, vec!["XYZ"]);
        assert_eq!(summary[0].total_changes, 2);
        assert_eq!(summary[1].rank_changes, 2);
        assert_eq!(summary[1].total_changes, 0);
    }
}
