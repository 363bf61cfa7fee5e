//! Property tests for engine invariants.
//!
//! 1. Compounding: every point equals the previous value times one plus its return
//! 2. Diff membership: ADDED/REMOVED are exactly the set differences
//! 3. Build determinism: building twice gives identical snapshots

use std::collections::BTreeSet;

use chrono::NaiveDate;
use proptest::prelude::*;
use topcap_core::domain::{ChangeKind, CompositionEntry, DailyPrice};
use topcap_core::store::{CompositionStore, MemoryMarketData};
use topcap_engine::{diff_snapshots, CacheLayer, IndexConfig, IndexService, IndexStores};

// ── Strategies (proptest) ────────────────────────────────────────────

fn start() -> NaiveDate {
    // a Monday
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Up to 6 symbols x 10 consecutive days of (close, cap) moves.
fn arb_market() -> impl Strategy<Value = Vec<DailyPrice>> {
    prop::collection::vec(
        prop::collection::vec((1.0..200.0_f64, 1.0..1000.0_f64), 10),
        2..6,
    )
    .prop_map(|paths| {
        paths
            .into_iter()
            .enumerate()
            .flat_map(|(i, path)| {
                path.into_iter().enumerate().map(move |(day, (close, cap))| DailyPrice {
                    symbol: format!("S{i}"),
                    date: start() + chrono::Duration::days(day as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 100,
                    market_cap: cap,
                })
            })
            .collect()
    })
}

fn arb_members() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(prop::sample::select(vec!["A", "B", "C", "D", "E", "F", "G"]), 1..7)
        .prop_map(|s| s.into_iter().map(String::from).collect())
}

fn snapshot(date: NaiveDate, members: &BTreeSet<String>) -> Vec<CompositionEntry> {
    let w = 1.0 / members.len() as f64;
    members
        .iter()
        .enumerate()
        .map(|(i, s)| CompositionEntry {
            date,
            symbol: s.clone(),
            weight: w,
            market_cap: 1.0,
            rank: i as u32 + 1,
        })
        .collect()
}

fn service(rows: Vec<DailyPrice>, top_k: usize) -> IndexService {
    let mut config = IndexConfig::default();
    config.index.top_k = top_k;
    let stores = IndexStores::in_memory(MemoryMarketData::from_prices(rows));
    IndexService::new(config, stores, CacheLayer::disabled()).unwrap()
}

// ── 1. Compounding ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn index_level_compounds(rows in arb_market(), k in 1usize..5) {
        let end = start() + chrono::Duration::days(9);
        let svc = service(rows, k);
        svc.build(start(), end).unwrap();
        let perf = svc.get_performance(start(), end).unwrap();

        prop_assert_eq!(perf.len(), 10);
        prop_assert_eq!(perf[0].index_value, 1000.0);
        for pair in perf.windows(2) {
            let expected = pair[0].index_value * (1.0 + pair[1].daily_return);
            prop_assert!((pair[1].index_value - expected).abs() <= 1e-9 * expected.abs().max(1.0));
            prop_assert!(pair[1].index_value > 0.0);
        }
    }

    // ── 3. Determinism ───────────────────────────────────────────────

    #[test]
    fn build_is_deterministic(rows in arb_market(), k in 1usize..5) {
        let end = start() + chrono::Duration::days(9);
        let svc = service(rows, k);
        svc.build(start(), end).unwrap();
        let first = svc.stores().compositions.get_composition_range(start(), end).unwrap();
        let summary = svc.build(start(), end).unwrap();
        let second = svc.stores().compositions.get_composition_range(start(), end).unwrap();
        prop_assert_eq!(first, second);
        prop_assert!(summary.rewritten.is_empty());
    }
}

// ── 2. Diff membership ───────────────────────────────────────────────

proptest! {
    #[test]
    fn diff_matches_set_difference(a in arb_members(), b in arb_members()) {
        let day_a = start();
        let day_b = start() + chrono::Duration::days(1);
        let changes = diff_snapshots(day_b, &snapshot(day_a, &a), &snapshot(day_b, &b));

        let added: BTreeSet<String> = changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .map(|c| c.symbol.clone())
            .collect();
        let removed: BTreeSet<String> = changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Removed)
            .map(|c| c.symbol.clone())
            .collect();

        prop_assert_eq!(added, b.difference(&a).cloned().collect::<BTreeSet<_>>());
        prop_assert_eq!(removed, a.difference(&b).cloned().collect::<BTreeSet<_>>());
        prop_assert!(changes.windows(2).all(|w| w[0].symbol < w[1].symbol));
        prop_assert!(changes.iter().all(|c| c.date == day_b));
    }
}
