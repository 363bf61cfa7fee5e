//! Property tests for selection and weighting invariants.
//!
//! Uses proptest to verify:
//! 1. Ranking order: market cap descending, ties by symbol ascending
//! 2. Selection size: min(K, eligible) and never more
//! 3. Equal weights: each 1/count, summing to one
//! 4. Snapshot well-formedness of selection + weighting combined

use chrono::NaiveDate;
use proptest::prelude::*;
use topcap_core::domain::{snapshot_violations, CompositionEntry, DailyPrice};
use topcap_core::selector::rank_by_market_cap;
use topcap_core::weighting::{EqualWeight, WeightingStrategy};

// ── Strategies (proptest) ────────────────────────────────────────────

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

/// Caps drawn from a small set so ties are common; zeros are ineligible.
fn arb_cap() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        (1u32..20).prop_map(|c| c as f64 * 1.0e9),
    ]
}

fn arb_universe() -> impl Strategy<Value = Vec<DailyPrice>> {
    prop::collection::vec(arb_cap(), 0..60).prop_map(|caps| {
        caps.into_iter()
            .enumerate()
            .map(|(i, cap)| DailyPrice {
                symbol: format!("S{i:03}"),
                date: date(),
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume: 1_000,
                market_cap: cap,
            })
            .collect()
    })
}

// ── 1 + 2. Ranking ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn ranking_is_sorted_and_sized(rows in arb_universe(), k in 1usize..40) {
        let ranked = rank_by_market_cap(&rows, k);
        let eligible = rows.iter().filter(|r| r.is_eligible()).count();

        prop_assert_eq!(ranked.len(), k.min(eligible));
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].market_cap >= pair[1].market_cap);
            if pair[0].market_cap == pair[1].market_cap {
                prop_assert!(pair[0].symbol < pair[1].symbol);
            }
        }
        prop_assert!(ranked.iter().all(|c| c.market_cap > 0.0));
    }

    /// Nothing left out ranks above the smallest selected cap.
    #[test]
    fn excluded_symbols_never_outrank_selected(rows in arb_universe(), k in 1usize..40) {
        let ranked = rank_by_market_cap(&rows, k);
        if let Some(last) = ranked.last() {
            for r in rows.iter().filter(|r| r.is_eligible()) {
                if ranked.iter().any(|c| c.symbol == r.symbol) {
                    continue;
                }
                prop_assert!(
                    r.market_cap < last.market_cap
                        || (r.market_cap == last.market_cap && r.symbol > last.symbol)
                );
            }
        }
    }
}

// ── 3 + 4. Weighting ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn equal_weights_sum_to_one(rows in arb_universe(), k in 1usize..40) {
        let ranked = rank_by_market_cap(&rows, k);
        let weights = EqualWeight.assign_weights(&ranked);

        prop_assert_eq!(weights.len(), ranked.len());
        if !ranked.is_empty() {
            let total: f64 = weights.values().sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
            let expected = 1.0 / ranked.len() as f64;
            prop_assert!(weights.values().all(|w| *w == expected));
        }
    }

    #[test]
    fn selection_plus_weights_form_valid_snapshot(rows in arb_universe(), k in 1usize..40) {
        let ranked = rank_by_market_cap(&rows, k);
        prop_assume!(!ranked.is_empty());
        let weights = EqualWeight.assign_weights(&ranked);

        let snapshot: Vec<CompositionEntry> = ranked
            .iter()
            .enumerate()
            .map(|(i, c)| CompositionEntry {
                date: date(),
                symbol: c.symbol.clone(),
                weight: weights[&c.symbol],
                market_cap: c.market_cap,
                rank: i as u32 + 1,
            })
            .collect();
        prop_assert!(snapshot_violations(&snapshot).is_empty());
    }
}
