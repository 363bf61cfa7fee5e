//! Synthetic price universe for offline development and tests.
//!
//! Produces a deterministic random walk per symbol, seeded from the BLAKE3
//! hash of the symbol and a caller seed, with a market cap of
//! `close * shares_outstanding`. Weekends are skipped. The output is clearly
//! fake and only meant to exercise the engine without an ingestion job.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::DailyPrice;

/// Ticker-like names: `SYN000`, `SYN001`, ...
pub fn synthetic_symbols(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("SYN{i:03}")).collect()
}

fn rng_for(symbol: &str, seed: u64) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(&seed.to_le_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

/// One symbol's weekday rows in `[start, end]`.
pub fn generate_symbol(symbol: &str, start: NaiveDate, end: NaiveDate, seed: u64) -> Vec<DailyPrice> {
    let mut rng = rng_for(symbol, seed);

    let mut price: f64 = rng.gen_range(20.0..500.0);
    // 10^8 .. 10^10 shares spreads caps across the ranking.
    let shares: f64 = 10f64.powf(rng.gen_range(8.0..10.0));

    let mut rows = Vec::new();
    let mut current = start;
    while current <= end {
        let weekday = current.weekday();
        if weekday == Weekday::Sat || weekday == Weekday::Sun {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);

        rows.push(DailyPrice {
            symbol: symbol.to_string(),
            date: current,
            open,
            high,
            low,
            close,
            volume,
            market_cap: close * shares,
        });

        price = close;
        current += chrono::Duration::days(1);
    }
    rows
}

/// Rows for `count` synthetic symbols, grouped by symbol.
pub fn generate_universe(
    count: usize,
    start: NaiveDate,
    end: NaiveDate,
    seed: u64,
) -> Vec<(String, Vec<DailyPrice>)> {
    synthetic_symbols(count)
        .into_iter()
        .map(|symbol| {
            let rows = generate_symbol(&symbol, start, end, seed);
            (symbol, rows)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn deterministic_for_same_seed() {
        let a = generate_symbol("SYN001", d("2024-01-01"), d("2024-01-31"), 7);
        let b = generate_symbol("SYN001", d("2024-01-01"), d("2024-01-31"), 7);
        assert_eq!(a, b);
        let c = generate_symbol("SYN001", d("2024-01-01"), d("2024-01-31"), 8);
        assert_ne!(a, c);
    }

    #[test]
    fn skips_weekends() {
        // 2024-01-13/14 is a weekend
        let rows = generate_symbol("SYN000", d("2024-01-12"), d("2024-01-15"), 1);
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d("2024-01-12"), d("2024-01-15")]);
    }

    #[test]
    fn rows_are_eligible() {
        for (_, rows) in generate_universe(5, d("2024-01-01"), d("2024-03-01"), 42) {
            for r in rows {
                assert!(r.is_eligible());
                assert!(r.usable_close().is_some());
                assert!(r.low <= r.open.min(r.close) && r.high >= r.open.max(r.close));
            }
        }
    }
}
