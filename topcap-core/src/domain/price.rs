//! DailyPrice: one ingested row per (symbol, date).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar plus market capitalization for a single symbol.
///
/// Produced by the ingestion job and read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrice {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub market_cap: f64,
}

impl DailyPrice {
    /// A row can be ranked only with a finite, positive market cap.
    pub fn is_eligible(&self) -> bool {
        self.market_cap.is_finite() && self.market_cap > 0.0
    }

    /// A close usable as the denominator of a return.
    pub fn usable_close(&self) -> Option<f64> {
        (self.close.is_finite() && self.close > 0.0).then_some(self.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DailyPrice {
        DailyPrice {
            symbol: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            open: 182.0,
            high: 185.0,
            low: 181.0,
            close: 184.0,
            volume: 50_000_000,
            market_cap: 2.85e12,
        }
    }

    #[test]
    fn eligibility_requires_positive_cap() {
        let mut p = sample();
        assert!(p.is_eligible());
        p.market_cap = 0.0;
        assert!(!p.is_eligible());
        p.market_cap = f64::NAN;
        assert!(!p.is_eligible());
    }

    #[test]
    fn zero_close_is_not_usable() {
        let mut p = sample();
        assert_eq!(p.usable_close(), Some(184.0));
        p.close = 0.0;
        assert_eq!(p.usable_close(), None);
    }
}
