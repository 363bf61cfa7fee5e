//! Top-K constituent selection by market capitalization.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::{Constituent, DailyPrice, Selection};
use crate::error::IndexError;
use crate::store::MarketDataReader;

/// Default index size.
pub const DEFAULT_TOP_K: usize = 100;

/// Ranks one date's symbols by market cap and keeps the largest K.
pub struct ConstituentSelector {
    market: Arc<dyn MarketDataReader>,
    top_k: usize,
}

impl ConstituentSelector {
    pub fn new(market: Arc<dyn MarketDataReader>, top_k: usize) -> Self {
        Self { market, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Select the top K symbols on `date`.
    ///
    /// Fails with `NoData` when no row on `date` has a positive market cap.
    /// Fewer than K eligible symbols is not an error: all of them are taken
    /// and the selection is flagged `degraded`.
    pub fn select(&self, date: NaiveDate) -> Result<Selection, IndexError> {
        let rows = self.market.prices_on(date)?;
        let constituents = rank_by_market_cap(&rows, self.top_k);
        if constituents.is_empty() {
            return Err(IndexError::NoData { date });
        }

        let degraded = constituents.len() < self.top_k;
        if degraded {
            tracing::warn!(
                %date,
                eligible = constituents.len(),
                top_k = self.top_k,
                "degraded selection: fewer eligible symbols than index size"
            );
        }

        Ok(Selection {
            date,
            constituents,
            degraded,
        })
    }
}

/// Eligible rows sorted by market cap descending, ties by symbol ascending,
/// truncated to `k`.
pub fn rank_by_market_cap(rows: &[DailyPrice], k: usize) -> Vec<Constituent> {
    let mut eligible: Vec<&DailyPrice> = rows.iter().filter(|r| r.is_eligible()).collect();
    eligible.sort_by(|a, b| {
        b.market_cap
            .partial_cmp(&a.market_cap)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    eligible
        .into_iter()
        .take(k)
        .map(|r| Constituent {
            symbol: r.symbol.clone(),
            market_cap: r.market_cap,
        })
        .collect()
}
