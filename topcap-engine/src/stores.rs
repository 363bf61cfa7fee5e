//! Shared handles to the three storage surfaces.

use std::sync::Arc;

use chrono::NaiveDate;
use topcap_core::domain::CompositionEntry;
use topcap_core::store::{
    CompositionStore, MarketDataReader, MemoryIndexStore, MemoryMarketData, PerformanceStore,
};
use topcap_core::IndexError;

#[derive(Clone)]
pub struct IndexStores {
    pub market: Arc<dyn MarketDataReader>,
    pub compositions: Arc<dyn CompositionStore>,
    pub performance: Arc<dyn PerformanceStore>,
}

impl IndexStores {
    pub fn new(
        market: Arc<dyn MarketDataReader>,
        compositions: Arc<dyn CompositionStore>,
        performance: Arc<dyn PerformanceStore>,
    ) -> Self {
        Self {
            market,
            compositions,
            performance,
        }
    }

    /// Prices in memory, compositions and performance in one memory store.
    pub fn in_memory(market: MemoryMarketData) -> Self {
        let index = Arc::new(MemoryIndexStore::new());
        Self::new(Arc::new(market), index.clone(), index)
    }

    /// Every trading date in `[start, end]` with its stored snapshot.
    ///
    /// Fails with `MissingComposition` naming the first trading date that
    /// was never built.
    pub fn covered_snapshots(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, Vec<CompositionEntry>)>, IndexError> {
        let trading = self.market.trading_dates(start, end)?;
        let mut snapshots = self.compositions.get_composition_range(start, end)?;

        let mut covered = Vec::with_capacity(trading.len());
        for date in trading {
            match snapshots.remove(&date) {
                Some(snapshot) if !snapshot.is_empty() => covered.push((date, snapshot)),
                _ => return Err(IndexError::MissingComposition { date }),
            }
        }
        Ok(covered)
    }
}
