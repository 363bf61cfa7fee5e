//! `IndexService`: the handle outer shells call.
//!
//! Owns the stores, the weighting strategy, the config and the cache layer.
//! Read operations go through the cache; on a miss they recompute from the
//! persisted compositions and prices. Cache keys carry every parameter that
//! changes a result (range or date, top K, strategy, base value). A build
//! that persists any snapshot clears the cache, since range results
//! (performance, changes) may span the dates it wrote.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use topcap_core::dates::validate_range;
use topcap_core::domain::{CompositionChange, CompositionView, DailyChangeSummary, PerformanceEntry};
use topcap_core::store::{FileIndexStore, ParquetPriceStore};
use topcap_core::weighting::{create_strategy, WeightingStrategy};
use topcap_core::IndexError;

use crate::builder::{BuildSummary, IndexBuilder};
use crate::cache::{CacheKey, CacheLayer, CacheStatus, SystemClock};
use crate::changes::{summarize, ChangeDetector};
use crate::config::{ConfigError, IndexConfig};
use crate::export;
use crate::performance::PerformanceCalculator;
use crate::stores::IndexStores;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

pub struct IndexService {
    config: IndexConfig,
    stores: IndexStores,
    builder: IndexBuilder,
    calculator: Arc<PerformanceCalculator>,
    detector: ChangeDetector,
    cache: CacheLayer,
}

impl IndexService {
    pub fn new(config: IndexConfig, stores: IndexStores, cache: CacheLayer) -> Result<Self, ServiceError> {
        config.validate()?;
        let strategy: Arc<dyn WeightingStrategy> = Arc::from(
            create_strategy(&config.index.strategy).map_err(|e| ConfigError::Invalid(e.to_string()))?,
        );
        let calculator = Arc::new(PerformanceCalculator::new(
            stores.clone(),
            config.index.base_value,
            config.engine.parallel,
        ));
        let builder = IndexBuilder::new(
            stores.clone(),
            config.index.top_k,
            strategy,
            calculator.clone(),
            config.engine.parallel,
        );
        let detector = ChangeDetector::new(stores.clone());
        Ok(Self {
            config,
            stores,
            builder,
            calculator,
            detector,
            cache,
        })
    }

    /// Open the on-disk deployment a config describes: the Parquet price
    /// archive, the file index store and the configured cache backend.
    pub fn open(config: IndexConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let market = ParquetPriceStore::new(&config.storage.prices_dir).load()?;
        let index = Arc::new(FileIndexStore::open(&config.storage.index_dir)?);
        let stores = IndexStores::new(Arc::new(market), index.clone(), index);
        let cache = CacheLayer::from_config(&config.cache, Arc::new(SystemClock));
        Self::new(config, stores, cache)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn stores(&self) -> &IndexStores {
        &self.stores
    }

    fn key(&self, operation: &'static str) -> CacheKey {
        CacheKey::new(operation)
            .param("top_k", self.config.index.top_k)
            .param("strategy", self.builder.strategy_name())
            .param("base_value", self.config.index.base_value)
    }

    /// Build compositions for `[start, end]`, extending performance when
    /// the config says so. Cached by range: a repeat within the TTL returns
    /// the earlier summary without rebuilding. Writing any snapshot drops
    /// every cached read before the summary itself is cached.
    pub fn build(&self, start: NaiveDate, end: NaiveDate) -> Result<BuildSummary, IndexError> {
        validate_range(start, end)?;
        let extend = self.config.engine.extend_performance;
        let key = self
            .key("build")
            .param("start", start)
            .param("end", end)
            .param("extend_performance", extend);

        self.cache.get_or_compute(&key, self.cache.default_ttl(), || {
            let summary = self.builder.build(start, end, extend)?;
            if summary.written > 0 {
                let dropped = self.cache.clear();
                tracing::debug!(written = summary.written, ?dropped, "cleared cached reads after build");
            }
            Ok(summary)
        })
    }

    pub fn get_performance(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PerformanceEntry>, IndexError> {
        validate_range(start, end)?;
        let key = self.key("performance").param("start", start).param("end", end);
        self.cache
            .get_or_compute(&key, self.cache.default_ttl(), || self.calculator.compute(start, end))
    }

    fn composition_key(&self, date: NaiveDate) -> CacheKey {
        self.key("composition").param("date", date)
    }

    /// The snapshot for `date` joined with each constituent's close.
    pub fn get_composition(&self, date: NaiveDate) -> Result<Vec<CompositionView>, IndexError> {
        self.cache
            .get_or_compute(&self.composition_key(date), self.cache.default_ttl(), || {
                let snapshot = self.stores.compositions.get_composition(date)?;
                if snapshot.is_empty() {
                    return Err(IndexError::MissingComposition { date });
                }
                let symbols: Vec<&str> = snapshot.iter().map(|e| e.symbol.as_str()).collect();
                let closes = self.stores.market.closes_for(&symbols, date)?;
                Ok(snapshot
                    .iter()
                    .map(|e| CompositionView::new(e, closes.get(&e.symbol).copied()))
                    .collect())
            })
    }

    pub fn get_changes(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CompositionChange>, IndexError> {
        validate_range(start, end)?;
        let key = self.key("changes").param("start", start).param("end", end);
        self.cache
            .get_or_compute(&key, self.cache.default_ttl(), || self.detector.changes(start, end))
    }

    pub fn get_change_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyChangeSummary>, IndexError> {
        Ok(summarize(&self.get_changes(start, end)?))
    }

    /// Uncached diff of two specific dates.
    pub fn diff(&self, date_a: NaiveDate, date_b: NaiveDate) -> Result<Vec<CompositionChange>, IndexError> {
        self.detector.diff(date_a, date_b)
    }

    /// Write the CSV bundle for `[start, end]` under `out_dir`, returning
    /// the bundle directory.
    pub fn export(&self, start: NaiveDate, end: NaiveDate, out_dir: &Path) -> anyhow::Result<PathBuf> {
        export::export_bundle(self, start, end, out_dir)
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.cache.status()
    }

    pub fn clear_cache(&self) -> Option<usize> {
        self.cache.clear()
    }
}
