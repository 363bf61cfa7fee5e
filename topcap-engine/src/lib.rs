//! topcap engine: index construction, performance, change detection,
//! caching and export.
//!
//! This crate builds on `topcap-core` to provide:
//! - `IndexBuilder`: daily top-K compositions over a date range
//! - `PerformanceCalculator`: daily returns compounded into an index level
//! - `ChangeDetector`: diffs between composition snapshots
//! - `CacheLayer`: read-through TTL cache with per-key in-flight dedup
//! - `IndexService`: the explicit handle outer shells call
//! - TOML config and the CSV export bundle

pub mod builder;
pub mod cache;
pub mod changes;
pub mod config;
pub mod export;
pub mod performance;
pub mod service;
pub mod stores;

pub use builder::{BuildSummary, DayOutcome, IndexBuilder, PerformanceTail};
pub use cache::{CacheClient, CacheKey, CacheLayer, CacheStatus, FileCache, ManualClock, MemoryCache, SystemClock};
pub use changes::{diff_snapshots, summarize, ChangeDetector};
pub use config::{CacheBackend, ConfigError, IndexConfig};
pub use export::{export_bundle, ExportManifest, SCHEMA_VERSION};
pub use performance::{portfolio_return, PerformanceCalculator};
pub use service::{IndexService, ServiceError};
pub use stores::IndexStores;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn service_is_send_sync() {
        assert_send::<IndexService>();
        assert_sync::<IndexService>();
    }

    #[test]
    fn engine_components_are_send_sync() {
        assert_send::<IndexBuilder>();
        assert_sync::<IndexBuilder>();
        assert_send::<PerformanceCalculator>();
        assert_sync::<PerformanceCalculator>();
        assert_send::<ChangeDetector>();
        assert_sync::<ChangeDetector>();
        assert_send::<IndexStores>();
        assert_sync::<IndexStores>();
    }

    #[test]
    fn cache_types_are_send_sync() {
        assert_send::<CacheLayer>();
        assert_sync::<CacheLayer>();
        assert_send::<MemoryCache>();
        assert_sync::<MemoryCache>();
        assert_send::<FileCache>();
        assert_sync::<FileCache>();
    }

    #[test]
    fn results_are_send_sync() {
        assert_send::<BuildSummary>();
        assert_sync::<BuildSummary>();
        assert_send::<IndexConfig>();
        assert_sync::<IndexConfig>();
    }
}
