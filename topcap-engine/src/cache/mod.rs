//! Read-through cache for engine results.
//!
//! `CacheLayer::get_or_compute` returns a live cached value when one exists
//! and otherwise runs the computation and stores its JSON with a TTL. The
//! check-then-populate sequence for a single key holds a per-key lock, so at
//! most one computation per key is in flight. Different keys never block
//! each other.
//!
//! The cache is an optimization only. Transport errors are logged, counted
//! and fed to a circuit breaker, and the computation proceeds uncached.

pub mod breaker;
pub mod client;
pub mod clock;
pub mod file;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use topcap_core::IndexError;

use crate::config::{CacheBackend, CacheSection};

pub use breaker::{BreakerState, CacheBreaker};
pub use client::{CacheClient, CacheEntry, MemoryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use file::FileCache;

/// Deterministic cache key: an operation name plus every parameter that
/// affects the result, rendered in parameter-name order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: &'static str,
    params: BTreeMap<&'static str, String>,
}

impl CacheKey {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.params.insert(name, value.to_string());
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        let mut sep = '?';
        for (name, value) in &self.params {
            write!(f, "{sep}{name}={value}")?;
            sep = '&';
        }
        Ok(())
    }
}

/// Snapshot of cache counters for status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub enabled: bool,
    pub backend: Option<String>,
    /// `None` when the transport could not be asked.
    pub entries: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub transport_errors: u64,
    pub breaker_open: bool,
}

pub struct CacheLayer {
    client: Option<Arc<dyn CacheClient>>,
    default_ttl: Duration,
    breaker: CacheBreaker,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl CacheLayer {
    pub fn new(client: Arc<dyn CacheClient>, default_ttl: Duration, breaker: CacheBreaker) -> Self {
        Self {
            client: Some(client),
            default_ttl,
            breaker,
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// A layer that always computes.
    pub fn disabled() -> Self {
        Self {
            client: None,
            default_ttl: Duration::ZERO,
            breaker: CacheBreaker::new(1, Duration::ZERO, Arc::new(SystemClock)),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Build the layer a `[cache]` section describes. A file backend whose
    /// directory cannot be created leaves the cache disabled.
    pub fn from_config(section: &CacheSection, clock: Arc<dyn Clock>) -> Self {
        if !section.enabled {
            return Self::disabled();
        }
        let client: Arc<dyn CacheClient> = match section.backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new(clock.clone())),
            CacheBackend::File => match FileCache::new(&section.dir, clock.clone()) {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    tracing::warn!(dir = %section.dir.display(), error = %e, "file cache unavailable, caching disabled");
                    return Self::disabled();
                }
            },
        };
        let breaker = CacheBreaker::new(section.failure_threshold, section.cooldown(), clock);
        Self::new(client, section.ttl(), breaker)
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Errors from `compute` are returned unchanged and nothing is cached.
    pub fn get_or_compute<T, E, F>(&self, key: &CacheKey, ttl: Duration, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        if self.client.is_none() {
            return compute();
        }

        let key = key.to_string();
        let key_lock = self.key_lock(&key);
        let result = {
            let _guard = key_lock.lock();
            self.lookup_or_compute(&key, ttl, compute)
        };
        self.release_key_lock(&key, key_lock);
        result
    }

    fn lookup_or_compute<T, E, F>(&self, key: &str, ttl: Duration, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(json) = self.transport("get", |c| c.get(key)).flatten() {
            match serde_json::from_str::<T>(&json) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                    self.transport("delete", |c| c.delete(key));
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, "cache miss");
        let value = compute()?;

        match serde_json::to_string(&value) {
            Ok(json) => {
                self.transport("set", |c| c.set(key, &json, ttl));
            }
            Err(e) => tracing::warn!(key, error = %e, "result not cacheable"),
        }
        Ok(value)
    }

    /// Drop every entry; `None` when the cache is disabled or unreachable.
    pub fn clear(&self) -> Option<usize> {
        self.transport("clear", |c| c.clear())
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            enabled: self.is_enabled(),
            backend: self.client.as_ref().map(|c| c.name().to_string()),
            entries: self.transport("len", |c| c.len()),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            transport_errors: self.errors.load(Ordering::Relaxed),
            breaker_open: matches!(self.breaker.state(), BreakerState::Open { .. }),
        }
    }

    /// Run one transport call through the breaker. Failures are logged,
    /// counted and reported as `None`.
    fn transport<R>(
        &self,
        op: &'static str,
        call: impl FnOnce(&dyn CacheClient) -> Result<R, IndexError>,
    ) -> Option<R> {
        let client = self.client.as_ref()?;
        if !self.breaker.is_allowed() {
            return None;
        }
        match call(client.as_ref()) {
            Ok(r) => {
                self.breaker.record_success();
                Some(r)
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.breaker.record_failure();
                tracing::warn!(op, backend = client.name(), error = %e, "cache degraded, continuing uncached");
                None
            }
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_key_lock(&self, key: &str, key_lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        // map + this handle: nobody else is waiting on the key
        if Arc::strong_count(&key_lock) == 2 {
            in_flight.remove(key);
        }
    }
}
