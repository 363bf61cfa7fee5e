//! Cache transports.
//!
//! A `CacheClient` stores serialized values under string keys with a TTL.
//! Expired entries are evicted lazily when read. Transport failures are
//! reported as `IndexError::CacheUnavailable`; deciding what to do about
//! them is the cache layer's job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use topcap_core::IndexError;

use super::clock::{to_chrono, Clock};

/// One stored value and the instant it stops being served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: &str, value: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: now
                .checked_add_signed(to_chrono(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub trait CacheClient: Send + Sync {
    /// Short backend name for logs and status output.
    fn name(&self) -> &'static str;

    /// The live value for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, IndexError>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), IndexError>;

    fn delete(&self, key: &str) -> Result<(), IndexError>;

    /// Remove every entry, returning how many were dropped.
    fn clear(&self) -> Result<usize, IndexError>;

    /// Stored entries, expired ones not yet evicted included.
    fn len(&self) -> Result<usize, IndexError>;
}

/// Process-local cache.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

impl CacheClient for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>, IndexError> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        self.entries.write().remove(key);
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), IndexError> {
        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), IndexError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<usize, IndexError> {
        let mut entries = self.entries.write();
        let n = entries.len();
        entries.clear();
        Ok(n)
    }

    fn len(&self) -> Result<usize, IndexError> {
        Ok(self.entries.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;

    #[test]
    fn entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = MemoryCache::new(clock.clone());
        cache.set("k", "\"v\"", Duration::from_secs(10)).unwrap();

        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("\"v\""));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k").unwrap(), None);
        // lazily evicted on that read
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn delete_and_clear() {
        let cache = MemoryCache::new(Arc::new(ManualClock::at_epoch()));
        cache.set("a", "1", Duration::from_secs(60)).unwrap();
        cache.set("b", "2", Duration::from_secs(60)).unwrap();
        cache.delete("a").unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn set_overwrites_and_refreshes_expiry() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = MemoryCache::new(clock.clone());
        cache.set("k", "1", Duration::from_secs(10)).unwrap();
        clock.advance(Duration::from_secs(8));
        cache.set("k", "2", Duration::from_secs(10)).unwrap();
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("2"));
    }
}
