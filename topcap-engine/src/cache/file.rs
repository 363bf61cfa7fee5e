//! File-backed cache: one JSON `CacheEntry` per key.
//!
//! Files are named by the BLAKE3 hash of the key, so arbitrary keys map to
//! safe file names. Writes go through a temp file private to the writer and
//! a rename. The stored key is compared on read to rule out a mismatched file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use topcap_core::store::write_atomic;
use topcap_core::IndexError;

use super::client::{CacheClient, CacheEntry};
use super::clock::Clock;

pub struct FileCache {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

fn unavailable(what: &str, path: &Path, e: impl std::fmt::Display) -> IndexError {
    IndexError::CacheUnavailable(format!("{what} {}: {e}", path.display()))
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, IndexError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| unavailable("create", &dir, e))?;
        Ok(Self { dir, clock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", blake3::hash(key.as_bytes()).to_hex()))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, IndexError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| unavailable("list", &self.dir, e))?;
        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect())
    }
}

impl CacheClient for FileCache {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> Result<Option<String>, IndexError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|e| unavailable("read", &path, e))?;
        let entry: CacheEntry = match serde_json::from_str(&json) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "dropping unreadable cache entry");
                let _ = fs::remove_file(&path);
                return Ok(None);
            }
        };
        if entry.key != key || !entry.is_live(self.clock.now()) {
            let _ = fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), IndexError> {
        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        let json = serde_json::to_vec(&entry)
            .map_err(|e| IndexError::CacheUnavailable(format!("serialize entry: {e}")))?;

        let path = self.entry_path(key);
        write_atomic(&path, &json).map_err(|e| unavailable("write", &path, e))
    }

    fn delete(&self, key: &str) -> Result<(), IndexError> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| unavailable("remove", &path, e))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<usize, IndexError> {
        let files = self.entry_files()?;
        for path in &files {
            fs::remove_file(path).map_err(|e| unavailable("remove", path, e))?;
        }
        Ok(files.len())
    }

    fn len(&self) -> Result<usize, IndexError> {
        Ok(self.entry_files()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;

    fn cache() -> (tempfile::TempDir, FileCache, Arc<ManualClock>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = FileCache::new(dir.path(), clock.clone()).unwrap();
        (dir, cache, clock)
    }

    #[test]
    fn put_get_and_expire() {
        let (_dir, cache, clock) = cache();
        cache.set("performance|2024-01-01|2024-01-31", "[1,2]", Duration::from_secs(5)).unwrap();
        assert_eq!(
            cache.get("performance|2024-01-01|2024-01-31").unwrap().as_deref(),
            Some("[1,2]")
        );
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("performance|2024-01-01|2024-01-31").unwrap(), None);
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn survives_reopen() {
        let (dir, cache, clock) = cache();
        cache.set("k", "42", Duration::from_secs(60)).unwrap();
        drop(cache);
        let reopened = FileCache::new(dir.path(), clock).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn corrupt_entry_reads_as_miss() {
        let (_dir, cache, _) = cache();
        fs::write(cache.entry_path("k"), "{not json").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        assert!(!cache.entry_path("k").exists());
    }

    #[test]
    fn concurrent_sets_of_one_key_stay_whole() {
        let (dir, cache, _) = cache();
        let long = "x".repeat(200_000);
        std::thread::scope(|scope| {
            for t in 0..4 {
                let (cache, long) = (&cache, &long);
                scope.spawn(move || {
                    for i in 0..50 {
                        let value = if (i + t) % 2 == 0 { long.as_str() } else { "short" };
                        cache.set("k", value, Duration::from_secs(60)).unwrap();
                    }
                });
            }
            for _ in 0..200 {
                if let Some(v) = cache.get("k").unwrap() {
                    assert!(v == "short" || v.len() == 200_000);
                }
            }
        });
        let stray_temps = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(stray_temps, 0);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn clear_counts_entries() {
        let (_dir, cache, _) = cache();
        for i in 0..4 {
            cache.set(&format!("k{i}"), "1", Duration::from_secs(60)).unwrap();
        }
        assert_eq!(cache.len().unwrap(), 4);
        assert_eq!(cache.clear().unwrap(), 4);
        assert_eq!(cache.len().unwrap(), 0);
    }
}
