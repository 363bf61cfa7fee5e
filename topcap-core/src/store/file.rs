//! File-backed composition and performance store.
//!
//! Layout:
//! - `{dir}/compositions/{YYYY-MM-DD}.json`: one snapshot per date
//! - `{dir}/performance/{YYYY-MM-DD}.json`: one performance entry per date
//!
//! Every write goes to a uniquely named temp file in the same directory and
//! is renamed into place, so a reader sees either the previous file or the
//! complete new one, even while other writers target the same date.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{CompositionStore, PerformanceStore};
use crate::dates::DATE_FORMAT;
use crate::domain::{CompositionEntry, PerformanceEntry};
use crate::error::IndexError;

const COMPOSITIONS: &str = "compositions";
const PERFORMANCE: &str = "performance";

pub struct FileIndexStore {
    dir: PathBuf,
}

impl FileIndexStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(COMPOSITIONS))
            .map_err(|e| IndexError::Storage(format!("create {}: {e}", dir.display())))?;
        fs::create_dir_all(dir.join(PERFORMANCE))
            .map_err(|e| IndexError::Storage(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: &str, date: NaiveDate) -> PathBuf {
        self.dir.join(kind).join(format!("{}.json", date.format(DATE_FORMAT)))
    }

    /// Dates with a file under `kind`, ascending. Temp and foreign files are ignored.
    fn dates(&self, kind: &str) -> Result<Vec<NaiveDate>, IndexError> {
        let mut dates = Vec::new();
        for entry in fs::read_dir(self.dir.join(kind))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, DATE_FORMAT) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    fn read<T: DeserializeOwned>(&self, kind: &str, date: NaiveDate) -> Result<Option<T>, IndexError> {
        let path = self.path(kind, date);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .map_err(|e| IndexError::Storage(format!("read {}: {e}", path.display())))?;
        let value = serde_json::from_str(&json)
            .map_err(|e| IndexError::Storage(format!("parse {}: {e}", path.display())))?;
        Ok(Some(value))
    }

    fn write<T: Serialize + ?Sized>(&self, kind: &str, date: NaiveDate, value: &T) -> Result<(), IndexError> {
        let path = self.path(kind, date);
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &json)
    }
}

/// Replace `path` with whatever `fill` writes, via a temp file private to
/// this call. The temp file is removed if `fill` or the rename fails.
pub fn replace_atomic<F>(path: &Path, fill: F) -> Result<(), IndexError>
where
    F: FnOnce(&mut fs::File) -> Result<(), IndexError>,
{
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| IndexError::Storage(format!("create temp file in {}: {e}", dir.display())))?;
    fill(tmp.as_file_mut())?;
    tmp.persist(path)
        .map_err(|e| IndexError::Storage(format!("atomic rename to {} failed: {}", path.display(), e.error)))?;
    Ok(())
}

/// Write `bytes` to `path` atomically.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    replace_atomic(path, |file| {
        file.write_all(bytes)
            .map_err(|e| IndexError::Storage(format!("write {}: {e}", path.display())))
    })
}

impl CompositionStore for FileIndexStore {
    fn get_composition(&self, date: NaiveDate) -> Result<Vec<CompositionEntry>, IndexError> {
        Ok(self.read(COMPOSITIONS, date)?.unwrap_or_default())
    }

    fn put_composition(&self, date: NaiveDate, entries: &[CompositionEntry]) -> Result<(), IndexError> {
        let mut snapshot = entries.to_vec();
        snapshot.sort_by_key(|e| e.rank);
        self.write(COMPOSITIONS, date, &snapshot)
    }

    fn get_composition_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<CompositionEntry>>, IndexError> {
        let mut out = BTreeMap::new();
        for date in self.dates(COMPOSITIONS)? {
            if date < start || date > end {
                continue;
            }
            if let Some(snapshot) = self.read(COMPOSITIONS, date)? {
                out.insert(date, snapshot);
            }
        }
        Ok(out)
    }

    fn first_composition_date(&self) -> Result<Option<NaiveDate>, IndexError> {
        Ok(self.dates(COMPOSITIONS)?.into_iter().next())
    }
}

impl PerformanceStore for FileIndexStore {
    fn get_performance(&self, date: NaiveDate) -> Result<Option<PerformanceEntry>, IndexError> {
        self.read(PERFORMANCE, date)
    }

    fn put_performance(&self, entries: &[PerformanceEntry]) -> Result<(), IndexError> {
        for e in entries {
            self.write(PERFORMANCE, e.date, e)?;
        }
        Ok(())
    }

    fn get_performance_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PerformanceEntry>, IndexError> {
        let mut out = Vec::new();
        for date in self.dates(PERFORMANCE)? {
            if date < start || date > end {
                continue;
            }
            if let Some(entry) = self.read(PERFORMANCE, date)? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    fn truncate_performance_from(&self, date: NaiveDate) -> Result<usize, IndexError> {
        let mut removed = 0;
        for d in self.dates(PERFORMANCE)? {
            if d >= date {
                fs::remove_file(self.path(PERFORMANCE, d))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
