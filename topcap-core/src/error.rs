//! Error taxonomy shared by every layer of the index engine.
//!
//! Every failure is scoped to a single request. `NoData` is recoverable (the
//! builder skips the date), `MissingComposition` and `InvalidRange` are
//! surfaced to the caller naming the first offending date, and
//! `CacheUnavailable` is produced by cache transports and swallowed by the
//! cache layer.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no price data for {date}")]
    NoData { date: NaiveDate },

    #[error("no composition built for {date}; run `build` for this date first")]
    MissingComposition { date: NaiveDate },

    #[error("invalid range: end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("invalid composition snapshot for {date}: {reason}")]
    InvalidSnapshot { date: NaiveDate, reason: String },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl IndexError {
    /// Whether a range build may skip the date and carry on.
    pub fn is_skippable(&self) -> bool {
        matches!(self, IndexError::NoData { .. })
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::Storage(format!("serialization: {e}"))
    }
}
