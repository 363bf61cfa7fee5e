//! Date parsing and range helpers.

use chrono::NaiveDate;

use crate::error::IndexError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, IndexError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| IndexError::InvalidDate(s.into()))
}

/// Reject ranges whose end precedes their start. Single-day ranges are valid.
pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), IndexError> {
    if end < start {
        return Err(IndexError::InvalidRange { start, end });
    }
    Ok(())
}

/// Every calendar date in `[start, end]`, ascending.
pub fn calendar_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}
