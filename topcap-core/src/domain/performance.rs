//! PerformanceEntry: one point of the index level series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Index performance on one date.
///
/// `index_value(t) = index_value(t-1) * (1 + daily_return(t))` and
/// `cumulative_return(t) = index_value(t) / base_value - 1`, where the base is
/// the first date of the whole tracked history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub date: NaiveDate,
    pub daily_return: f64,
    pub cumulative_return: f64,
    pub index_value: f64,
}

impl PerformanceEntry {
    /// The first point of the tracked history.
    pub fn base(date: NaiveDate, base_value: f64) -> Self {
        Self {
            date,
            daily_return: 0.0,
            cumulative_return: 0.0,
            index_value: base_value,
        }
    }

    /// Compound `daily_return` onto the previous index value.
    pub fn compound(date: NaiveDate, previous_value: f64, daily_return: f64, base_value: f64) -> Self {
        let index_value = previous_value * (1.0 + daily_return);
        Self {
            date,
            daily_return,
            cumulative_return: index_value / base_value - 1.0,
            index_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compounding_follows_previous_value() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let e = PerformanceEntry::compound(d, 1100.0, -0.1, 1000.0);
        assert!((e.index_value - 990.0).abs() < 1e-9);
        assert!((e.cumulative_return - (-0.01)).abs() < 1e-12);
    }

    #[test]
    fn base_point_is_flat() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let e = PerformanceEntry::base(d, 1000.0);
        assert_eq!(e.index_value, 1000.0);
        assert_eq!(e.daily_return, 0.0);
        assert_eq!(e.cumulative_return, 0.0);
    }
}
