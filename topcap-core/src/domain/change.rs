//! Composition changes, derived by diffing two snapshots, never persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Added,
    Removed,
    RankChanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "ADDED",
            ChangeKind::Removed => "REMOVED",
            ChangeKind::RankChanged => "RANK_CHANGED",
        }
    }
}

/// One symbol's change between two adjacent snapshots.
///
/// `date` is the later snapshot's date. Old fields are `None` for additions,
/// new fields are `None` for removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionChange {
    pub date: NaiveDate,
    pub symbol: String,
    pub kind: ChangeKind,
    pub old_rank: Option<u32>,
    pub new_rank: Option<u32>,
    pub old_weight: Option<f64>,
    pub new_weight: Option<f64>,
}

/// Per-date digest of a change list: who entered, who left, how many moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyChangeSummary {
    pub date: NaiveDate,
    pub entered: Vec<String>,
    pub exited: Vec<String>,
    pub rank_changes: usize,
    /// Entries plus exits; rank moves are not membership changes.
    pub total_changes: usize,
}
