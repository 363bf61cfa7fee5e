//! Domain types for the index engine.

pub mod change;
pub mod composition;
pub mod performance;
pub mod price;

pub use change::{ChangeKind, CompositionChange, DailyChangeSummary};
pub use composition::{snapshot_violations, CompositionEntry, CompositionView, Constituent, Selection};
pub use performance::PerformanceEntry;
pub use price::DailyPrice;

/// Tolerance for "weights sum to one" checks.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;
