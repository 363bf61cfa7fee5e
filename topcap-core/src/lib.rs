//! topcap core: domain types, storage, constituent selection and weighting.
//!
//! This crate holds everything the index engine needs below the orchestration
//! layer:
//! - Domain types (daily prices, composition entries, performance entries, changes)
//! - The error taxonomy shared by every layer
//! - Storage traits for market data, compositions and performance, with
//!   in-memory, file and Parquet implementations
//! - Top-K constituent selection by market capitalization
//! - Pluggable weighting strategies (equal weight)

pub mod dates;
pub mod domain;
pub mod error;
pub mod selector;
pub mod store;
pub mod synthetic;
pub mod weighting;

pub use error::IndexError;
