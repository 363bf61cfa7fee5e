//! Engine configuration, loaded from TOML.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.
//!
//! ```toml
//! [index]
//! top_k = 100
//! base_value = 1000.0
//! strategy = "equal_weight"
//!
//! [engine]
//! parallel = true
//! extend_performance = true
//!
//! [cache]
//! enabled = true
//! ttl_secs = 3600
//! backend = "memory"
//! dir = "cache"
//! failure_threshold = 3
//! cooldown_secs = 60
//!
//! [storage]
//! prices_dir = "data/prices"
//! index_dir = "data/index"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use topcap_core::selector::DEFAULT_TOP_K;
use topcap_core::weighting::{create_strategy, STRATEGY_NAMES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IndexConfig {
    pub index: IndexSection,
    pub engine: EngineSection,
    pub cache: CacheSection,
    pub storage: StorageSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Number of constituents (K).
    pub top_k: usize,
    /// Index level on the first date of tracked history.
    pub base_value: f64,
    /// Weighting strategy name.
    pub strategy: String,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            base_value: 1000.0,
            strategy: "equal_weight".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Fan per-date selection and return computation out over rayon.
    pub parallel: bool,
    /// Recompute performance over the built range after every build.
    pub extend_performance: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            parallel: true,
            extend_performance: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub backend: CacheBackend,
    /// Directory for the file backend.
    pub dir: PathBuf,
    /// Consecutive transport failures before the cache is bypassed.
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            backend: CacheBackend::Memory,
            dir: PathBuf::from("cache"),
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Parquet price archive written by the ingestion job.
    pub prices_dir: PathBuf,
    /// Composition and performance files.
    pub index_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            prices_dir: PathBuf::from("data/prices"),
            index_dir: PathBuf::from("data/index"),
        }
    }
}

impl IndexConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.top_k == 0 {
            return Err(ConfigError::Invalid("index.top_k must be at least 1".into()));
        }
        if !(self.index.base_value.is_finite() && self.index.base_value > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "index.base_value must be positive, got {}",
                self.index.base_value
            )));
        }
        if create_strategy(&self.index.strategy).is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown index.strategy '{}' (known: {})",
                self.index.strategy,
                STRATEGY_NAMES.join(", ")
            )));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.ttl_secs must be positive when the cache is enabled".into(),
            ));
        }
        if self.cache.failure_threshold == 0 {
            return Err(ConfigError::Invalid("cache.failure_threshold must be at least 1".into()));
        }
        Ok(())
    }
}
