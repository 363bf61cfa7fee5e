//! Weighting strategies: turn a ranked selection into symbol weights.
//!
//! A strategy sees only the selection, so it works for any count and never
//! assumes the configured index size. `create_strategy` maps a config name to
//! a boxed strategy.

use std::collections::BTreeMap;

use crate::domain::Constituent;

/// Assigns a weight to every selected constituent.
pub trait WeightingStrategy: Send + Sync {
    /// Stable identifier, used in config and cache keys.
    fn name(&self) -> &'static str;

    /// Weights keyed by symbol. Must sum to 1 for a non-empty selection;
    /// an empty selection yields an empty map.
    fn assign_weights(&self, selection: &[Constituent]) -> BTreeMap<String, f64>;
}

/// Every constituent gets `1 / count`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl WeightingStrategy for EqualWeight {
    fn name(&self) -> &'static str {
        "equal_weight"
    }

    fn assign_weights(&self, selection: &[Constituent]) -> BTreeMap<String, f64> {
        if selection.is_empty() {
            return BTreeMap::new();
        }
        let w = 1.0 / selection.len() as f64;
        selection.iter().map(|c| (c.symbol.clone(), w)).collect()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown weighting strategy: {0}")]
pub struct UnknownStrategy(pub String);

/// Names accepted by `create_strategy`.
pub const STRATEGY_NAMES: &[&str] = &["equal_weight"];

pub fn create_strategy(name: &str) -> Result<Box<dyn WeightingStrategy>, UnknownStrategy> {
    match name {
        "equal_weight" => Ok(Box::new(EqualWeight)),
        other => Err(UnknownStrategy(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(symbol: &str) -> Constituent {
        Constituent {
            symbol: symbol.into(),
            market_cap: 1.0,
        }
    }

    #[test]
    fn equal_weight_uses_selection_count() {
        let w = EqualWeight.assign_weights(&[c("A"), c("B"), c("C")]);
        assert_eq!(w.len(), 3);
        for v in w.values() {
            assert!((v - 1.0 / 3.0).abs() < 1e-15);
        }
        let total: f64 = w.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_selection_is_empty_map() {
        assert!(EqualWeight.assign_weights(&[]).is_empty());
    }

    #[test]
    fn factory_resolves_names() {
        assert_eq!(create_strategy("equal_weight").unwrap().name(), "equal_weight");
        let err = create_strategy("cap_weight").err().unwrap();
        assert!(err.to_string().contains("cap_weight"));
        for name in STRATEGY_NAMES {
            assert!(create_strategy(name).is_ok());
        }
    }
}
