//! Reconciler configuration

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Tunables of the pairing resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Largest accepted difference between bank and voucher totals
    pub amount_tolerance: BigDecimal,
    /// Reject selections spanning different months unless acknowledged
    pub enforce_month_alignment: bool,
}

impl ReconcilerConfig {
    /// Load from `RECONCILIATION_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            amount_tolerance: env::var("RECONCILIATION_AMOUNT_TOLERANCE")
                .ok()
                .and_then(|s| BigDecimal::from_str(s.trim()).ok())
                .map(|t| t.abs())
                .unwrap_or(defaults.amount_tolerance),
            enforce_month_alignment: env::var("RECONCILIATION_ENFORCE_MONTH_ALIGNMENT")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.enforce_month_alignment),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: BigDecimal::new(1.into(), 2),
            enforce_month_alignment: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerance_is_one_cent() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.amount_tolerance, BigDecimal::from_str("0.01").unwrap());
        assert!(config.enforce_month_alignment);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ReconcilerConfig =
            serde_json::from_value(serde_json::json!({"enforce_month_alignment": false})).unwrap();
        assert!(!config.enforce_month_alignment);
        assert_eq!(config.amount_tolerance, BigDecimal::from_str("0.01").unwrap());
    }
}
