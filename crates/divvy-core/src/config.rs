use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::payout::{MemoryPayoutConfig, PayoutBudget};

/// Tunables for a [`crate::pool::DividendPool`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Cost ceiling handed to every payout attempt.
    pub payout_budget: PayoutBudget,
    /// Whether the transfer hook accepts stake transfers at all.
    pub allow_transfers: bool,
    /// Events retained in the in-memory journal; older ones are evicted.
    pub journal_capacity: usize,
    /// Settings for the in-memory payout simulator.
    pub payout: MemoryPayoutConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            payout_budget: PayoutBudget::default(),
            allow_transfers: true,
            journal_capacity: 4_096,
            payout: MemoryPayoutConfig::default(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, LedgerError> {
        toml::from_str(raw).map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, LedgerConfig::default());
        assert_eq!(cfg.payout_budget, PayoutBudget(3_000));
        assert!(cfg.allow_transfers);
    }

    #[test]
    fn parses_full_document() {
        let cfg = LedgerConfig::from_toml_str(
            r#"
            payout_budget = 5000
            allow_transfers = false
            journal_capacity = 16

            [payout]
            cost_per_payout = 2100
            rejecting = ["mallory"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.payout_budget, PayoutBudget(5_000));
        assert!(!cfg.allow_transfers);
        assert_eq!(cfg.journal_capacity, 16);
        assert_eq!(cfg.payout.cost_per_payout, 2_100);
        assert!(cfg.payout.rejecting.contains("mallory"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = LedgerConfig::from_toml_str("gas_limit = 1").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}
