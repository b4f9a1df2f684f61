//! External payout seam used by withdrawals.
//!
//! A payout moves already-accounted dividends out of the system. It may fail
//! for reasons the ledger cannot control; failures are soft and the ledger
//! rolls its bookkeeping back.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{AccountId, Amount};

/// Cost ceiling for a single payout call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PayoutBudget(pub u64);

impl PayoutBudget {
    pub const DEFAULT: PayoutBudget = PayoutBudget(3_000);
}

impl Default for PayoutBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayoutError {
    #[error("recipient {0} rejected the payout")]
    Rejected(AccountId),
    #[error("payout cost {cost} exceeds budget {budget}")]
    BudgetExceeded { cost: u64, budget: u64 },
    #[error("payout channel unavailable: {0}")]
    Unavailable(String),
}

/// Anything able to hand `amount` to `account` within a cost budget.
pub trait Payout {
    fn pay(
        &mut self,
        account: &AccountId,
        amount: Amount,
        budget: PayoutBudget,
    ) -> Result<(), PayoutError>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryPayoutConfig {
    /// Simulated cost charged against the budget per payout.
    pub cost_per_payout: u64,
    /// Recipients that refuse every payout.
    pub rejecting: BTreeSet<AccountId>,
}

/// In-memory payout sink; records what each account received.
#[derive(Clone, Debug, Default)]
pub struct MemoryPayout {
    config: MemoryPayoutConfig,
    paid: BTreeMap<AccountId, Amount>,
}

impl MemoryPayout {
    pub fn new(config: MemoryPayoutConfig) -> Self {
        Self {
            config,
            paid: BTreeMap::new(),
        }
    }

    pub fn paid_to(&self, account: &AccountId) -> Amount {
        self.paid.get(account).copied().unwrap_or(0)
    }

    pub fn total_paid(&self) -> u128 {
        self.paid.values().map(|v| *v as u128).sum()
    }

    pub fn reject(&mut self, account: impl Into<AccountId>) {
        self.config.rejecting.insert(account.into());
    }

    pub fn accept(&mut self, account: &AccountId) {
        self.config.rejecting.remove(account);
    }
}

impl Payout for MemoryPayout {
    fn pay(
        &mut self,
        account: &AccountId,
        amount: Amount,
        budget: PayoutBudget,
    ) -> Result<(), PayoutError> {
        if self.config.cost_per_payout > budget.0 {
            return Err(PayoutError::BudgetExceeded {
                cost: self.config.cost_per_payout,
                budget: budget.0,
            });
        }
        if self.config.rejecting.contains(account) {
            return Err(PayoutError::Rejected(account.clone()));
        }
        let entry = self.paid.entry(account.clone()).or_default();
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| PayoutError::Unavailable("recipient balance overflow".into()))?;
        debug!(%account, amount, "payout delivered");
        Ok(())
    }
}

/// Payout that always fails; useful for exercising the rollback path.
#[derive(Clone, Copy, Debug, Default)]
pub struct RefusingPayout;

impl Payout for RefusingPayout {
    fn pay(&mut self, account: &AccountId, _: Amount, _: PayoutBudget) -> Result<(), PayoutError> {
        Err(PayoutError::Rejected(account.clone()))
    }
}
