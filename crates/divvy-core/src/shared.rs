//! Thread-safe handle over a [`DividendPool`].
//!
//! Mutations hold the write lock for their full duration, including the
//! payout call made by a withdrawal, so no two mutations interleave. Queries
//! share the read lock and always observe a state between operations.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::dividend::AccountSummary;
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::payout::Payout;
use crate::pool::{BatchId, DividendPool, PoolOp, PoolSnapshot};
use crate::stake::StakeView;
use crate::{AccountId, Amount};

pub struct SharedPool<P> {
    inner: Arc<RwLock<DividendPool<P>>>,
}

impl<P> Clone for SharedPool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Payout> SharedPool<P> {
    pub fn new(pool: DividendPool<P>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(pool)),
        }
    }

    pub fn mint(&self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.inner.write().mint(account, amount)
    }

    pub fn burn(&self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.inner.write().burn(account, amount)
    }

    pub fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.inner.write().transfer(from, to, amount)
    }

    /// Moves `account` to `balance` through a single mint or burn.
    pub fn set_balance(&self, account: &AccountId, balance: Amount) -> Result<(), LedgerError> {
        self.inner.write().set_balance(account, balance)
    }

    pub fn distribute(&self, initiator: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.inner.write().distribute(initiator, amount)
    }

    pub fn withdraw(&self, account: &AccountId) -> Result<Amount, LedgerError> {
        self.inner.write().withdraw(account)
    }

    pub fn apply_batch(&self, batch_id: BatchId, ops: &[PoolOp]) -> Result<(), LedgerError> {
        self.inner.write().apply_batch(batch_id, ops)
    }

    pub fn drain_events(&self) -> Vec<LedgerEvent> {
        self.inner.write().drain_events()
    }
}

impl<P> SharedPool<P> {
    pub fn entitlement_total(&self, account: &AccountId) -> Result<Amount, LedgerError> {
        self.inner.read().entitlement_total(account)
    }

    pub fn withdrawable(&self, account: &AccountId) -> Result<Amount, LedgerError> {
        self.inner.read().withdrawable(account)
    }

    pub fn withdrawn_total(&self, account: &AccountId) -> Amount {
        self.inner.read().withdrawn_total(account)
    }

    pub fn summary(&self, account: &AccountId) -> Result<AccountSummary, LedgerError> {
        self.inner.read().summary(account)
    }

    pub fn total_stake(&self) -> Amount {
        self.inner.read().total_stake()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.inner.read().snapshot()
    }

    /// Runs `f` against a consistent read view of the pool.
    pub fn with_read<R>(&self, f: impl FnOnce(&DividendPool<P>) -> R) -> R {
        let guard = self.inner.read();
        f(&*guard)
    }
}
