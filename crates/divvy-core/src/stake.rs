//! Stake ledger collaborator.
//!
//! Owns account balances and total stake. Every mutation validates first,
//! then notifies the registered [`StakeObserver`] while the pre-mutation
//! balances are still in place, and commits only when the observer accepts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::{AccountId, Amount};

/// Read access to stake balances.
pub trait StakeView {
    fn balance_of(&self, account: &AccountId) -> Amount;
    fn total_stake(&self) -> Amount;
}

/// Synchronous hooks fired on every balance change, before it is committed.
///
/// An `Err` aborts the mutation; the stake ledger is left untouched.
pub trait StakeObserver {
    fn on_mint(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError>;
    fn on_burn(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError>;
    fn on_transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError>;
}

impl StakeObserver for () {
    fn on_mint(&mut self, _: &AccountId, _: Amount) -> Result<(), LedgerError> {
        Ok(())
    }

    fn on_burn(&mut self, _: &AccountId, _: Amount) -> Result<(), LedgerError> {
        Ok(())
    }

    fn on_transfer(&mut self, _: &AccountId, _: &AccountId, _: Amount) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Sparse balance table. Zero balances are not stored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Balances {
    accounts: BTreeMap<AccountId, Amount>,
    total: Amount,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a table from raw balances, recomputing the total.
    pub fn from_accounts(accounts: BTreeMap<AccountId, Amount>) -> Result<Self, LedgerError> {
        let mut total: Amount = 0;
        for amount in accounts.values() {
            total = total.checked_add(*amount).ok_or(LedgerError::SupplyOverflow)?;
        }
        let accounts = accounts.into_iter().filter(|(_, v)| *v > 0).collect();
        Ok(Self { accounts, total })
    }

    pub fn accounts(&self) -> &BTreeMap<AccountId, Amount> {
        &self.accounts
    }

    pub fn holders(&self) -> usize {
        self.accounts.len()
    }

    fn credit(&mut self, account: &AccountId, amount: Amount) {
        // Callers check the total first; no single balance can exceed it.
        *self.accounts.entry(account.clone()).or_default() += amount;
        self.total += amount;
    }

    fn debit(&mut self, account: &AccountId, amount: Amount) {
        if let Some(balance) = self.accounts.get_mut(account) {
            *balance -= amount;
            if *balance == 0 {
                self.accounts.remove(account);
            }
        }
        self.total -= amount;
    }

    fn ensure_covers(&self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(LedgerError::InsufficientStake {
                account: account.clone(),
                balance,
                requested: amount,
            });
        }
        Ok(())
    }
}

impl StakeView for Balances {
    fn balance_of(&self, account: &AccountId) -> Amount {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    fn total_stake(&self) -> Amount {
        self.total
    }
}

/// Balance ledger with a registered mutation observer.
#[derive(Clone, Debug, Default)]
pub struct StakeLedger<O> {
    balances: Balances,
    observer: O,
}

impl<O: StakeObserver> StakeLedger<O> {
    pub fn new(observer: O) -> Self {
        Self {
            balances: Balances::new(),
            observer,
        }
    }

    /// Restores a ledger whose observer already reflects `balances`.
    pub fn from_parts(balances: Balances, observer: O) -> Self {
        Self { balances, observer }
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Balances and observer together, for operations that read stake while
    /// updating observer state (distribution, withdrawal).
    pub fn split_mut(&mut self) -> (&Balances, &mut O) {
        (&self.balances, &mut self.observer)
    }

    pub fn mint(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        self.balances
            .total
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow)?;
        self.observer.on_mint(account, amount)?;
        self.balances.credit(account, amount);
        Ok(())
    }

    pub fn burn(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        self.balances.ensure_covers(account, amount)?;
        self.observer.on_burn(account, amount)?;
        self.balances.debit(account, amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        self.balances.ensure_covers(from, amount)?;
        if from == to {
            return Ok(());
        }
        self.observer.on_transfer(from, to, amount)?;
        self.balances.debit(from, amount);
        self.balances.credit(to, amount);
        Ok(())
    }

    /// Moves `account` to `target` by minting or burning the difference.
    pub fn set_balance(&mut self, account: &AccountId, target: Amount) -> Result<(), LedgerError> {
        let current = self.balances.balance_of(account);
        match target.cmp(&current) {
            std::cmp::Ordering::Greater => self.mint(account, target - current),
            std::cmp::Ordering::Less => self.burn(account, current - target),
            std::cmp::Ordering::Equal => Ok(()),
        }
    }
}

impl<O> StakeView for StakeLedger<O> {
    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.balance_of(account)
    }

    fn total_stake(&self) -> Amount {
        self.balances.total_stake()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        refuse: bool,
    }

    impl StakeObserver for Recorder {
        fn on_mint(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
            self.calls.push(format!("mint {account} {amount}"));
            if self.refuse {
                return Err(LedgerError::ArithmeticOverflow("correction"));
            }
            Ok(())
        }

        fn on_burn(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
            self.calls.push(format!("burn {account} {amount}"));
            Ok(())
        }

        fn on_transfer(
            &mut self,
            from: &AccountId,
            to: &AccountId,
            amount: Amount,
        ) -> Result<(), LedgerError> {
            self.calls.push(format!("transfer {from} {to} {amount}"));
            if self.refuse {
                return Err(LedgerError::TransfersDisabled);
            }
            Ok(())
        }
    }

    #[test]
    fn mutations_notify_observer_and_update_totals() {
        let mut ledger = StakeLedger::new(Recorder::default());
        let alice: AccountId = "alice".into();
        let bob: AccountId = "bob".into();
        ledger.mint(&alice, 100).unwrap();
        ledger.transfer(&alice, &bob, 40).unwrap();
        ledger.burn(&bob, 10).unwrap();
        assert_eq!(ledger.balance_of(&alice), 60);
        assert_eq!(ledger.balance_of(&bob), 30);
        assert_eq!(ledger.total_stake(), 90);
        assert_eq!(
            ledger.observer().calls,
            vec!["mint alice 100", "transfer alice bob 40", "burn bob 10"]
        );
    }

    #[test]
    fn zero_and_self_transfers_skip_the_hook() {
        let mut ledger = StakeLedger::new(Recorder::default());
        let alice: AccountId = "alice".into();
        ledger.mint(&alice, 5).unwrap();
        ledger.transfer(&alice, &alice, 5).unwrap();
        ledger.transfer(&alice, &"bob".into(), 0).unwrap();
        ledger.mint(&alice, 0).unwrap();
        assert_eq!(ledger.observer().calls.len(), 1);
        assert_eq!(ledger.balance_of(&alice), 5);
    }

    #[test]
    fn rejected_hook_leaves_balances_untouched() {
        let mut ledger = StakeLedger::new(Recorder::default());
        let alice: AccountId = "alice".into();
        ledger.mint(&alice, 5).unwrap();
        ledger.observer.refuse = true;
        assert!(ledger.mint(&alice, 5).is_err());
        assert!(ledger.transfer(&alice, &"bob".into(), 5).is_err());
        assert_eq!(ledger.balance_of(&alice), 5);
        assert_eq!(ledger.total_stake(), 5);
    }

    #[test]
    fn insufficient_balance_is_checked_before_hook() {
        let mut ledger = StakeLedger::new(Recorder::default());
        let err = ledger.burn(&"ghost".into(), 1).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStake {
                account: "ghost".into(),
                balance: 0,
                requested: 1
            }
        );
        assert!(ledger.observer().calls.is_empty());
    }

    #[test]
    fn set_balance_mints_or_burns_difference() {
        let mut ledger = StakeLedger::new(Recorder::default());
        let alice: AccountId = "alice".into();
        ledger.set_balance(&alice, 70).unwrap();
        ledger.set_balance(&alice, 20).unwrap();
        ledger.set_balance(&alice, 20).unwrap();
        assert_eq!(ledger.balance_of(&alice), 20);
        assert_eq!(ledger.observer().calls, vec!["mint alice 70", "burn alice 50"]);
        ledger.set_balance(&alice, 0).unwrap();
        assert_eq!(ledger.balances().holders(), 0);
    }

    #[test]
    fn supply_overflow_is_rejected() {
        let mut ledger = StakeLedger::new(());
        ledger.mint(&"a".into(), u64::MAX).unwrap();
        assert_eq!(ledger.mint(&"b".into(), 1), Err(LedgerError::SupplyOverflow));
    }
}
