//! Dividend-per-share accounting.
//!
//! A single magnified accumulator grows on every distribution. Each account
//! carries a signed correction that is adjusted at the moment its balance
//! changes, so that `acc * balance + correction` stays fixed across the
//! change. Lifetime entitlement is that quantity de-scaled; nothing iterates
//! over holders.

use std::collections::{BTreeMap, VecDeque};

use ethnum::I256;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::fixed;
use crate::payout::{Payout, PayoutBudget};
use crate::stake::{StakeObserver, StakeView};
use crate::{AccountId, Amount};

/// Process-wide accounting state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GlobalState {
    /// Sum of every amount ever distributed.
    pub total_distributed: Amount,
    /// Dividend per unit of stake, magnified by [`fixed::MAGNITUDE`].
    #[serde(with = "crate::wide")]
    pub acc_per_share: u128,
}

/// Per-account bookkeeping. An all-zero record is never stored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRecord {
    #[serde(with = "crate::wide")]
    pub correction: I256,
    pub withdrawn: Amount,
}

impl Default for AccountRecord {
    fn default() -> Self {
        Self {
            correction: I256::ZERO,
            withdrawn: 0,
        }
    }
}

impl AccountRecord {
    fn is_empty(&self) -> bool {
        self.correction == I256::ZERO && self.withdrawn == 0
    }
}

/// Serializable form of the dividend side of the pool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DividendState {
    pub global: GlobalState,
    pub records: BTreeMap<AccountId, AccountRecord>,
}

/// Derived view of one account.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountSummary {
    pub account: AccountId,
    pub balance: Amount,
    pub entitlement: Amount,
    pub withdrawable: Amount,
    pub withdrawn: Amount,
}

#[derive(Clone, Debug)]
pub struct DividendLedger {
    state: DividendState,
    allow_transfers: bool,
    payout_budget: PayoutBudget,
    /// Most recent events, oldest evicted past `journal_capacity`. Consumers
    /// that need every event call [`DividendLedger::drain_events`].
    events: VecDeque<LedgerEvent>,
    journal_capacity: usize,
}

impl Default for DividendLedger {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}

impl DividendLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        Self::from_state(DividendState::default(), config)
    }

    pub fn from_state(state: DividendState, config: &LedgerConfig) -> Self {
        Self {
            state,
            allow_transfers: config.allow_transfers,
            payout_budget: config.payout_budget,
            events: VecDeque::new(),
            journal_capacity: config.journal_capacity,
        }
    }

    pub fn state(&self) -> &DividendState {
        &self.state
    }

    pub fn acc_per_share(&self) -> u128 {
        self.state.global.acc_per_share
    }

    pub fn total_distributed(&self) -> Amount {
        self.state.global.total_distributed
    }

    pub fn record(&self, account: &AccountId) -> AccountRecord {
        self.state.records.get(account).cloned().unwrap_or_default()
    }

    pub fn set_payout_budget(&mut self, budget: PayoutBudget) {
        self.payout_budget = budget;
    }

    pub fn set_allow_transfers(&mut self, allow: bool) {
        self.allow_transfers = allow;
    }

    pub fn events(&self) -> &VecDeque<LedgerEvent> {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        self.events.drain(..).collect()
    }

    pub(crate) fn restore_events(&mut self, events: VecDeque<LedgerEvent>) {
        self.events = events;
        self.trim_journal();
    }

    fn record_event(&mut self, event: LedgerEvent) {
        self.events.push_back(event);
        self.trim_journal();
    }

    fn trim_journal(&mut self) {
        while self.events.len() > self.journal_capacity {
            self.events.pop_front();
        }
    }

    /// Spreads `amount` over current stake holders in O(1).
    ///
    /// Fails with [`LedgerError::NoStakeholders`] when total stake is zero,
    /// even for a zero amount. A zero amount is otherwise a silent no-op.
    pub fn distribute(
        &mut self,
        initiator: &AccountId,
        amount: Amount,
        stake: &impl StakeView,
    ) -> Result<(), LedgerError> {
        let total_stake = stake.total_stake();
        if total_stake == 0 {
            warn!(%initiator, amount, "distribution rejected: no stakeholders");
            return Err(LedgerError::NoStakeholders);
        }
        if amount == 0 {
            return Ok(());
        }

        // A u64 total keeps the accumulator below 2^128.
        let total = self
            .state
            .global
            .total_distributed
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("total distributed"))?;
        let increment = fixed::per_share_increment(amount, total_stake)?;
        let acc = fixed::advance_accumulator(self.state.global.acc_per_share, increment)?;

        self.state.global.acc_per_share = acc;
        self.state.global.total_distributed = total;
        info!(
            %initiator,
            amount,
            total_stake,
            forfeited = %fixed::forfeited_remainder(amount, total_stake),
            "dividends distributed"
        );
        self.record_event(LedgerEvent::Distributed {
            initiator: initiator.clone(),
            amount,
        });
        Ok(())
    }

    /// Lifetime dividends earned by `account`, withdrawn or not.
    pub fn entitlement_total(
        &self,
        account: &AccountId,
        stake: &impl StakeView,
    ) -> Result<Amount, LedgerError> {
        let record = self.state.records.get(account);
        let correction = record.map(|r| r.correction).unwrap_or(I256::ZERO);
        let magnified = fixed::magnified_entitlement(
            self.state.global.acc_per_share,
            stake.balance_of(account),
            correction,
        )?
        .ok_or_else(|| LedgerError::NegativeEntitlement {
            account: account.clone(),
        })?;
        fixed::descale(magnified)
    }

    pub fn withdrawable(
        &self,
        account: &AccountId,
        stake: &impl StakeView,
    ) -> Result<Amount, LedgerError> {
        let entitlement = self.entitlement_total(account, stake)?;
        entitlement
            .checked_sub(self.withdrawn_total(account))
            .ok_or_else(|| LedgerError::InvariantViolation {
                account: account.clone(),
            })
    }

    pub fn withdrawn_total(&self, account: &AccountId) -> Amount {
        self.state
            .records
            .get(account)
            .map(|r| r.withdrawn)
            .unwrap_or(0)
    }

    pub fn summary(
        &self,
        account: &AccountId,
        stake: &impl StakeView,
    ) -> Result<AccountSummary, LedgerError> {
        let entitlement = self.entitlement_total(account, stake)?;
        let withdrawn = self.withdrawn_total(account);
        let withdrawable = entitlement
            .checked_sub(withdrawn)
            .ok_or_else(|| LedgerError::InvariantViolation {
                account: account.clone(),
            })?;
        Ok(AccountSummary {
            account: account.clone(),
            balance: stake.balance_of(account),
            entitlement,
            withdrawable,
            withdrawn,
        })
    }

    /// Pays out everything `account` can currently withdraw.
    ///
    /// `withdrawn` is bumped before the payout is attempted and restored if
    /// the payout fails or panics. Returns the amount paid; a failed payout
    /// returns `Ok(0)`. `Err` is reserved for fatal accounting errors.
    pub fn withdraw<P: Payout + ?Sized>(
        &mut self,
        account: &AccountId,
        stake: &impl StakeView,
        payout: &mut P,
    ) -> Result<Amount, LedgerError> {
        let amount = self.withdrawable(account, stake)?;
        if amount == 0 {
            return Ok(0);
        }

        let budget = self.payout_budget;
        let guard = PendingWithdrawal::open(&mut self.state.records, account, amount)?;
        if let Err(err) = payout.pay(account, amount, budget) {
            drop(guard);
            warn!(%account, amount, error = %err, "payout failed, withdrawal rolled back");
            return Ok(0);
        }
        guard.commit();

        info!(%account, amount, "dividends withdrawn");
        self.record_event(LedgerEvent::Withdrawn {
            account: account.clone(),
            amount,
        });
        Ok(amount)
    }

    fn shares(&self, amount: Amount) -> Result<I256, LedgerError> {
        fixed::magnified_shares(self.state.global.acc_per_share, amount)
    }

    fn corrected(&self, account: &AccountId, delta: I256) -> Result<I256, LedgerError> {
        let current = self
            .state
            .records
            .get(account)
            .map(|r| r.correction)
            .unwrap_or(I256::ZERO);
        fixed::shift_correction(current, delta)
    }

    fn write_correction(&mut self, account: &AccountId, correction: I256) {
        let record = self.state.records.entry(account.clone()).or_default();
        record.correction = correction;
        if record.is_empty() {
            self.state.records.remove(account);
        }
    }
}

impl StakeObserver for DividendLedger {
    fn on_mint(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let shares = self.shares(amount)?;
        let correction = self.corrected(account, -shares)?;
        self.write_correction(account, correction);
        debug!(%account, amount, %correction, "mint corrected");
        Ok(())
    }

    fn on_burn(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let shares = self.shares(amount)?;
        let correction = self.corrected(account, shares)?;
        self.write_correction(account, correction);
        debug!(%account, amount, %correction, "burn corrected");
        Ok(())
    }

    fn on_transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if !self.allow_transfers {
            warn!(%from, %to, amount, "transfer rejected: transfers disabled");
            return Err(LedgerError::TransfersDisabled);
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        let shares = self.shares(amount)?;
        let from_correction = self.corrected(from, shares)?;
        let to_correction = self.corrected(to, -shares)?;
        self.write_correction(from, from_correction);
        self.write_correction(to, to_correction);
        debug!(%from, %to, amount, "transfer corrected");
        Ok(())
    }
}

/// Optimistic `withdrawn` bump that is undone unless committed.
struct PendingWithdrawal<'a> {
    records: &'a mut BTreeMap<AccountId, AccountRecord>,
    account: &'a AccountId,
    amount: Amount,
    committed: bool,
}

impl<'a> PendingWithdrawal<'a> {
    fn open(
        records: &'a mut BTreeMap<AccountId, AccountRecord>,
        account: &'a AccountId,
        amount: Amount,
    ) -> Result<Self, LedgerError> {
        let record = records.entry(account.clone()).or_default();
        record.withdrawn = record
            .withdrawn
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("withdrawn"))?;
        Ok(Self {
            records,
            account,
            amount,
            committed: false,
        })
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingWithdrawal<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Some(record) = self.records.get_mut(self.account) {
            record.withdrawn -= self.amount;
            if record.is_empty() {
                self.records.remove(self.account);
            }
        }
    }
}
