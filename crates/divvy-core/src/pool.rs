use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::dividend::{AccountSummary, DividendLedger, DividendState};
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::payout::{Payout, PayoutBudget};
use crate::stake::{Balances, StakeLedger, StakeView};
use crate::{AccountId, Amount};

/// 32-byte identifier of an applied batch, hex encoded on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(pub [u8; 32]);

impl BatchId {
    /// Content-derived id: SHA-256 over the JSON encoding of the ops.
    pub fn of(ops: &[PoolOp]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"divvy-batch");
        hasher.update((ops.len() as u64).to_le_bytes());
        for op in ops {
            // PoolOp only holds strings and integers; encoding cannot fail.
            if let Ok(encoded) = serde_json::to_vec(op) {
                hasher.update(&encoded);
            }
        }
        BatchId(hasher.finalize().into())
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for BatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        let id: [u8; 32] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("batch id must be 32 bytes"))?;
        Ok(BatchId(id))
    }
}

/// A replayable pool mutation. Withdrawals are deliberately absent: a
/// payout cannot be undone, so it never takes part in an atomic batch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolOp {
    Mint {
        account: AccountId,
        amount: Amount,
    },
    Burn {
        account: AccountId,
        amount: Amount,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    SetBalance {
        account: AccountId,
        balance: Amount,
    },
    Distribute {
        initiator: AccountId,
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    pub height: u64,
    pub previous_batch: Option<BatchId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub meta: SnapshotMetadata,
    pub balances: BTreeMap<AccountId, Amount>,
    pub dividends: DividendState,
    pub applied_batches: BTreeSet<BatchId>,
    pub events: Vec<LedgerEvent>,
    pub state_root: String,
}

/// Stake ledger, dividend ledger and payout channel wired together.
///
/// Every method runs to completion before the next one starts (`&mut self`);
/// see [`crate::shared::SharedPool`] for a handle usable across threads.
pub struct DividendPool<P> {
    book: StakeLedger<DividendLedger>,
    payout: P,
    meta: SnapshotMetadata,
    applied_batches: BTreeSet<BatchId>,
}

impl<P: Payout> DividendPool<P> {
    pub fn new(config: &LedgerConfig, payout: P) -> Self {
        Self {
            book: StakeLedger::new(DividendLedger::new(config)),
            payout,
            meta: SnapshotMetadata::default(),
            applied_batches: BTreeSet::new(),
        }
    }

    /// Rebuilds a pool from a snapshot after checking its state root.
    pub fn from_snapshot(
        snapshot: PoolSnapshot,
        config: &LedgerConfig,
        payout: P,
    ) -> Result<Self, LedgerError> {
        let balances = Balances::from_accounts(snapshot.balances)?;
        let root = compute_state_root(
            &snapshot.meta,
            &balances,
            &snapshot.dividends,
            &snapshot.applied_batches,
            &snapshot.events,
        );
        if hex::encode(root) != snapshot.state_root {
            return Err(LedgerError::StateRootMismatch);
        }
        let mut dividends = DividendLedger::from_state(snapshot.dividends, config);
        dividends.restore_events(VecDeque::from(snapshot.events));
        Ok(Self {
            book: StakeLedger::from_parts(balances, dividends),
            payout,
            meta: snapshot.meta,
            applied_batches: snapshot.applied_batches,
        })
    }

    pub fn mint(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.book.mint(account, amount)
    }

    pub fn burn(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.book.burn(account, amount)
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.book.transfer(from, to, amount)
    }

    pub fn set_balance(&mut self, account: &AccountId, balance: Amount) -> Result<(), LedgerError> {
        self.book.set_balance(account, balance)
    }

    pub fn distribute(&mut self, initiator: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let (balances, dividends) = self.book.split_mut();
        dividends.distribute(initiator, amount, balances)
    }

    /// Withdraws for `account`; `Ok(0)` on nothing owed or a failed payout.
    pub fn withdraw(&mut self, account: &AccountId) -> Result<Amount, LedgerError> {
        let (balances, dividends) = self.book.split_mut();
        dividends.withdraw(account, balances, &mut self.payout)
    }

    /// Withdraws for each account in order, stopping at the first fatal error.
    pub fn withdraw_many<'a, I>(&mut self, accounts: I) -> Result<Vec<(AccountId, Amount)>, LedgerError>
    where
        I: IntoIterator<Item = &'a AccountId>,
    {
        let mut paid = Vec::new();
        for account in accounts {
            let amount = self.withdraw(account)?;
            paid.push((account.clone(), amount));
        }
        Ok(paid)
    }

    pub fn apply(&mut self, op: &PoolOp) -> Result<(), LedgerError> {
        match op {
            PoolOp::Mint { account, amount } => self.mint(account, *amount),
            PoolOp::Burn { account, amount } => self.burn(account, *amount),
            PoolOp::Transfer { from, to, amount } => self.transfer(from, to, *amount),
            PoolOp::SetBalance { account, balance } => self.set_balance(account, *balance),
            PoolOp::Distribute { initiator, amount } => self.distribute(initiator, *amount),
        }
    }

    /// Applies every op or none of them. A batch id is accepted only once.
    pub fn apply_batch(&mut self, batch_id: BatchId, ops: &[PoolOp]) -> Result<(), LedgerError> {
        if self.applied_batches.contains(&batch_id) {
            return Err(LedgerError::DuplicateBatch);
        }

        let checkpoint = self.book.clone();
        for (idx, op) in ops.iter().enumerate() {
            if let Err(err) = self.apply(op) {
                self.book = checkpoint;
                warn!(batch = %batch_id, op = idx, error = %err, "batch rolled back");
                return Err(err);
            }
        }

        self.meta.height += 1;
        self.meta.previous_batch = Some(batch_id);
        self.applied_batches.insert(batch_id);
        info!(batch = %batch_id, ops = ops.len(), height = self.meta.height, "batch applied");
        Ok(())
    }
}

impl<P> DividendPool<P> {
    pub fn entitlement_total(&self, account: &AccountId) -> Result<Amount, LedgerError> {
        self.book.observer().entitlement_total(account, self.book.balances())
    }

    pub fn withdrawable(&self, account: &AccountId) -> Result<Amount, LedgerError> {
        self.book.observer().withdrawable(account, self.book.balances())
    }

    pub fn withdrawn_total(&self, account: &AccountId) -> Amount {
        self.book.observer().withdrawn_total(account)
    }

    pub fn summary(&self, account: &AccountId) -> Result<AccountSummary, LedgerError> {
        self.book.observer().summary(account, self.book.balances())
    }

    /// Every account that holds stake or has dividend bookkeeping.
    pub fn accounts(&self) -> BTreeSet<AccountId> {
        let mut accounts: BTreeSet<AccountId> =
            self.book.balances().accounts().keys().cloned().collect();
        accounts.extend(self.book.observer().state().records.keys().cloned());
        accounts
    }

    pub fn summaries(&self) -> Result<Vec<AccountSummary>, LedgerError> {
        self.accounts().iter().map(|a| self.summary(a)).collect()
    }

    pub fn total_distributed(&self) -> Amount {
        self.book.observer().total_distributed()
    }

    pub fn acc_per_share(&self) -> u128 {
        self.book.observer().acc_per_share()
    }

    /// Full-scan audit: every account derives cleanly and the entitlements
    /// sum to no more than what was distributed.
    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        let mut entitled: u128 = 0;
        for summary in self.summaries()? {
            entitled += summary.entitlement as u128;
        }
        let distributed = self.total_distributed();
        if entitled > distributed as u128 {
            return Err(LedgerError::ConservationViolation {
                entitled,
                distributed,
            });
        }
        Ok(())
    }

    pub fn events(&self) -> &VecDeque<LedgerEvent> {
        self.book.observer().events()
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        self.book.split_mut().1.drain_events()
    }

    pub fn payout(&self) -> &P {
        &self.payout
    }

    pub fn payout_mut(&mut self) -> &mut P {
        &mut self.payout
    }

    pub fn set_payout_budget(&mut self, budget: PayoutBudget) {
        self.book.split_mut().1.set_payout_budget(budget);
    }

    pub fn set_allow_transfers(&mut self, allow: bool) {
        self.book.split_mut().1.set_allow_transfers(allow);
    }

    pub fn meta(&self) -> &SnapshotMetadata {
        &self.meta
    }

    /// Merkle root over everything a snapshot carries, journal included.
    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(
            &self.meta,
            self.book.balances(),
            self.book.observer().state(),
            &self.applied_batches,
            self.events(),
        )
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            meta: self.meta.clone(),
            balances: self.book.balances().accounts().clone(),
            dividends: self.book.observer().state().clone(),
            applied_batches: self.applied_batches.clone(),
            events: self.events().iter().cloned().collect(),
            state_root: hex::encode(self.state_root()),
        }
    }
}

impl<P> StakeView for DividendPool<P> {
    fn balance_of(&self, account: &AccountId) -> Amount {
        self.book.balance_of(account)
    }

    fn total_stake(&self) -> Amount {
        self.book.total_stake()
    }
}

fn compute_state_root<'a, E>(
    meta: &SnapshotMetadata,
    balances: &Balances,
    dividends: &DividendState,
    applied_batches: &BTreeSet<BatchId>,
    events: E,
) -> [u8; 32]
where
    E: IntoIterator<Item = &'a LedgerEvent>,
{
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    let mut hasher = Sha256::new();
    hasher.update(b"global");
    hasher.update(dividends.global.total_distributed.to_le_bytes());
    hasher.update(dividends.global.acc_per_share.to_le_bytes());
    leaves.push(hasher.finalize().into());

    let mut hasher = Sha256::new();
    hasher.update(b"meta");
    hasher.update(meta.height.to_le_bytes());
    match &meta.previous_batch {
        Some(batch) => {
            hasher.update([1u8]);
            hasher.update(batch.0);
        }
        None => hasher.update([0u8]),
    }
    leaves.push(hasher.finalize().into());

    for (account, balance) in balances.accounts() {
        let mut hasher = Sha256::new();
        hasher.update(b"stake");
        hasher.update(account.as_bytes());
        hasher.update(balance.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (account, record) in &dividends.records {
        let mut hasher = Sha256::new();
        hasher.update(b"record");
        hasher.update(account.as_bytes());
        hasher.update(record.correction.to_le_bytes());
        hasher.update(record.withdrawn.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for batch in applied_batches {
        let mut hasher = Sha256::new();
        hasher.update(b"batch");
        hasher.update(batch.0);
        leaves.push(hasher.finalize().into());
    }
    // The journal is ordered, so each leaf also binds its position.
    for (seq, event) in events.into_iter().enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(b"event");
        hasher.update((seq as u64).to_le_bytes());
        hash_event(&mut hasher, event);
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn hash_event(hasher: &mut Sha256, event: &LedgerEvent) {
    let (tag, account, amount): (&[u8], &AccountId, Amount) = match event {
        LedgerEvent::Distributed { initiator, amount } => (&b"distributed"[..], initiator, *amount),
        LedgerEvent::Withdrawn { account, amount } => (&b"withdrawn"[..], account, *amount),
    };
    hasher.update(tag);
    hasher.update((account.len() as u64).to_le_bytes());
    hasher.update(account.as_bytes());
    hasher.update(amount.to_le_bytes());
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    // The global leaf is always present.
    leaves[0]
}
