//! Dividend accounting over a mutable stake ledger.
//!
//! The crate is built around the magnified dividend-per-share technique:
//!
//! * [`dividend`] — the accumulator, per-account correction terms, the
//!   balance-change hooks, withdrawal with rollback, and pure queries.
//! * [`stake`] — the stake ledger collaborator and the observer seam through
//!   which it reports every balance change before committing it.
//! * [`payout`] — the external payout seam, its cost budget and an
//!   in-memory implementation.
//! * [`pool`] — a facade wiring the three together, with atomic batches and
//!   root-sealed snapshots.
//! * [`shared`] — a lock-guarded handle that serializes mutations.
//!
//! Distribution and balance changes are O(1); nothing iterates over holders
//! except the explicit audit in [`pool::DividendPool::check_invariants`].

pub mod config;
pub mod dividend;
pub mod events;
pub mod fixed;
pub mod payout;
pub mod pool;
pub mod shared;
pub mod stake;

mod error;
mod wide;

pub use config::LedgerConfig;
pub use dividend::{AccountRecord, AccountSummary, DividendLedger, DividendState, GlobalState};
pub use error::LedgerError;
pub use events::LedgerEvent;
pub use fixed::MAGNITUDE;
pub use payout::{MemoryPayout, Payout, PayoutBudget, PayoutError, RefusingPayout};
pub use pool::{BatchId, DividendPool, PoolOp, PoolSnapshot};
pub use shared::SharedPool;
pub use stake::{StakeLedger, StakeObserver, StakeView};

pub type AccountId = String;
pub type Amount = u64;
