use thiserror::Error;

use crate::AccountId;

/// Canonical error type exposed by the ledger.
///
/// Variants fall into three groups. Precondition failures (`NoStakeholders`,
/// `InsufficientStake`, `SupplyOverflow`, `TransfersDisabled`,
/// `DuplicateBatch`) are rejected before any state is touched. Fatal
/// variants (`ArithmeticOverflow`, `NegativeEntitlement`,
/// `InvariantViolation`) signal a bug or an out-of-range configuration and
/// also abort the whole operation without writing. Payout failures are not
/// represented here at all, see [`crate::payout::PayoutError`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Distribution attempted while nobody holds stake.
    #[error("cannot distribute: total stake is zero")]
    NoStakeholders,

    /// Burn or transfer larger than the account balance.
    #[error("insufficient stake in account {account}: balance {balance}, requested {requested}")]
    InsufficientStake {
        account: AccountId,
        balance: u64,
        requested: u64,
    },

    /// Mint would push total stake past the representable range.
    #[error("total stake overflow")]
    SupplyOverflow,

    /// Transfer hook is switched off by configuration.
    #[error("stake transfers are disabled")]
    TransfersDisabled,

    /// Checked arithmetic failed in the accumulator or correction math.
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    /// Derived magnified entitlement went below zero.
    #[error("negative entitlement derived for account {account}")]
    NegativeEntitlement { account: AccountId },

    /// Withdrawn counter exceeds the lifetime entitlement.
    #[error("withdrawn amount exceeds entitlement for account {account}")]
    InvariantViolation { account: AccountId },

    /// Sum of entitlements exceeds everything ever distributed.
    #[error("entitlements {entitled} exceed total distributed {distributed}")]
    ConservationViolation { entitled: u128, distributed: u64 },

    /// Batch id was applied before.
    #[error("duplicate batch detected")]
    DuplicateBatch,

    /// Snapshot contents do not hash to the recorded root.
    #[error("snapshot state root mismatch")]
    StateRootMismatch,

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LedgerError {
    /// Fatal errors indicate a broken invariant rather than a bad request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::ArithmeticOverflow(_)
                | LedgerError::NegativeEntitlement { .. }
                | LedgerError::InvariantViolation { .. }
                | LedgerError::ConservationViolation { .. }
        )
    }
}
