//! Fixed-point helpers for the dividend-per-share accumulator.
//!
//! The accumulator is stored magnified by [`MAGNITUDE`] so that integer
//! division by the total stake keeps 64 fractional bits. Every operation is
//! checked; callers turn an `Err` into an aborted operation.
//!
//! Widths: amounts and stake are `u64`, and `total_distributed` is a checked
//! `u64`, so the accumulator is bounded by `total_distributed * MAGNITUDE <
//! 2^128` and lives in a `u128`. The product `acc * balance` is below 2^192,
//! so corrections and entitlements are computed in 256-bit signed arithmetic,
//! which holds that product for every representable balance.

use ethnum::I256;

use crate::error::LedgerError;
use crate::Amount;

/// Scaling factor applied to the per-share accumulator (2^64).
pub const MAGNITUDE: u128 = 1 << 64;

/// Magnified per-share increment for distributing `amount` over `total_stake`.
///
/// Floors; the remainder `(amount * MAGNITUDE) % total_stake` is forfeited.
pub fn per_share_increment(amount: Amount, total_stake: Amount) -> Result<u128, LedgerError> {
    if total_stake == 0 {
        return Err(LedgerError::NoStakeholders);
    }
    // amount < 2^64 so the product stays below 2^128.
    let magnified = (amount as u128)
        .checked_mul(MAGNITUDE)
        .ok_or(LedgerError::ArithmeticOverflow("distribution scaling"))?;
    Ok(magnified / total_stake as u128)
}

/// Forfeited magnified remainder of a single distribution.
pub fn forfeited_remainder(amount: Amount, total_stake: Amount) -> u128 {
    if total_stake == 0 {
        return 0;
    }
    ((amount as u128) * MAGNITUDE) % total_stake as u128
}

pub fn advance_accumulator(acc: u128, increment: u128) -> Result<u128, LedgerError> {
    acc.checked_add(increment)
        .ok_or(LedgerError::ArithmeticOverflow("accumulator"))
}

/// `acc * amount` in the signed correction domain.
pub fn magnified_shares(acc: u128, amount: Amount) -> Result<I256, LedgerError> {
    I256::from(acc)
        .checked_mul(I256::from(amount))
        .ok_or(LedgerError::ArithmeticOverflow("correction"))
}

/// Applies a signed delta to a correction term.
pub fn shift_correction(correction: I256, delta: I256) -> Result<I256, LedgerError> {
    correction
        .checked_add(delta)
        .ok_or(LedgerError::ArithmeticOverflow("correction"))
}

/// Magnified lifetime entitlement `acc * balance + correction`.
///
/// Returns `None` when the value is negative, which callers report as a
/// fatal invariant violation.
pub fn magnified_entitlement(
    acc: u128,
    balance: Amount,
    correction: I256,
) -> Result<Option<I256>, LedgerError> {
    let total = magnified_shares(acc, balance)?
        .checked_add(correction)
        .ok_or(LedgerError::ArithmeticOverflow("entitlement"))?;
    if total < I256::ZERO {
        return Ok(None);
    }
    Ok(Some(total))
}

/// De-scales a non-negative magnified value back into whole units (floor).
pub fn descale(magnified: I256) -> Result<Amount, LedgerError> {
    let whole = magnified / I256::from(MAGNITUDE);
    if whole < I256::ZERO || whole > I256::from(Amount::MAX) {
        return Err(LedgerError::ArithmeticOverflow("entitlement"));
    }
    let (_, low) = whole.into_words();
    Ok(low as Amount)
}
