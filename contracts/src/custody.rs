//! # Fund Custody
//!
//! Rules for moving value in and out of a vault account. The functions here
//! decide *whether* a movement is allowed; the
//! [`VaultProgram`](crate::VaultProgram) performs it on the ledger.
//!
//! ## Reserve Rule
//!
//! While a vault is open, no debit may leave its balance below the reserve:
//!
//! ```text
//! balance - amount >= reserve
//! ```
//!
//! Closing the vault is the only way to take the balance to zero.

use payvault_protocol::Identity;

use crate::access;
use crate::epoch;
use crate::error::{VaultError, VaultResult};
use crate::state::VaultState;

/// Rejects zero amounts.
pub fn require_positive(amount: u64) -> VaultResult<()> {
    if amount == 0 {
        return Err(VaultError::InvalidAmount);
    }
    Ok(())
}

/// Checks the reserve rule and returns the balance left after the debit.
pub fn ensure_reserve(balance: u64, amount: u64, reserve: u64) -> VaultResult<u64> {
    balance
        .checked_sub(amount)
        .filter(|remaining| *remaining >= reserve)
        .ok_or(VaultError::InsufficientFunds {
            available: balance,
            requested: amount,
            reserve,
        })
}

/// Amount that can leave the vault right now without breaching the reserve.
pub fn spendable(balance: u64, reserve: u64) -> u64 {
    balance.saturating_sub(reserve)
}

/// Authorizes an ad-hoc withdrawal and stages its effect on `state`.
///
/// Check order: role, amount, epoch allowance, reserve. The epoch charge is
/// written into `state`; the caller persists it only if the ledger transfer
/// succeeds.
pub fn authorize_withdrawal(
    state: &mut VaultState,
    caller: &Identity,
    amount: u64,
    balance: u64,
    reserve: u64,
    now: i64,
) -> VaultResult<u64> {
    access::require_payee(caller, state)?;
    require_positive(amount)?;
    epoch::charge_withdrawal(state, caller, amount, now)?;
    ensure_reserve(balance, amount, reserve)
}
