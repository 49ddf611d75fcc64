//! # Access Control
//!
//! Role checks for every mutating vault operation. All of them are pure
//! functions of `(caller, state)`, evaluated against freshly loaded state at
//! the top of each operation. Nothing is cached between calls.
//!
//! | Predicate                  | Passes for          |
//! |----------------------------|---------------------|
//! | [`is_admin`]               | admin               |
//! | [`is_payee`]               | registered payees   |
//! | [`is_withdraw_authorized`] | admin or payee      |
//!
//! Claims are deliberately absent from this table: a claim is authorized by
//! the schedule key alone (see [`crate::scheduler`]).

use payvault_protocol::Identity;

use crate::error::{VaultError, VaultResult};
use crate::state::VaultState;

pub fn is_admin(caller: &Identity, state: &VaultState) -> bool {
    *caller == state.admin
}

pub fn is_payee(caller: &Identity, state: &VaultState) -> bool {
    state.is_payee(caller)
}

/// Ad-hoc withdrawal capability: the admin, or any registered payee.
pub fn is_withdraw_authorized(caller: &Identity, state: &VaultState) -> bool {
    is_admin(caller, state) || is_payee(caller, state)
}

/// Fails with [`VaultError::UnauthorizedAdmin`] unless `caller` is the admin.
pub fn require_admin(caller: &Identity, state: &VaultState) -> VaultResult<()> {
    if !is_admin(caller, state) {
        return Err(VaultError::UnauthorizedAdmin { caller: *caller });
    }
    Ok(())
}

/// Fails with [`VaultError::UnauthorizedPayee`] unless `caller` may withdraw.
pub fn require_payee(caller: &Identity, state: &VaultState) -> VaultResult<()> {
    if !is_withdraw_authorized(caller, state) {
        return Err(VaultError::UnauthorizedPayee { caller: *caller });
    }
    Ok(())
}
