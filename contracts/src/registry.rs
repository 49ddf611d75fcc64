//! Payee registry: bounded, ordered, duplicate-free.
//!
//! Both operations assume the caller already passed
//! [`require_admin`](crate::access::require_admin).

use payvault_protocol::Identity;

use crate::error::{VaultError, VaultResult};
use crate::state::VaultState;

/// Appends `identity` to the registry.
///
/// Checks run in a fixed order: capacity, duplicate, then admin.
pub fn add_payee(state: &mut VaultState, identity: Identity, max_payees: usize) -> VaultResult<()> {
    if state.payees.len() >= max_payees {
        return Err(VaultError::PayeeLimitReached { max: max_payees });
    }
    if state.is_payee(&identity) {
        return Err(VaultError::PayeeAlreadyExists(identity));
    }
    if identity == state.admin {
        return Err(VaultError::InvalidPayee(identity));
    }
    state.payees.push(identity);
    Ok(())
}

/// Removes `identity`, keeping the relative order of the rest.
///
/// Any schedule or epoch limit bound to `identity` is left in place.
pub fn remove_payee(state: &mut VaultState, identity: &Identity) -> VaultResult<()> {
    let index = state
        .payees
        .iter()
        .position(|p| p == identity)
        .ok_or(VaultError::PayeeNotFound(*identity))?;
    state.payees.remove(index);
    Ok(())
}
