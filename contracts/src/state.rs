//! # Vault State
//!
//! The administrative record of a vault: who owns it, who may withdraw, and
//! which payees hold recurring payout entitlements. Balances are not stored
//! here; they live in the vault's ledger account.
//!
//! ## Invariants
//!
//! - `admin` never changes after creation and is never a member of `payees`.
//! - `payees` holds no duplicates and keeps insertion order.
//! - `schedules` holds at most one entry per payee. Its keys need not be a
//!   subset of `payees`: a schedule outlives the removal of its payee.

use payvault_protocol::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::epoch::EpochSpending;
use crate::error::{VaultError, VaultResult};

// ---------------------------------------------------------------------------
// PayoutSchedule
// ---------------------------------------------------------------------------

/// A recurring, time-gated payout owed to a single payee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSchedule {
    /// The only identity allowed to claim this schedule.
    pub payee: Identity,
    /// Fixed amount paid out per claim. Always > 0.
    pub amount: u64,
    /// Unix timestamp at or after which the next claim is allowed.
    pub next_eligible_time: i64,
    /// Seconds between claim windows. Always > 0.
    pub interval: i64,
}

impl PayoutSchedule {
    /// Whether a claim at `now` falls inside an open window.
    pub fn is_claimable(&self, now: i64) -> bool {
        now >= self.next_eligible_time
    }

    /// Moves the schedule one window forward and returns the new
    /// `next_eligible_time`.
    ///
    /// Advances from the previous window, not from the time of the claim, so
    /// a late claimer can catch up on missed windows one claim at a time.
    pub fn advance(&mut self) -> VaultResult<i64> {
        self.next_eligible_time = self
            .next_eligible_time
            .checked_add(self.interval)
            .ok_or(VaultError::MathOverflow)?;
        Ok(self.next_eligible_time)
    }
}

// ---------------------------------------------------------------------------
// VaultState
// ---------------------------------------------------------------------------

/// Administrative record of one vault, addressed by its admin identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    /// The vault's creator and sole structural authority.
    pub admin: Identity,
    /// Identities allowed to withdraw ad hoc, in registration order.
    pub payees: Vec<Identity>,
    /// Recurring payout entitlements, keyed by payee.
    pub schedules: BTreeMap<Identity, PayoutSchedule>,
    /// Per-payee withdrawal allowances.
    pub epoch_limits: BTreeMap<Identity, EpochSpending>,
}

impl VaultState {
    /// A fresh vault with no payees, schedules, or limits.
    pub fn new(admin: Identity) -> Self {
        Self {
            admin,
            payees: Vec::new(),
            schedules: BTreeMap::new(),
            epoch_limits: BTreeMap::new(),
        }
    }

    /// Whether `identity` is currently a registered payee.
    pub fn is_payee(&self, identity: &Identity) -> bool {
        self.payees.contains(identity)
    }

    /// The schedule bound to `payee`, if any.
    pub fn schedule(&self, payee: &Identity) -> Option<&PayoutSchedule> {
        self.schedules.get(payee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(next: i64, interval: i64) -> PayoutSchedule {
        PayoutSchedule {
            payee: Identity::from_seed("p1"),
            amount: 100,
            next_eligible_time: next,
            interval,
        }
    }

    #[test]
    fn claimable_at_and_after_window() {
        let s = schedule(1_000, 10);
        assert!(!s.is_claimable(999));
        assert!(s.is_claimable(1_000));
        assert!(s.is_claimable(5_000));
    }

    #[test]
    fn advance_steps_by_interval() {
        let mut s = schedule(1_000, 10);
        assert_eq!(s.advance().unwrap(), 1_010);
        assert_eq!(s.advance().unwrap(), 1_020);
    }

    #[test]
    fn advance_overflow_is_an_error() {
        let mut s = schedule(i64::MAX - 5, 10);
        assert_eq!(s.advance(), Err(VaultError::MathOverflow));
        assert_eq!(s.next_eligible_time, i64::MAX - 5);
    }

    #[test]
    fn bincode_round_trip_preserves_order() {
        let mut state = VaultState::new(Identity::from_seed("admin"));
        state.payees.push(Identity::from_seed("z"));
        state.payees.push(Identity::from_seed("a"));
        state
            .schedules
            .insert(Identity::from_seed("z"), schedule(5, 5));

        let bytes = bincode::serialize(&state).unwrap();
        let back: VaultState = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn json_uses_base58_keys() {
        let admin = Identity::from_seed("admin");
        let mut state = VaultState::new(admin);
        state
            .schedules
            .insert(Identity::from_seed("p1"), schedule(5, 5));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["admin"], admin.to_base58());
        assert!(json["schedules"]
            .as_object()
            .unwrap()
            .contains_key(&Identity::from_seed("p1").to_base58()));
    }
}
