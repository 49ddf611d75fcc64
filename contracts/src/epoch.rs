//! # Epoch Spending Limits
//!
//! An admin may cap how much a payee can withdraw ad hoc within a rolling
//! window ("epoch"). The window is lazy: nothing ticks in the background.
//! Each withdrawal first checks whether the current epoch has expired and, if
//! so, starts a new one at the time of that withdrawal.
//!
//! ```text
//! epoch_start                epoch_start + duration
//!     |------- spent <= limit -------|
//!                                    ^ first withdrawal at/after this
//!                                      resets: epoch_start = now, spent = 0
//! ```
//!
//! The admin is never limited. Scheduled claims are not charged against the
//! allowance; they are already bounded by their schedule.

use payvault_protocol::Identity;
use serde::{Deserialize, Serialize};

use crate::access;
use crate::error::{VaultError, VaultResult};
use crate::state::VaultState;

/// Per-payee withdrawal allowance and the spend recorded against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSpending {
    /// When the current epoch began (unix seconds).
    pub epoch_start: i64,
    /// Withdrawn so far in the current epoch.
    pub spent_amount: u64,
    /// Allowance per epoch. Always > 0.
    pub limit: u64,
    /// Epoch length in seconds. Always > 0.
    pub duration: i64,
}

impl EpochSpending {
    /// A fresh allowance whose first epoch begins at `now`.
    pub fn new(now: i64, limit: u64, duration: i64) -> VaultResult<Self> {
        if limit == 0 || duration <= 0 {
            return Err(VaultError::InvalidEpochConfig { limit, duration });
        }
        Ok(Self {
            epoch_start: now,
            spent_amount: 0,
            limit,
            duration,
        })
    }

    /// End of the current epoch. Saturates instead of wrapping.
    pub fn epoch_end(&self) -> i64 {
        self.epoch_start.saturating_add(self.duration)
    }

    /// Starts a new epoch if the current one has run out.
    pub fn roll(&mut self, now: i64) {
        if now >= self.epoch_end() {
            self.epoch_start = now;
            self.spent_amount = 0;
        }
    }

    /// Allowance left at `now`, accounting for a pending rollover.
    pub fn remaining(&self, now: i64) -> u64 {
        if now >= self.epoch_end() {
            self.limit
        } else {
            self.limit.saturating_sub(self.spent_amount)
        }
    }

    /// Records a withdrawal of `amount` at `now`, rolling the epoch first.
    pub fn charge(&mut self, amount: u64, now: i64) -> VaultResult<()> {
        self.roll(now);
        let spent = self
            .spent_amount
            .checked_add(amount)
            .filter(|total| *total <= self.limit)
            .ok_or(VaultError::EpochSpendingLimitReached {
                spent: self.spent_amount,
                requested: amount,
                limit: self.limit,
            })?;
        self.spent_amount = spent;
        Ok(())
    }
}

/// Installs or replaces `payee`'s allowance, starting a new epoch at `now`.
///
/// The caller must already have passed the admin check.
pub fn set_limit(
    state: &mut VaultState,
    payee: Identity,
    limit: u64,
    duration: i64,
    now: i64,
) -> VaultResult<()> {
    let spending = EpochSpending::new(now, limit, duration)?;
    if !state.is_payee(&payee) {
        return Err(VaultError::PayeeNotFound(payee));
    }
    state.epoch_limits.insert(payee, spending);
    Ok(())
}

/// Removes `payee`'s allowance.
pub fn clear_limit(state: &mut VaultState, payee: &Identity) -> VaultResult<EpochSpending> {
    state
        .epoch_limits
        .remove(payee)
        .ok_or(VaultError::EpochLimitNotFound(*payee))
}

/// Charges an ad-hoc withdrawal against the caller's allowance, if any.
///
/// The admin and callers without a configured limit pass untouched.
pub fn charge_withdrawal(
    state: &mut VaultState,
    caller: &Identity,
    amount: u64,
    now: i64,
) -> VaultResult<()> {
    if access::is_admin(caller, state) {
        return Ok(());
    }
    match state.epoch_limits.get_mut(caller) {
        Some(spending) => spending.charge(amount, now),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_or_duration_rejected() {
        assert_eq!(
            EpochSpending::new(0, 0, 10),
            Err(VaultError::InvalidEpochConfig {
                limit: 0,
                duration: 10
            })
        );
        assert!(EpochSpending::new(0, 10, 0).is_err());
        assert!(EpochSpending::new(0, 10, -5).is_err());
    }

    #[test]
    fn charges_accumulate_until_limit() {
        let mut e = EpochSpending::new(100, 1_000, 60).unwrap();
        e.charge(400, 110).unwrap();
        e.charge(600, 120).unwrap();
        assert_eq!(e.spent_amount, 1_000);

        let err = e.charge(1, 130).unwrap_err();
        assert_eq!(
            err,
            VaultError::EpochSpendingLimitReached {
                spent: 1_000,
                requested: 1,
                limit: 1_000
            }
        );
        assert_eq!(e.spent_amount, 1_000);
    }

    #[test]
    fn window_resets_at_epoch_end() {
        let mut e = EpochSpending::new(100, 1_000, 60).unwrap();
        e.charge(1_000, 100).unwrap();
        assert_eq!(e.remaining(159), 0);
        assert_eq!(e.remaining(160), 1_000);

        e.charge(300, 160).unwrap();
        assert_eq!(e.epoch_start, 160);
        assert_eq!(e.spent_amount, 300);
    }

    #[test]
    fn overflowing_charge_is_a_limit_breach() {
        let mut e = EpochSpending::new(0, u64::MAX, 60).unwrap();
        e.charge(u64::MAX, 1).unwrap();
        assert!(matches!(
            e.charge(1, 2),
            Err(VaultError::EpochSpendingLimitReached { .. })
        ));
    }

    #[test]
    fn admin_is_never_charged() {
        let admin = Identity::from_seed("admin");
        let mut state = VaultState::new(admin);
        state
            .epoch_limits
            .insert(admin, EpochSpending::new(0, 1, 60).unwrap());

        charge_withdrawal(&mut state, &admin, 1_000_000, 10).unwrap();
        assert_eq!(state.epoch_limits[&admin].spent_amount, 0);
    }

    #[test]
    fn set_requires_registered_payee() {
        let admin = Identity::from_seed("admin");
        let payee = Identity::from_seed("payee");
        let mut state = VaultState::new(admin);

        assert_eq!(
            set_limit(&mut state, payee, 10, 60, 0),
            Err(VaultError::PayeeNotFound(payee))
        );

        state.payees.push(payee);
        set_limit(&mut state, payee, 10, 60, 0).unwrap();
        assert_eq!(clear_limit(&mut state, &payee).unwrap().limit, 10);
        assert_eq!(
            clear_limit(&mut state, &payee),
            Err(VaultError::EpochLimitNotFound(payee))
        );
    }
}
