//! # Payout Scheduler
//!
//! Recurring, time-gated payouts. The admin creates and cancels schedules;
//! the payee claims them.
//!
//! ## Lifecycle
//!
//! ```text
//!  schedule_payout        now >= next_eligible_time
//!  ──────────────> Active ─────────────────────────> Claimable
//!                    ^                                   │
//!                    └──── claim: next += interval ──────┘
//!
//!  cancel_payout (from either state) ──> Cancelled (entry removed)
//! ```
//!
//! A claim is bound to the schedule's key. Whether the claimer is still in
//! the payee registry does not matter, in either direction: a registered
//! payee without a schedule cannot claim, and a removed payee whose schedule
//! was never cancelled still can.

use payvault_protocol::Identity;

use crate::custody;
use crate::error::{VaultError, VaultResult};
use crate::state::{PayoutSchedule, VaultState};

/// Parameters of a new schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub payee: Identity,
    pub amount: u64,
    pub start_time: i64,
    pub interval: i64,
}

/// Outcome of a successful claim, staged but not yet paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    /// Amount to move from the vault to the payee.
    pub amount: u64,
    /// Vault balance after the payout.
    pub remaining_balance: u64,
    /// When the following window opens.
    pub next_eligible_time: i64,
}

/// Validates `request` against `state` and inserts the schedule.
///
/// Check order: payee registered, amount, interval, start time, duplicate,
/// capacity.
pub fn schedule_payout(
    state: &mut VaultState,
    request: ScheduleRequest,
    now: i64,
    max_schedules: usize,
) -> VaultResult<()> {
    let ScheduleRequest {
        payee,
        amount,
        start_time,
        interval,
    } = request;

    if !state.is_payee(&payee) {
        return Err(VaultError::InvalidPayee(payee));
    }
    custody::require_positive(amount)?;
    if interval <= 0 {
        return Err(VaultError::InvalidInterval(interval));
    }
    if start_time <= now {
        return Err(VaultError::InvalidStartTime { start_time, now });
    }
    if state.schedules.contains_key(&payee) {
        return Err(VaultError::ScheduleAlreadyExists(payee));
    }
    if state.schedules.len() >= max_schedules {
        return Err(VaultError::ScheduleLimitReached { max: max_schedules });
    }

    state.schedules.insert(
        payee,
        PayoutSchedule {
            payee,
            amount,
            next_eligible_time: start_time,
            interval,
        },
    );
    Ok(())
}

/// Removes the schedule bound to `payee` and returns it.
pub fn cancel_payout(state: &mut VaultState, payee: &Identity) -> VaultResult<PayoutSchedule> {
    state
        .schedules
        .remove(payee)
        .ok_or(VaultError::ScheduleNotFound(*payee))
}

/// Validates a claim by `caller` at `now` and advances its schedule in
/// `state`.
///
/// Check order: schedule exists, window open, reserve, time arithmetic.
pub fn prepare_claim(
    state: &mut VaultState,
    caller: &Identity,
    balance: u64,
    reserve: u64,
    now: i64,
) -> VaultResult<Claim> {
    let schedule = state
        .schedules
        .get_mut(caller)
        .ok_or(VaultError::ScheduleNotFound(*caller))?;

    if !schedule.is_claimable(now) {
        return Err(VaultError::PayoutTimeNotReached {
            next_eligible_time: schedule.next_eligible_time,
            now,
        });
    }

    let remaining_balance = custody::ensure_reserve(balance, schedule.amount, reserve)?;
    let next_eligible_time = schedule.advance()?;

    Ok(Claim {
        amount: schedule.amount,
        remaining_balance,
        next_eligible_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn setup() -> (VaultState, Identity) {
        let payee = Identity::from_seed("p1");
        let mut state = VaultState::new(Identity::from_seed("admin"));
        state.payees.push(payee);
        (state, payee)
    }

    fn request(payee: Identity) -> ScheduleRequest {
        ScheduleRequest {
            payee,
            amount: 100,
            start_time: NOW + 5,
            interval: 10,
        }
    }

    #[test]
    fn schedule_validation() {
        let (mut state, payee) = setup();
        let stranger = Identity::from_seed("stranger");

        assert_eq!(
            schedule_payout(&mut state, request(stranger), NOW, 10),
            Err(VaultError::InvalidPayee(stranger))
        );
        assert_eq!(
            schedule_payout(&mut state, ScheduleRequest { amount: 0, ..request(payee) }, NOW, 10),
            Err(VaultError::InvalidAmount)
        );
        assert_eq!(
            schedule_payout(&mut state, ScheduleRequest { interval: 0, ..request(payee) }, NOW, 10),
            Err(VaultError::InvalidInterval(0))
        );
        assert_eq!(
            schedule_payout(&mut state, ScheduleRequest { start_time: NOW, ..request(payee) }, NOW, 10),
            Err(VaultError::InvalidStartTime {
                start_time: NOW,
                now: NOW
            })
        );
        assert!(state.schedules.is_empty());

        schedule_payout(&mut state, request(payee), NOW, 10).unwrap();
        assert_eq!(
            schedule_payout(&mut state, request(payee), NOW, 10),
            Err(VaultError::ScheduleAlreadyExists(payee))
        );
        assert_eq!(state.schedule(&payee).unwrap().next_eligible_time, NOW + 5);
    }

    #[test]
    fn schedule_capacity_enforced() {
        let (mut state, payee) = setup();
        let other = Identity::from_seed("p2");
        state.payees.push(other);

        schedule_payout(&mut state, request(payee), NOW, 1).unwrap();
        assert_eq!(
            schedule_payout(&mut state, request(other), NOW, 1),
            Err(VaultError::ScheduleLimitReached { max: 1 })
        );
    }

    #[test]
    fn claim_advances_from_previous_window() {
        let (mut state, payee) = setup();
        schedule_payout(&mut state, request(payee), NOW, 10).unwrap();

        assert_eq!(
            prepare_claim(&mut state, &payee, 1_000, 0, NOW),
            Err(VaultError::PayoutTimeNotReached {
                next_eligible_time: NOW + 5,
                now: NOW
            })
        );

        // Claiming late still advances by exactly one interval.
        let claim = prepare_claim(&mut state, &payee, 1_000, 0, NOW + 8).unwrap();
        assert_eq!(
            claim,
            Claim {
                amount: 100,
                remaining_balance: 900,
                next_eligible_time: NOW + 15
            }
        );
        assert!(prepare_claim(&mut state, &payee, 900, 0, NOW + 8).is_err());
    }

    #[test]
    fn claim_respects_reserve() {
        let (mut state, payee) = setup();
        schedule_payout(&mut state, request(payee), NOW, 10).unwrap();

        assert!(matches!(
            prepare_claim(&mut state, &payee, 150, 100, NOW + 5),
            Err(VaultError::InsufficientFunds { .. })
        ));
        assert_eq!(state.schedule(&payee).unwrap().next_eligible_time, NOW + 5);
    }

    #[test]
    fn claim_is_bound_to_schedule_key_not_registry() {
        let (mut state, payee) = setup();
        schedule_payout(&mut state, request(payee), NOW, 10).unwrap();
        state.payees.clear();

        assert!(prepare_claim(&mut state, &payee, 1_000, 0, NOW + 5).is_ok());

        let registered = Identity::from_seed("p2");
        state.payees.push(registered);
        assert_eq!(
            prepare_claim(&mut state, &registered, 1_000, 0, NOW + 5),
            Err(VaultError::ScheduleNotFound(registered))
        );
    }

    #[test]
    fn cancel_removes_entry() {
        let (mut state, payee) = setup();
        schedule_payout(&mut state, request(payee), NOW, 10).unwrap();

        assert_eq!(cancel_payout(&mut state, &payee).unwrap().amount, 100);
        assert_eq!(
            cancel_payout(&mut state, &payee),
            Err(VaultError::ScheduleNotFound(payee))
        );
        assert_eq!(
            prepare_claim(&mut state, &payee, 1_000, 0, NOW + 5),
            Err(VaultError::ScheduleNotFound(payee))
        );
    }
}
