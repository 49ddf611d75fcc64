//! Errors raised by the vault program.
//!
//! Every rejection is synchronous and typed. A failed operation leaves the
//! vault state and every ledger balance exactly as it found them.

use payvault_protocol::{Identity, LedgerError};
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// A vault is already registered for this admin.
    #[error("vault already exists for admin {0}")]
    AlreadyExists(Identity),

    /// No vault is registered for this admin (never initialized, or closed).
    #[error("vault not found for admin {0}")]
    VaultNotFound(Identity),

    /// The caller is not the vault's admin.
    #[error("unauthorized: {caller} is not the vault admin")]
    UnauthorizedAdmin {
        /// Identity that attempted the operation.
        caller: Identity,
    },

    /// The caller is neither the admin nor a registered payee.
    #[error("unauthorized: {caller} is not an authorized payee")]
    UnauthorizedPayee {
        /// Identity that attempted the withdrawal.
        caller: Identity,
    },

    /// Amounts must be strictly positive.
    #[error("invalid amount: must be greater than zero")]
    InvalidAmount,

    /// The debit would take the vault below its minimum reserve.
    #[error(
        "insufficient funds: requested {requested}, available {available}, reserve {reserve}"
    )]
    InsufficientFunds {
        /// Current vault balance.
        available: u64,
        /// Amount the caller asked for.
        requested: u64,
        /// Balance the vault must keep while open.
        reserve: u64,
    },

    /// The payee registry is full.
    #[error("payee limit reached: at most {max} payees")]
    PayeeLimitReached {
        /// Configured capacity.
        max: usize,
    },

    #[error("payee already registered: {0}")]
    PayeeAlreadyExists(Identity),

    /// The identity cannot act as a payee here (it is the admin, or is not
    /// registered when a registered payee is required).
    #[error("invalid payee: {0}")]
    InvalidPayee(Identity),

    #[error("payee not found: {0}")]
    PayeeNotFound(Identity),

    #[error("invalid interval {0}: must be greater than zero")]
    InvalidInterval(i64),

    /// Schedules must start strictly in the future.
    #[error("invalid start time {start_time}: must be after {now}")]
    InvalidStartTime {
        /// Requested first eligible time.
        start_time: i64,
        /// Time the request was evaluated at.
        now: i64,
    },

    #[error("payee {0} already has a payout schedule")]
    ScheduleAlreadyExists(Identity),

    #[error("schedule limit reached: at most {max} schedules")]
    ScheduleLimitReached {
        /// Configured capacity.
        max: usize,
    },

    #[error("no payout schedule for {0}")]
    ScheduleNotFound(Identity),

    /// The schedule's next window has not opened yet.
    #[error("payout not claimable until {next_eligible_time} (now {now})")]
    PayoutTimeNotReached {
        /// Earliest time the next claim is allowed.
        next_eligible_time: i64,
        /// Time the claim was evaluated at.
        now: i64,
    },

    /// The withdrawal would push the payee past its per-epoch allowance.
    #[error("epoch spending limit reached: spent {spent}, requested {requested}, limit {limit}")]
    EpochSpendingLimitReached {
        /// Already withdrawn in the current epoch.
        spent: u64,
        /// Amount of the rejected withdrawal.
        requested: u64,
        /// Allowance per epoch.
        limit: u64,
    },

    #[error("invalid epoch config: limit {limit} and duration {duration} must be greater than zero")]
    InvalidEpochConfig {
        /// Requested allowance.
        limit: u64,
        /// Requested epoch length in seconds.
        duration: i64,
    },

    #[error("no epoch limit configured for {0}")]
    EpochLimitNotFound(Identity),

    /// Checked arithmetic failed.
    #[error("arithmetic overflow")]
    MathOverflow,

    /// The ledger refused a balance operation.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The vault store failed for a reason other than presence/absence.
    #[error("store error: {0}")]
    Store(String),
}

impl VaultError {
    /// Stable, low-cardinality name of the variant. Used as a metrics label
    /// and in API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::AlreadyExists(_) => "already_exists",
            VaultError::VaultNotFound(_) => "vault_not_found",
            VaultError::UnauthorizedAdmin { .. } => "unauthorized_admin",
            VaultError::UnauthorizedPayee { .. } => "unauthorized_payee",
            VaultError::InvalidAmount => "invalid_amount",
            VaultError::InsufficientFunds { .. } => "insufficient_funds",
            VaultError::PayeeLimitReached { .. } => "payee_limit_reached",
            VaultError::PayeeAlreadyExists(_) => "payee_already_exists",
            VaultError::InvalidPayee(_) => "invalid_payee",
            VaultError::PayeeNotFound(_) => "payee_not_found",
            VaultError::InvalidInterval(_) => "invalid_interval",
            VaultError::InvalidStartTime { .. } => "invalid_start_time",
            VaultError::ScheduleAlreadyExists(_) => "schedule_already_exists",
            VaultError::ScheduleLimitReached { .. } => "schedule_limit_reached",
            VaultError::ScheduleNotFound(_) => "schedule_not_found",
            VaultError::PayoutTimeNotReached { .. } => "payout_time_not_reached",
            VaultError::EpochSpendingLimitReached { .. } => "epoch_spending_limit_reached",
            VaultError::InvalidEpochConfig { .. } => "invalid_epoch_config",
            VaultError::EpochLimitNotFound(_) => "epoch_limit_not_found",
            VaultError::MathOverflow => "math_overflow",
            VaultError::Ledger(_) => "ledger",
            VaultError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(admin) => VaultError::VaultNotFound(admin),
            StoreError::AlreadyExists(admin) => VaultError::AlreadyExists(admin),
            StoreError::Backend(msg) => VaultError::Store(msg),
        }
    }
}

/// Convenience alias used throughout the vault program.
pub type VaultResult<T> = Result<T, VaultError>;
