//! # Ledger — Where Balances Live
//!
//! The vault program never touches balances directly. It asks a [`Ledger`]
//! to create, credit, debit, and close accounts, and trusts the ledger to
//! keep its books straight.
//!
//! ## Account Model
//!
//! ```text
//! AccountKey::Wallet(id)  — an external actor's own funds
//! AccountKey::Vault(admin) — the fund-holding account of admin's vault
//! ```
//!
//! Wallet accounts spring into existence on first credit, the way a plain
//! transfer funds a fresh address on most chains. Vault accounts must be
//! created explicitly and are removed by [`Ledger::close`].
//!
//! ## Minimum Reserve
//!
//! Each ledger advertises a [`minimum_reserve`](Ledger::minimum_reserve):
//! the balance an open account is expected to retain. The ledger itself only
//! refuses to go negative; honouring the reserve on outflows is the caller's
//! job, because only the caller knows which debits are "spend" and which are
//! "close".
//!
//! ## Implementations
//!
//! - [`MemoryLedger`] — `HashMap`-backed, for tests and embedded use.
//! - [`crate::storage::LedgerDb`] — sled-backed, transfers run inside a
//!   single sled transaction.

pub mod memory;

pub use memory::MemoryLedger;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::identity::{Identity, IDENTITY_LENGTH};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The account does not exist (never created, or already closed).
    #[error("account not found: {0}")]
    AccountNotFound(AccountKey),

    /// Tried to create an account that is already open.
    #[error("account already exists: {0}")]
    AccountExists(AccountKey),

    /// The account cannot cover the requested debit.
    #[error("insufficient funds in {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// The account being debited.
        account: AccountKey,
        /// Its current balance.
        available: u64,
        /// The amount requested.
        requested: u64,
    },

    /// A credit would push the balance past `u64::MAX`.
    #[error("balance overflow in {account}: current {current}, credit {credit}")]
    Overflow {
        /// The account being credited.
        account: AccountKey,
        /// Balance before the failed credit.
        current: u64,
        /// The amount that overflowed.
        credit: u64,
    },

    /// The backing store failed.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Convenience alias used across the ledger API.
pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// AccountKey
// ---------------------------------------------------------------------------

/// Addresses a single ledger account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountKey {
    /// An external actor's own account.
    Wallet(Identity),
    /// The fund-holding account of the vault administered by this identity.
    Vault(Identity),
}

impl AccountKey {
    const WALLET_TAG: u8 = 0x01;
    const VAULT_TAG: u8 = 0x02;

    /// Length of [`to_storage_key`](Self::to_storage_key) output.
    pub const STORAGE_KEY_LENGTH: usize = 1 + IDENTITY_LENGTH;

    /// The identity this account belongs to.
    pub fn identity(&self) -> &Identity {
        match self {
            AccountKey::Wallet(id) | AccountKey::Vault(id) => id,
        }
    }

    /// Whether the account is created implicitly on first credit.
    pub fn is_implicit(&self) -> bool {
        matches!(self, AccountKey::Wallet(_))
    }

    /// Fixed-width key for ordered key-value stores: one tag byte followed by
    /// the 32 identity bytes.
    pub fn to_storage_key(&self) -> [u8; Self::STORAGE_KEY_LENGTH] {
        let (tag, id) = match self {
            AccountKey::Wallet(id) => (Self::WALLET_TAG, id),
            AccountKey::Vault(id) => (Self::VAULT_TAG, id),
        };
        let mut key = [0u8; Self::STORAGE_KEY_LENGTH];
        key[0] = tag;
        key[1..].copy_from_slice(id.as_bytes());
        key
    }

    /// Inverse of [`to_storage_key`](Self::to_storage_key).
    pub fn from_storage_key(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::STORAGE_KEY_LENGTH {
            return None;
        }
        let id = Identity::try_from_slice(&bytes[1..]).ok()?;
        match bytes[0] {
            Self::WALLET_TAG => Some(AccountKey::Wallet(id)),
            Self::VAULT_TAG => Some(AccountKey::Vault(id)),
            _ => None,
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKey::Wallet(id) => write!(f, "wallet:{id}"),
            AccountKey::Vault(id) => write!(f, "vault:{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Account storage with balance arithmetic.
///
/// Implementations must make each individual call atomic. [`transfer`]
/// has a default built from `debit` + `credit` with rollback; backends that
/// can do better (a real transaction) should override it.
///
/// [`transfer`]: Ledger::transfer
pub trait Ledger {
    /// Balance an open account is expected to retain after spending.
    fn minimum_reserve(&self) -> u64;

    /// Whether the account currently exists.
    fn exists(&self, account: &AccountKey) -> LedgerResult<bool>;

    /// Current balance. Implicit accounts that were never credited read as 0.
    fn balance(&self, account: &AccountKey) -> LedgerResult<u64>;

    /// Opens an empty account.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountExists`] if it is already open.
    fn create(&mut self, account: &AccountKey) -> LedgerResult<()>;

    /// Adds `amount`, returning the new balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] for a missing explicit account,
    /// [`LedgerError::Overflow`] past `u64::MAX`.
    fn credit(&mut self, account: &AccountKey, amount: u64) -> LedgerResult<u64>;

    /// Subtracts `amount`, returning the new balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] if missing,
    /// [`LedgerError::InsufficientFunds`] if the balance cannot cover it.
    fn debit(&mut self, account: &AccountKey, amount: u64) -> LedgerResult<u64>;

    /// Moves the full balance to `beneficiary` and removes the account.
    /// Returns the amount moved.
    fn close(&mut self, account: &AccountKey, beneficiary: &AccountKey) -> LedgerResult<u64>;

    /// Moves `amount` from one account to another, all or nothing.
    fn transfer(&mut self, from: &AccountKey, to: &AccountKey, amount: u64) -> LedgerResult<()> {
        self.debit(from, amount)?;
        if let Err(e) = self.credit(to, amount) {
            // Put the funds back; the debit just succeeded so this cannot overflow.
            self.credit(from, amount)?;
            return Err(e);
        }
        Ok(())
    }
}
