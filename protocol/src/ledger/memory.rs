//! In-memory ledger.
//!
//! A flat `HashMap<AccountKey, u64>`. No persistence, no locking: whoever
//! owns the `MemoryLedger` owns the serialization story.

use std::collections::HashMap;

use super::{AccountKey, Ledger, LedgerError, LedgerResult};
use crate::config::DEFAULT_MINIMUM_RESERVE;
use crate::identity::Identity;

/// `HashMap`-backed [`Ledger`].
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    accounts: HashMap<AccountKey, u64>,
    minimum_reserve: u64,
}

impl MemoryLedger {
    /// An empty ledger with [`DEFAULT_MINIMUM_RESERVE`].
    pub fn new() -> Self {
        Self::with_minimum_reserve(DEFAULT_MINIMUM_RESERVE)
    }

    /// An empty ledger with a custom reserve.
    pub fn with_minimum_reserve(minimum_reserve: u64) -> Self {
        Self {
            accounts: HashMap::new(),
            minimum_reserve,
        }
    }

    /// Credits an external actor's wallet out of thin air.
    ///
    /// Devnet faucet and test fixture; the vault program never calls this.
    pub fn airdrop(&mut self, identity: Identity, amount: u64) -> LedgerResult<u64> {
        self.credit(&AccountKey::Wallet(identity), amount)
    }

    /// Number of open accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if no accounts are open.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of every balance on the ledger.
    ///
    /// Transfers never change it; only airdrops do. Tests lean on that.
    pub fn total_supply(&self) -> u128 {
        self.accounts.values().map(|b| *b as u128).sum()
    }

    /// Iterates over `(account, balance)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&AccountKey, &u64)> {
        self.accounts.iter()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for MemoryLedger {
    fn minimum_reserve(&self) -> u64 {
        self.minimum_reserve
    }

    fn exists(&self, account: &AccountKey) -> LedgerResult<bool> {
        Ok(self.accounts.contains_key(account))
    }

    fn balance(&self, account: &AccountKey) -> LedgerResult<u64> {
        match self.accounts.get(account) {
            Some(balance) => Ok(*balance),
            None if account.is_implicit() => Ok(0),
            None => Err(LedgerError::AccountNotFound(*account)),
        }
    }

    fn create(&mut self, account: &AccountKey) -> LedgerResult<()> {
        if self.accounts.contains_key(account) {
            return Err(LedgerError::AccountExists(*account));
        }
        self.accounts.insert(*account, 0);
        Ok(())
    }

    fn credit(&mut self, account: &AccountKey, amount: u64) -> LedgerResult<u64> {
        if !account.is_implicit() && !self.accounts.contains_key(account) {
            return Err(LedgerError::AccountNotFound(*account));
        }
        let balance = self.accounts.entry(*account).or_insert(0);

        let updated = balance.checked_add(amount).ok_or(LedgerError::Overflow {
            account: *account,
            current: *balance,
            credit: amount,
        })?;
        *balance = updated;
        Ok(updated)
    }

    fn debit(&mut self, account: &AccountKey, amount: u64) -> LedgerResult<u64> {
        let Some(balance) = self.accounts.get_mut(account) else {
            if !account.is_implicit() {
                return Err(LedgerError::AccountNotFound(*account));
            }
            if amount > 0 {
                return Err(LedgerError::InsufficientFunds {
                    account: *account,
                    available: 0,
                    requested: amount,
                });
            }
            return Ok(0);
        };

        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account: *account,
                available: *balance,
                requested: amount,
            });
        }

        *balance -= amount;
        Ok(*balance)
    }

    fn close(&mut self, account: &AccountKey, beneficiary: &AccountKey) -> LedgerResult<u64> {
        let amount = *self
            .accounts
            .get(account)
            .ok_or(LedgerError::AccountNotFound(*account))?;

        // Credit first: if the beneficiary cannot take the funds, nothing moves.
        self.credit(beneficiary, amount)?;
        self.accounts.remove(account);
        Ok(amount)
    }

    fn transfer(&mut self, from: &AccountKey, to: &AccountKey, amount: u64) -> LedgerResult<()> {
        // Validate both legs before touching either.
        let available = self.balance(from)?;
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: *from,
                available,
                requested: amount,
            });
        }
        if from != to {
            let current = self.balance(to)?;
            if current.checked_add(amount).is_none() {
                return Err(LedgerError::Overflow {
                    account: *to,
                    current,
                    credit: amount,
                });
            }
        }

        self.debit(from, amount)?;
        self.credit(to, amount)?;
        Ok(())
    }
}
