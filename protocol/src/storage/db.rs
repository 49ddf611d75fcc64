//! # LedgerDb — Persistent Ledger
//!
//! A [`Ledger`] over sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                         | Value              |
//! |------------|-----------------------------|--------------------|
//! | `accounts` | `AccountKey` (33B tagged)   | balance (8B BE)    |
//! | `metadata` | key (UTF-8)                 | value (bytes)      |
//!
//! ## Atomicity
//!
//! Single-account operations are one sled `insert`/`remove`. [`transfer`]
//! and [`close`] touch two accounts and run inside a sled transaction on the
//! `accounts` tree: either both balances change or neither does.
//!
//! The `tx_*` helpers expose the same account logic at transaction level, so
//! a caller can fold a balance change into a transaction that spans the
//! `accounts` tree and a tree of its own.
//!
//! [`transfer`]: Ledger::transfer
//! [`close`]: Ledger::close

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, IVec, Tree};
use std::path::Path;

use crate::config::DEFAULT_MINIMUM_RESERVE;
use crate::identity::Identity;
use crate::ledger::{AccountKey, Ledger, LedgerError, LedgerResult};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for LedgerError {
    fn from(e: DbError) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the configured minimum reserve.
const META_MINIMUM_RESERVE: &[u8] = b"minimum_reserve";

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn decode_balance(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization(format!("invalid balance length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

/// Reads a balance inside a transaction, applying the implicit-account rule.
///
/// A missing explicit account aborts with [`LedgerError::AccountNotFound`],
/// lifted into the caller's abort type.
pub fn tx_balance<E: From<LedgerError>>(
    tx: &TransactionalTree,
    account: &AccountKey,
) -> Result<Option<u64>, ConflictableTransactionError<E>> {
    match tx.get(account.to_storage_key())? {
        Some(bytes) => decode_balance(&bytes)
            .map(Some)
            .map_err(|e| abort(LedgerError::from(e))),
        None if account.is_implicit() => Ok(None),
        None => Err(abort(LedgerError::AccountNotFound(*account))),
    }
}

/// Opens an empty explicit account inside a transaction.
pub fn tx_create<E: From<LedgerError>>(
    tx: &TransactionalTree,
    account: &AccountKey,
) -> Result<(), ConflictableTransactionError<E>> {
    let key = account.to_storage_key();
    if tx.get(&key[..])?.is_some() {
        return Err(abort(LedgerError::AccountExists(*account)));
    }
    tx.insert(&key[..], &0u64.to_be_bytes()[..])?;
    Ok(())
}

/// Moves `amount` between two accounts inside a transaction.
pub fn tx_transfer<E: From<LedgerError>>(
    tx: &TransactionalTree,
    from: &AccountKey,
    to: &AccountKey,
    amount: u64,
) -> Result<(), ConflictableTransactionError<E>> {
    let available = tx_balance::<E>(tx, from)?.unwrap_or(0);
    if available < amount {
        return Err(abort(LedgerError::InsufficientFunds {
            account: *from,
            available,
            requested: amount,
        }));
    }
    if from == to {
        return Ok(());
    }
    let current = tx_balance::<E>(tx, to)?.unwrap_or(0);
    let credited = current.checked_add(amount).ok_or_else(|| {
        abort(LedgerError::Overflow {
            account: *to,
            current,
            credit: amount,
        })
    })?;

    tx.insert(&from.to_storage_key()[..], &(available - amount).to_be_bytes()[..])?;
    tx.insert(&to.to_storage_key()[..], &credited.to_be_bytes()[..])?;
    Ok(())
}

/// Sweeps an account into `beneficiary` and removes it, inside a
/// transaction. Returns the amount moved.
pub fn tx_close<E: From<LedgerError>>(
    tx: &TransactionalTree,
    account: &AccountKey,
    beneficiary: &AccountKey,
) -> Result<u64, ConflictableTransactionError<E>> {
    let amount = tx_balance::<E>(tx, account)?.unwrap_or(0);
    let current = tx_balance::<E>(tx, beneficiary)?.unwrap_or(0);
    let updated = current.checked_add(amount).ok_or_else(|| {
        abort(LedgerError::Overflow {
            account: *beneficiary,
            current,
            credit: amount,
        })
    })?;

    tx.remove(&account.to_storage_key()[..])?;
    tx.insert(&beneficiary.to_storage_key()[..], &updated.to_be_bytes()[..])?;
    Ok(amount)
}

fn abort<E: From<LedgerError>>(e: LedgerError) -> ConflictableTransactionError<E> {
    ConflictableTransactionError::Abort(E::from(e))
}

fn unwrap_tx<T>(result: Result<T, TransactionError<LedgerError>>) -> LedgerResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => LedgerError::Storage(e.to_string()),
    })
}

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent ledger backed by sled.
///
/// Cheap to clone; clones share the same database handle.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    /// The underlying sled database handle.
    db: Db,
    /// Balances keyed by tagged account key.
    accounts: Tree,
    /// Ledger parameters.
    metadata: Tree,
    /// Cached copy of the persisted reserve.
    minimum_reserve: u64,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    ///
    /// A fresh database is stamped with [`DEFAULT_MINIMUM_RESERVE`]; an
    /// existing one keeps whatever reserve it was created with.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    ///
    /// Ideal for unit tests — no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    /// Internal constructor: opens named trees from an existing sled `Db`.
    fn from_db(db: Db) -> DbResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let metadata = db.open_tree("metadata")?;

        let minimum_reserve = match metadata.get(META_MINIMUM_RESERVE)? {
            Some(bytes) => decode_balance(&bytes)?,
            None => {
                metadata.insert(META_MINIMUM_RESERVE, &DEFAULT_MINIMUM_RESERVE.to_be_bytes()[..])?;
                DEFAULT_MINIMUM_RESERVE
            }
        };

        tracing::debug!(
            accounts = accounts.len(),
            minimum_reserve,
            "ledger database opened"
        );
        Ok(Self {
            db,
            accounts,
            metadata,
            minimum_reserve,
        })
    }

    /// Persist a new minimum reserve.
    pub fn set_minimum_reserve(&mut self, reserve: u64) -> DbResult<()> {
        self.metadata
            .insert(META_MINIMUM_RESERVE, &reserve.to_be_bytes()[..])?;
        if reserve != self.minimum_reserve {
            tracing::info!(from = self.minimum_reserve, to = reserve, "minimum reserve changed");
        }
        self.minimum_reserve = reserve;
        Ok(())
    }

    /// The balances tree.
    ///
    /// Higher layers that must commit a balance change together with their
    /// own records run a multi-tree transaction over this tree and theirs,
    /// using [`tx_transfer`], [`tx_create`] and [`tx_close`].
    pub fn accounts_tree(&self) -> &Tree {
        &self.accounts
    }

    /// Open a named sled tree from the underlying database.
    ///
    /// Used by the vault store so vault records and balances share one data
    /// directory. The tree is created if it doesn't exist.
    pub fn open_tree(&self, name: &str) -> DbResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    /// Credits an external actor's wallet out of thin air. Devnet faucet.
    pub fn airdrop(&mut self, identity: Identity, amount: u64) -> LedgerResult<u64> {
        self.credit(&AccountKey::Wallet(identity), amount)
    }

    /// All `(account, balance)` pairs in key order.
    pub fn accounts(&self) -> DbResult<Vec<(AccountKey, u64)>> {
        let mut out = Vec::with_capacity(self.accounts.len());
        for entry in self.accounts.iter() {
            let (key, value) = entry?;
            let account = AccountKey::from_storage_key(&key)
                .ok_or_else(|| DbError::Serialization("invalid account key".to_string()))?;
            out.push((account, decode_balance(&value)?));
        }
        Ok(out)
    }

    /// Return the number of open accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn read(&self, account: &AccountKey) -> LedgerResult<Option<u64>> {
        match self.accounts.get(account.to_storage_key()).map_err(DbError::from)? {
            Some(bytes) => Ok(Some(decode_balance(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, account: &AccountKey, balance: u64) -> LedgerResult<()> {
        self.accounts
            .insert(account.to_storage_key(), IVec::from(&balance.to_be_bytes()[..]))
            .map_err(DbError::from)?;
        Ok(())
    }
}

impl Ledger for LedgerDb {
    fn minimum_reserve(&self) -> u64 {
        self.minimum_reserve
    }

    fn exists(&self, account: &AccountKey) -> LedgerResult<bool> {
        Ok(self
            .accounts
            .contains_key(account.to_storage_key())
            .map_err(DbError::from)?)
    }

    fn balance(&self, account: &AccountKey) -> LedgerResult<u64> {
        match self.read(account)? {
            Some(balance) => Ok(balance),
            None if account.is_implicit() => Ok(0),
            None => Err(LedgerError::AccountNotFound(*account)),
        }
    }

    fn create(&mut self, account: &AccountKey) -> LedgerResult<()> {
        let zero = IVec::from(&0u64.to_be_bytes()[..]);
        let swapped = self
            .accounts
            .compare_and_swap(account.to_storage_key(), None as Option<&[u8]>, Some(zero))
            .map_err(DbError::from)?;
        swapped.map_err(|_| LedgerError::AccountExists(*account))
    }

    fn credit(&mut self, account: &AccountKey, amount: u64) -> LedgerResult<u64> {
        let current = match self.read(account)? {
            Some(balance) => balance,
            None if account.is_implicit() => 0,
            None => return Err(LedgerError::AccountNotFound(*account)),
        };
        let updated = current.checked_add(amount).ok_or(LedgerError::Overflow {
            account: *account,
            current,
            credit: amount,
        })?;
        self.write(account, updated)?;
        Ok(updated)
    }

    fn debit(&mut self, account: &AccountKey, amount: u64) -> LedgerResult<u64> {
        let current = self.balance(account)?;
        if current < amount {
            return Err(LedgerError::InsufficientFunds {
                account: *account,
                available: current,
                requested: amount,
            });
        }
        let updated = current - amount;
        if updated > 0 || self.read(account)?.is_some() {
            self.write(account, updated)?;
        }
        Ok(updated)
    }

    fn close(&mut self, account: &AccountKey, beneficiary: &AccountKey) -> LedgerResult<u64> {
        let (account, beneficiary) = (*account, *beneficiary);
        unwrap_tx(
            self.accounts
                .transaction(move |tx| tx_close::<LedgerError>(tx, &account, &beneficiary)),
        )
    }

    fn transfer(&mut self, from: &AccountKey, to: &AccountKey, amount: u64) -> LedgerResult<()> {
        let (from, to) = (*from, *to);
        unwrap_tx(
            self.accounts
                .transaction(move |tx| tx_transfer::<LedgerError>(tx, &from, &to, amount)),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::from_seed("alice")
    }

    #[test]
    fn open_temporary_database() {
        let db = LedgerDb::open_temporary().expect("should create temp db");
        assert_eq!(db.account_count(), 0);
        assert_eq!(db.minimum_reserve(), DEFAULT_MINIMUM_RESERVE);
    }

    #[test]
    fn balances_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut db = LedgerDb::open(dir.path()).expect("should open db");
            db.airdrop(alice(), 7_000).unwrap();
            db.set_minimum_reserve(1_234).unwrap();
            db.flush().unwrap();
        }

        let db = LedgerDb::open(dir.path()).expect("should reopen db");
        assert_eq!(db.balance(&AccountKey::Wallet(alice())).unwrap(), 7_000);
        assert_eq!(db.minimum_reserve(), 1_234);
    }

    #[test]
    fn create_is_once_only() {
        let mut db = LedgerDb::open_temporary().unwrap();
        let vault = AccountKey::Vault(alice());

        db.create(&vault).unwrap();
        assert_eq!(db.create(&vault), Err(LedgerError::AccountExists(vault)));
        assert_eq!(db.balance(&vault).unwrap(), 0);
    }

    #[test]
    fn transfer_is_atomic() {
        let mut db = LedgerDb::open_temporary().unwrap();
        let vault = AccountKey::Vault(alice());
        db.airdrop(alice(), 100).unwrap();

        // Destination missing: the debit leg must not land.
        assert_eq!(
            db.transfer(&AccountKey::Wallet(alice()), &vault, 40),
            Err(LedgerError::AccountNotFound(vault))
        );
        assert_eq!(db.balance(&AccountKey::Wallet(alice())).unwrap(), 100);

        db.create(&vault).unwrap();
        db.transfer(&AccountKey::Wallet(alice()), &vault, 40).unwrap();
        assert_eq!(db.balance(&AccountKey::Wallet(alice())).unwrap(), 60);
        assert_eq!(db.balance(&vault).unwrap(), 40);
    }

    #[test]
    fn close_removes_account() {
        let mut db = LedgerDb::open_temporary().unwrap();
        let vault = AccountKey::Vault(alice());
        db.create(&vault).unwrap();
        db.credit(&vault, 900).unwrap();

        assert_eq!(db.close(&vault, &AccountKey::Wallet(alice())).unwrap(), 900);
        assert!(!db.exists(&vault).unwrap());
        assert_eq!(db.balance(&AccountKey::Wallet(alice())).unwrap(), 900);
    }

    #[test]
    fn abort_in_joint_transaction_discards_transfer() {
        use sled::Transactional;

        let mut db = LedgerDb::open_temporary().unwrap();
        let records = db.open_tree("records").unwrap();
        let (wallet, vault) = (AccountKey::Wallet(alice()), AccountKey::Vault(alice()));
        db.airdrop(alice(), 100).unwrap();
        db.create(&vault).unwrap();

        let result: Result<(), TransactionError<LedgerError>> = (db.accounts_tree(), &records)
            .transaction(|(accounts, records)| {
                tx_transfer::<LedgerError>(accounts, &wallet, &vault, 60)?;
                records.insert(&b"note"[..], &b"paid"[..])?;
                Err(ConflictableTransactionError::Abort(LedgerError::Storage(
                    "rejected".into(),
                )))
            });

        assert!(matches!(result, Err(TransactionError::Abort(_))));
        assert_eq!(db.balance(&wallet).unwrap(), 100);
        assert_eq!(db.balance(&vault).unwrap(), 0);
        assert!(records.get(b"note").unwrap().is_none());

        let committed: Result<(), TransactionError<LedgerError>> = (db.accounts_tree(), &records)
            .transaction(|(accounts, records)| {
                tx_transfer::<LedgerError>(accounts, &wallet, &vault, 60)?;
                records.insert(&b"note"[..], &b"paid"[..])?;
                Ok(())
            });
        committed.unwrap();
        assert_eq!(db.balance(&vault).unwrap(), 60);
        assert!(records.get(b"note").unwrap().is_some());
    }

    #[test]
    fn accounts_listing_decodes_keys() {
        let mut db = LedgerDb::open_temporary().unwrap();
        db.airdrop(alice(), 5).unwrap();
        db.create(&AccountKey::Vault(alice())).unwrap();

        let listed = db.accounts().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&(AccountKey::Wallet(alice()), 5)));
        assert!(listed.contains(&(AccountKey::Vault(alice()), 0)));
    }
}
