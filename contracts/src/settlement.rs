//! # Settlement
//!
//! Commits a ledger movement together with the vault record it belongs to.
//! Every operation that both moves funds and changes a [`VaultState`] goes
//! through a [`Settlement`], so a claim can never be paid without its
//! schedule advancing, and a withdrawal never lands without its epoch charge.
//!
//! | Store                | Ledger       | Commit                                         |
//! |----------------------|--------------|------------------------------------------------|
//! | [`MemoryVaultStore`] | any          | ledger step, then record write; undone on error |
//! | [`SledVaultStore`]   | [`LedgerDb`] | one sled transaction over `accounts` + `vaults` |
//!
//! The sequential path compensates a failed record write by reversing the
//! ledger step. It has nothing to survive a crash with, which is fine for an
//! in-memory store. The sled pairing commits both trees at once, so a
//! restart observes either the whole operation or none of it.

use payvault_protocol::storage::{tx_close, tx_create, tx_transfer};
use payvault_protocol::{AccountKey, Identity, Ledger, LedgerDb};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::{error, warn};

use crate::error::{VaultError, VaultResult};
use crate::state::VaultState;
use crate::store::{MemoryVaultStore, SledVaultStore, StoreError, VaultStore};

/// A [`VaultStore`] that can commit its records together with ledger
/// changes on `L`.
pub trait Settlement<L: Ledger>: VaultStore {
    /// Stores a new record and opens its empty vault account.
    ///
    /// # Errors
    ///
    /// [`VaultError::AlreadyExists`] if the admin has a record, otherwise the
    /// ledger's error for the account.
    fn open_vault(&mut self, ledger: &mut L, state: &VaultState) -> VaultResult<()>;

    /// Moves `amount` from `from` to `to` and overwrites the record with
    /// `state`.
    fn settle(
        &mut self,
        ledger: &mut L,
        state: &VaultState,
        from: &AccountKey,
        to: &AccountKey,
        amount: u64,
    ) -> VaultResult<()>;

    /// Deletes the record for `admin` and sweeps its vault account into
    /// `beneficiary`. Returns the amount swept.
    fn close_vault(
        &mut self,
        ledger: &mut L,
        admin: &Identity,
        beneficiary: &AccountKey,
    ) -> VaultResult<u64>;
}

// ---------------------------------------------------------------------------
// Sequential settlement
// ---------------------------------------------------------------------------

/// Record first, then account. Removes the record if the account cannot be
/// opened.
pub fn open_sequential<L, S>(store: &mut S, ledger: &mut L, state: &VaultState) -> VaultResult<()>
where
    L: Ledger,
    S: VaultStore + ?Sized,
{
    let admin = state.admin;
    store.create(state)?;
    if let Err(e) = ledger.create(&AccountKey::Vault(admin)) {
        warn!(vault = %admin, error = %e, "vault account creation failed, removing state");
        if let Err(undo) = store.delete(&admin) {
            error!(vault = %admin, error = %undo, "failed to remove orphaned vault state");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Transfer first, then record. Reverses the transfer if the record write
/// fails.
pub fn settle_sequential<L, S>(
    store: &mut S,
    ledger: &mut L,
    state: &VaultState,
    from: &AccountKey,
    to: &AccountKey,
    amount: u64,
) -> VaultResult<()>
where
    L: Ledger,
    S: VaultStore + ?Sized,
{
    ledger.transfer(from, to, amount)?;
    let Err(e) = store.save(state) else {
        return Ok(());
    };
    warn!(vault = %state.admin, error = %e, amount, "state write failed, reversing transfer");
    if let Err(undo) = ledger.transfer(to, from, amount) {
        error!(vault = %state.admin, error = %undo, amount, "transfer reversal failed");
    }
    Err(e.into())
}

/// Record removal first, then account close. Restores the record if the
/// close fails.
pub fn close_sequential<L, S>(
    store: &mut S,
    ledger: &mut L,
    admin: &Identity,
    beneficiary: &AccountKey,
) -> VaultResult<u64>
where
    L: Ledger,
    S: VaultStore + ?Sized,
{
    let removed = store.delete(admin)?;
    match ledger.close(&AccountKey::Vault(*admin), beneficiary) {
        Ok(amount) => Ok(amount),
        Err(e) => {
            warn!(vault = %admin, error = %e, "vault account close failed, restoring state");
            if let Err(undo) = store.create(&removed) {
                error!(vault = %admin, error = %undo, "failed to restore vault state");
            }
            Err(e.into())
        }
    }
}

impl<L: Ledger> Settlement<L> for MemoryVaultStore {
    fn open_vault(&mut self, ledger: &mut L, state: &VaultState) -> VaultResult<()> {
        open_sequential(self, ledger, state)
    }

    fn settle(
        &mut self,
        ledger: &mut L,
        state: &VaultState,
        from: &AccountKey,
        to: &AccountKey,
        amount: u64,
    ) -> VaultResult<()> {
        settle_sequential(self, ledger, state, from, to, amount)
    }

    fn close_vault(
        &mut self,
        ledger: &mut L,
        admin: &Identity,
        beneficiary: &AccountKey,
    ) -> VaultResult<u64> {
        close_sequential(self, ledger, admin, beneficiary)
    }
}

// ---------------------------------------------------------------------------
// Joint sled transactions
// ---------------------------------------------------------------------------

fn commit<T>(result: Result<T, TransactionError<VaultError>>) -> VaultResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::from(e).into(),
    })
}

impl Settlement<LedgerDb> for SledVaultStore {
    fn open_vault(&mut self, ledger: &mut LedgerDb, state: &VaultState) -> VaultResult<()> {
        let record = bincode::serialize(state).map_err(StoreError::from)?;
        let admin = state.admin;
        let account = AccountKey::Vault(admin);

        commit((ledger.accounts_tree(), self.tree()).transaction(|(accounts, vaults)| {
            if vaults.get(admin.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(
                    VaultError::AlreadyExists(admin),
                ));
            }
            tx_create::<VaultError>(accounts, &account)?;
            vaults.insert(&admin.as_bytes()[..], record.as_slice())?;
            Ok(())
        }))
    }

    fn settle(
        &mut self,
        ledger: &mut LedgerDb,
        state: &VaultState,
        from: &AccountKey,
        to: &AccountKey,
        amount: u64,
    ) -> VaultResult<()> {
        let record = bincode::serialize(state).map_err(StoreError::from)?;
        let admin = state.admin;
        let (from, to) = (*from, *to);

        commit((ledger.accounts_tree(), self.tree()).transaction(|(accounts, vaults)| {
            if vaults.get(admin.as_bytes())?.is_none() {
                return Err(ConflictableTransactionError::Abort(
                    VaultError::VaultNotFound(admin),
                ));
            }
            tx_transfer::<VaultError>(accounts, &from, &to, amount)?;
            vaults.insert(&admin.as_bytes()[..], record.as_slice())?;
            Ok(())
        }))
    }

    fn close_vault(
        &mut self,
        ledger: &mut LedgerDb,
        admin: &Identity,
        beneficiary: &AccountKey,
    ) -> VaultResult<u64> {
        let admin = *admin;
        let (account, beneficiary) = (AccountKey::Vault(admin), *beneficiary);

        commit((ledger.accounts_tree(), self.tree()).transaction(|(accounts, vaults)| {
            if vaults.remove(&admin.as_bytes()[..])?.is_none() {
                return Err(ConflictableTransactionError::Abort(
                    VaultError::VaultNotFound(admin),
                ));
            }
            tx_close::<VaultError>(accounts, &account, &beneficiary)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payvault_protocol::LedgerError;

    fn id(seed: &str) -> Identity {
        Identity::from_seed(seed)
    }

    fn sled_pair() -> (LedgerDb, SledVaultStore) {
        let db = LedgerDb::open_temporary().unwrap();
        let store = SledVaultStore::open(&db).unwrap();
        (db, store)
    }

    #[test]
    fn sled_open_is_all_or_nothing() {
        let (mut db, mut store) = sled_pair();
        let state = VaultState::new(id("admin"));

        // The account already exists, so the record must not be written.
        db.create(&AccountKey::Vault(id("admin"))).unwrap();
        assert_eq!(
            store.open_vault(&mut db, &state),
            Err(VaultError::Ledger(LedgerError::AccountExists(
                AccountKey::Vault(id("admin"))
            )))
        );
        assert_eq!(store.len().unwrap(), 0);

        let (mut db, mut store) = sled_pair();
        store.open_vault(&mut db, &state).unwrap();
        assert_eq!(
            store.open_vault(&mut db, &state),
            Err(VaultError::AlreadyExists(id("admin")))
        );
        assert_eq!(store.load(&id("admin")).unwrap(), state);
    }

    #[test]
    fn sled_settle_without_record_moves_nothing() {
        let (mut db, mut store) = sled_pair();
        let admin = id("admin");
        let (vault, wallet) = (AccountKey::Vault(admin), AccountKey::Wallet(id("p1")));
        let state = VaultState::new(admin);
        store.open_vault(&mut db, &state).unwrap();
        db.credit(&vault, 1_000).unwrap();

        // Record vanishes underneath: the transfer must roll back with it.
        store.delete(&admin).unwrap();
        assert_eq!(
            store.settle(&mut db, &state, &vault, &wallet, 400),
            Err(VaultError::VaultNotFound(admin))
        );
        assert_eq!(db.balance(&vault).unwrap(), 1_000);
        assert_eq!(db.balance(&wallet).unwrap(), 0);
    }

    #[test]
    fn sled_settle_rejected_transfer_keeps_record() {
        let (mut db, mut store) = sled_pair();
        let admin = id("admin");
        let vault = AccountKey::Vault(admin);
        let before = VaultState::new(admin);
        store.open_vault(&mut db, &before).unwrap();
        db.credit(&vault, 100).unwrap();

        let mut after = before.clone();
        after.payees.push(id("p1"));
        assert!(matches!(
            store.settle(&mut db, &after, &vault, &AccountKey::Wallet(id("p1")), 101),
            Err(VaultError::Ledger(LedgerError::InsufficientFunds { .. }))
        ));
        assert_eq!(store.load(&admin).unwrap(), before);

        store
            .settle(&mut db, &after, &vault, &AccountKey::Wallet(id("p1")), 100)
            .unwrap();
        assert_eq!(store.load(&admin).unwrap(), after);
        assert_eq!(db.balance(&vault).unwrap(), 0);
    }

    #[test]
    fn sled_close_failure_keeps_record() {
        let (mut db, mut store) = sled_pair();
        let admin = id("admin");
        let vault = AccountKey::Vault(admin);
        store.open_vault(&mut db, &VaultState::new(admin)).unwrap();
        db.credit(&vault, 10).unwrap();
        db.credit(&AccountKey::Wallet(admin), u64::MAX).unwrap();

        assert!(matches!(
            store.close_vault(&mut db, &admin, &AccountKey::Wallet(admin)),
            Err(VaultError::Ledger(LedgerError::Overflow { .. }))
        ));
        assert!(store.load(&admin).is_ok());
        assert_eq!(db.balance(&vault).unwrap(), 10);
    }

    #[test]
    fn memory_settle_reverses_on_missing_record() {
        let mut ledger = payvault_protocol::MemoryLedger::new();
        let mut store = MemoryVaultStore::new();
        let admin = id("admin");
        let (vault, wallet) = (AccountKey::Vault(admin), AccountKey::Wallet(id("p1")));
        store.open_vault(&mut ledger, &VaultState::new(admin)).unwrap();
        ledger.credit(&vault, 500).unwrap();

        store.delete(&admin).unwrap();
        assert_eq!(
            store.settle(&mut ledger, &VaultState::new(admin), &vault, &wallet, 200),
            Err(VaultError::VaultNotFound(admin))
        );
        assert_eq!(ledger.balance(&vault).unwrap(), 500);
        assert_eq!(ledger.balance(&wallet).unwrap(), 0);
    }
}
