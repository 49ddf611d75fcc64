//! # Vault Store
//!
//! Keyed storage of [`VaultState`], one record per admin identity. The store
//! is where "one vault per admin" is enforced: [`VaultStore::create`] fails
//! if a record already exists, atomically.
//!
//! ## Implementations
//!
//! | Store               | Backing          | Create-once via              |
//! |---------------------|------------------|------------------------------|
//! | [`MemoryVaultStore`]| `HashMap`        | `Entry::Vacant`              |
//! | [`SledVaultStore`]  | sled `vaults` tree, bincode values | compare-and-swap on absent key |

use payvault_protocol::{Identity, LedgerDb};
use sled::Tree;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use thiserror::Error;

use crate::state::VaultState;

/// Name of the sled tree holding vault records.
pub const VAULTS_TREE: &str = "vaults";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no vault record for {0}")]
    NotFound(Identity),

    #[error("vault record already exists for {0}")]
    AlreadyExists(Identity),

    /// Storage or encoding failure.
    #[error("vault store backend: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent map from admin identity to [`VaultState`].
pub trait VaultStore {
    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyExists`] if `state.admin` already has one.
    fn create(&mut self, state: &VaultState) -> StoreResult<()>;

    /// Loads the record for `admin`.
    fn load(&self, admin: &Identity) -> StoreResult<VaultState>;

    /// Overwrites an existing record.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if there is nothing to overwrite.
    fn save(&mut self, state: &VaultState) -> StoreResult<()>;

    /// Removes and returns the record for `admin`.
    fn delete(&mut self, admin: &Identity) -> StoreResult<VaultState>;

    /// Number of stored vaults.
    fn len(&self) -> StoreResult<usize>;

    /// Every admin with a stored vault, in key order.
    fn admins(&self) -> StoreResult<Vec<Identity>>;
}

// ---------------------------------------------------------------------------
// MemoryVaultStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryVaultStore {
    vaults: HashMap<Identity, VaultState>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VaultStore for MemoryVaultStore {
    fn create(&mut self, state: &VaultState) -> StoreResult<()> {
        match self.vaults.entry(state.admin) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(state.admin)),
            Entry::Vacant(slot) => {
                slot.insert(state.clone());
                Ok(())
            }
        }
    }

    fn load(&self, admin: &Identity) -> StoreResult<VaultState> {
        self.vaults
            .get(admin)
            .cloned()
            .ok_or(StoreError::NotFound(*admin))
    }

    fn save(&mut self, state: &VaultState) -> StoreResult<()> {
        let slot = self
            .vaults
            .get_mut(&state.admin)
            .ok_or(StoreError::NotFound(state.admin))?;
        *slot = state.clone();
        Ok(())
    }

    fn delete(&mut self, admin: &Identity) -> StoreResult<VaultState> {
        self.vaults
            .remove(admin)
            .ok_or(StoreError::NotFound(*admin))
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.vaults.len())
    }

    fn admins(&self) -> StoreResult<Vec<Identity>> {
        let mut admins: Vec<Identity> = self.vaults.keys().copied().collect();
        admins.sort();
        Ok(admins)
    }
}

// ---------------------------------------------------------------------------
// SledVaultStore
// ---------------------------------------------------------------------------

/// Vault records in a sled tree, keyed by the admin's raw 32 bytes.
#[derive(Debug, Clone)]
pub struct SledVaultStore {
    tree: Tree,
}

impl SledVaultStore {
    /// Wraps an already-open tree.
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// Opens the `vaults` tree on the ledger's database, so balances and
    /// vault records share one data directory.
    pub fn open(db: &LedgerDb) -> StoreResult<Self> {
        let tree = db
            .open_tree(VAULTS_TREE)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self::new(tree))
    }

    pub(crate) fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.tree.flush()?;
        Ok(())
    }
}

impl VaultStore for SledVaultStore {
    fn create(&mut self, state: &VaultState) -> StoreResult<()> {
        let bytes = bincode::serialize(state)?;
        self.tree
            .compare_and_swap(state.admin.as_bytes(), None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::AlreadyExists(state.admin))
    }

    fn load(&self, admin: &Identity) -> StoreResult<VaultState> {
        let bytes = self
            .tree
            .get(admin.as_bytes())?
            .ok_or(StoreError::NotFound(*admin))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn save(&mut self, state: &VaultState) -> StoreResult<()> {
        if !self.tree.contains_key(state.admin.as_bytes())? {
            return Err(StoreError::NotFound(state.admin));
        }
        self.tree
            .insert(state.admin.as_bytes(), bincode::serialize(state)?)?;
        Ok(())
    }

    fn delete(&mut self, admin: &Identity) -> StoreResult<VaultState> {
        let bytes = self
            .tree
            .remove(admin.as_bytes())?
            .ok_or(StoreError::NotFound(*admin))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.tree.len())
    }

    fn admins(&self) -> StoreResult<Vec<Identity>> {
        self.tree
            .iter()
            .keys()
            .map(|key| {
                let key = key?;
                Identity::try_from_slice(&key).map_err(|e| StoreError::Backend(e.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: &str) -> VaultState {
        let mut state = VaultState::new(Identity::from_seed(seed));
        state.payees.push(Identity::from_seed("payee"));
        state
    }

    fn exercise(store: &mut impl VaultStore) {
        let state = sample("admin");
        let admin = state.admin;

        assert_eq!(store.load(&admin), Err(StoreError::NotFound(admin)));
        assert_eq!(store.save(&state), Err(StoreError::NotFound(admin)));

        store.create(&state).unwrap();
        assert_eq!(store.create(&state), Err(StoreError::AlreadyExists(admin)));
        assert_eq!(store.load(&admin).unwrap(), state);

        let mut updated = state.clone();
        updated.payees.clear();
        store.save(&updated).unwrap();
        assert_eq!(store.load(&admin).unwrap(), updated);

        store.create(&sample("other")).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert!(store.admins().unwrap().contains(&admin));

        assert_eq!(store.delete(&admin).unwrap(), updated);
        assert_eq!(store.delete(&admin), Err(StoreError::NotFound(admin)));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn memory_store_contract() {
        exercise(&mut MemoryVaultStore::new());
    }

    #[test]
    fn sled_store_contract() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut store = SledVaultStore::open(&db).unwrap();
        exercise(&mut store);
    }
}
