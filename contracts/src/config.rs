//! Tunable limits for a [`VaultProgram`](crate::VaultProgram).

use payvault_protocol::config::{DEFAULT_MAX_PAYEES, DEFAULT_MAX_SCHEDULES, DEFAULT_MINIMUM_RESERVE};
use serde::{Deserialize, Serialize};

/// Per-program vault limits. Shared by every vault the program hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Capacity of each vault's payee registry.
    pub max_payees: usize,
    /// Capacity of each vault's schedule map.
    pub max_schedules: usize,
    /// Floor a vault balance must keep after any withdrawal or claim.
    ///
    /// The effective reserve is the larger of this and the ledger's own
    /// [`minimum_reserve`](payvault_protocol::Ledger::minimum_reserve).
    pub minimum_reserve: u64,
}

impl VaultConfig {
    /// Effective reserve given the ledger's own requirement.
    pub fn reserve_for(&self, ledger_reserve: u64) -> u64 {
        self.minimum_reserve.max(ledger_reserve)
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_payees: DEFAULT_MAX_PAYEES,
            max_schedules: DEFAULT_MAX_SCHEDULES,
            minimum_reserve: DEFAULT_MINIMUM_RESERVE,
        }
    }
}
