//! # Protocol Configuration & Constants
//!
//! Every magic number in PayVault lives here. Vault-level knobs that an
//! operator may tune are collected in `payvault_contracts::VaultConfig`;
//! the defaults for those knobs are defined below so the node, the
//! contracts crate, and the tests all agree on them.

// ---------------------------------------------------------------------------
// Vault Limits
// ---------------------------------------------------------------------------

/// Default maximum number of payees a single vault may register.
pub const DEFAULT_MAX_PAYEES: usize = 10;

/// Default maximum number of outstanding payout schedules per vault.
///
/// Schedules are keyed by payee and may outlive the payee's registration,
/// so the schedule map carries its own bound.
pub const DEFAULT_MAX_SCHEDULES: usize = 10;

// ---------------------------------------------------------------------------
// Ledger Parameters
// ---------------------------------------------------------------------------

/// Default minimum balance an open ledger account must retain after a debit.
///
/// Matches the rent-exempt minimum of a zero-data account on the reference
/// chain, in its smallest unit.
pub const DEFAULT_MINIMUM_RESERVE: u64 = 890_880;

/// Smallest units per whole native coin. Display only; the protocol never divides.
pub const UNITS_PER_COIN: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default JSON-RPC / REST API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The protocol version string, reported by the node's status endpoint.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Formats an amount in smallest units as whole coins with nine decimals.
///
/// Used for log lines only.
pub fn format_units(amount: u64) -> String {
    format!(
        "{}.{:09}",
        amount / UNITS_PER_COIN,
        amount % UNITS_PER_COIN
    )
}
