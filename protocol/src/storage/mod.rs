//! # Storage Module
//!
//! Persistent storage for PayVault ledgers, so balances survive a node
//! restart.
//!
//! ## Architecture
//!
//! ```text
//! db.rs — LedgerDb: sled-backed Ledger implementation
//! ```
//!
//! ## Design Decisions
//!
//! 1. **sled trees as keyspaces.** Balances live in `accounts`, ledger
//!    parameters in `metadata`. Higher layers (the vault store) open their
//!    own trees on the same `Db` through [`LedgerDb::open_tree`] so one data
//!    directory holds everything.
//!
//! 2. **Fixed-width big-endian values.** A balance is 8 bytes BE. Nothing to
//!    version, nothing to misparse.
//!
//! 3. **Transfers are sled transactions.** Both legs commit or neither does.
//!    The `tx_*` helpers let another tree join the same commit.

pub mod db;

pub use db::{tx_balance, tx_close, tx_create, tx_transfer, DbError, DbResult, LedgerDb};
