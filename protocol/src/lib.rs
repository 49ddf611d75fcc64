// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PayVault Protocol — Runtime Collaborators
//!
//! Everything a vault needs from the outside world, and nothing more. The
//! custody rules themselves live in `payvault-contracts`; this crate is the
//! ground they stand on.
//!
//! ## Architecture
//!
//! - **identity** — 32-byte principal identities. Who is asking.
//! - **clock** — Injected time sources. When they are asking.
//! - **ledger** — Account balances with a minimum-existence reserve. Where
//!   the money actually sits.
//! - **storage** — sled-backed persistence for ledger balances.
//! - **config** — Protocol constants and defaults.
//!
//! ## Design Philosophy
//!
//! 1. The ledger is a trait. The vault program never cares whether balances
//!    live in a `HashMap` or on disk.
//! 2. Time is never read from a global. Every operation gets its timestamp
//!    from a [`clock::Clock`] it was handed.
//! 3. All amounts are `u64` in the smallest unit. All arithmetic is checked.

pub mod clock;
pub mod config;
pub mod identity;
pub mod ledger;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{Identity, IdentityError};
pub use ledger::{AccountKey, Ledger, LedgerError, LedgerResult, MemoryLedger};
pub use storage::{DbError, LedgerDb};
