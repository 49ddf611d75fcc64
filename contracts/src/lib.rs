// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PayVault Contracts
//!
//! The custodial vault program. An admin deposits and controls a pool of
//! funds, registers a bounded set of payees who may withdraw directly, and
//! schedules recurring, time-gated payouts that payees claim themselves.
//!
//! - **Access Control** — admin and payee role checks, evaluated fresh on
//!   every call.
//! - **Fund Custody** — deposits, withdrawals, and the minimum-reserve rule.
//! - **Payee Registry** — bounded, ordered add/remove of payee identities.
//! - **Payout Scheduler** — create, cancel, and claim recurring payouts.
//! - **Epoch Limits** — optional per-payee caps on ad-hoc withdrawals.
//!
//! [`VaultProgram`] ties them together over a [`Ledger`](payvault_protocol::Ledger),
//! a [`VaultStore`] implementing [`Settlement`] for that ledger, and a [`Clock`](payvault_protocol::Clock).
//!
//! ## Design Principles
//!
//! 1. All monetary and time arithmetic is checked. Wrapping arithmetic and
//!    money do not mix.
//! 2. Validate everything, then mutate. A rejected call changes nothing.
//! 3. Every persisted type is serializable (serde) for the wire and for
//!    storage.

pub mod access;
pub mod config;
pub mod custody;
pub mod epoch;
pub mod error;
pub mod program;
pub mod registry;
pub mod scheduler;
pub mod settlement;
pub mod state;
pub mod store;

pub use config::VaultConfig;
pub use epoch::EpochSpending;
pub use error::{VaultError, VaultResult};
pub use program::VaultProgram;
pub use scheduler::{Claim, ScheduleRequest};
pub use settlement::Settlement;
pub use state::{PayoutSchedule, VaultState};
pub use store::{MemoryVaultStore, SledVaultStore, StoreError, VaultStore};
