//! # Vault Program
//!
//! The dispatcher every external call goes through. Each operation:
//!
//! 1. resolves the vault by its admin identity (fails with `VaultNotFound`),
//! 2. reads the clock once,
//! 3. runs the role and validation checks on a staged copy of the state,
//! 4. hands the staged state and at most one ledger transfer to the
//!    store's [`Settlement`], which commits them together.
//!
//! A rejected operation therefore leaves the store and the ledger exactly
//! as they were.
//!
//! The program holds no locks. Hosts that share it across threads wrap it
//! in a mutex (the node uses `parking_lot::Mutex`).

use payvault_protocol::config::format_units;
use payvault_protocol::{AccountKey, Clock, Identity, Ledger};
use tracing::{debug, info};

use crate::access;
use crate::config::VaultConfig;
use crate::custody;
use crate::epoch;
use crate::error::VaultResult;
use crate::registry;
use crate::scheduler::{self, Claim, ScheduleRequest};
use crate::settlement::Settlement;
use crate::state::VaultState;

/// Hosts any number of vaults over one ledger, one store, and one clock.
#[derive(Debug)]
pub struct VaultProgram<L, S, C> {
    ledger: L,
    store: S,
    clock: C,
    config: VaultConfig,
}

impl<L: Ledger, S: Settlement<L>, C: Clock> VaultProgram<L, S, C> {
    /// Creates a program with [`VaultConfig::default`].
    pub fn new(ledger: L, store: S, clock: C) -> Self {
        Self::with_config(ledger, store, clock, VaultConfig::default())
    }

    pub fn with_config(ledger: L, store: S, clock: C, config: VaultConfig) -> Self {
        Self {
            ledger,
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for funding external wallets. Never use it to
    /// touch a vault account.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Balance floor enforced on every debit of an open vault.
    pub fn reserve(&self) -> u64 {
        self.config.reserve_for(self.ledger.minimum_reserve())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Creates the vault state and an empty vault account for `admin`.
    ///
    /// # Errors
    ///
    /// [`VaultError::AlreadyExists`](crate::VaultError::AlreadyExists) if
    /// `admin` already has a vault.
    pub fn initialize(&mut self, admin: &Identity) -> VaultResult<()> {
        debug!(vault = %admin, "initialize requested");

        self.store
            .open_vault(&mut self.ledger, &VaultState::new(*admin))?;

        info!(vault = %admin, "vault initialized");
        Ok(())
    }

    /// Moves the whole vault balance to the admin and deletes the vault.
    /// Returns the amount paid out.
    pub fn close(&mut self, vault: &Identity, caller: &Identity) -> VaultResult<u64> {
        debug!(vault = %vault, caller = %caller, "close requested");

        let state = self.store.load(vault)?;
        access::require_admin(caller, &state)?;

        let amount = self
            .store
            .close_vault(&mut self.ledger, vault, &AccountKey::Wallet(*caller))?;

        info!(vault = %vault, amount, coins = %format_units(amount), "vault closed");
        Ok(amount)
    }

    // -----------------------------------------------------------------------
    // Custody
    // -----------------------------------------------------------------------

    /// Moves `amount` from the caller's wallet into the vault. Anyone may
    /// deposit. Returns the new vault balance.
    pub fn deposit(&mut self, vault: &Identity, caller: &Identity, amount: u64) -> VaultResult<u64> {
        debug!(vault = %vault, caller = %caller, amount, "deposit requested");

        self.store.load(vault)?;
        custody::require_positive(amount)?;

        let account = AccountKey::Vault(*vault);
        self.ledger
            .transfer(&AccountKey::Wallet(*caller), &account, amount)?;
        let balance = self.ledger.balance(&account)?;

        info!(vault = %vault, caller = %caller, amount, balance, "deposit");
        Ok(balance)
    }

    /// Ad-hoc withdrawal by the admin or a registered payee. Returns the new
    /// vault balance.
    pub fn withdraw(&mut self, vault: &Identity, caller: &Identity, amount: u64) -> VaultResult<u64> {
        debug!(vault = %vault, caller = %caller, amount, "withdraw requested");

        let state = self.store.load(vault)?;
        let now = self.clock.now();
        let account = AccountKey::Vault(*vault);
        let balance = self.ledger.balance(&account)?;

        let mut staged = state.clone();
        let remaining = custody::authorize_withdrawal(
            &mut staged,
            caller,
            amount,
            balance,
            self.reserve(),
            now,
        )?;

        let wallet = AccountKey::Wallet(*caller);
        if staged != state {
            self.store
                .settle(&mut self.ledger, &staged, &account, &wallet, amount)?;
        } else {
            self.ledger.transfer(&account, &wallet, amount)?;
        }

        info!(vault = %vault, caller = %caller, amount, balance = remaining, "withdraw");
        Ok(remaining)
    }

    // -----------------------------------------------------------------------
    // Payee registry
    // -----------------------------------------------------------------------

    pub fn add_payee(&mut self, vault: &Identity, caller: &Identity, payee: &Identity) -> VaultResult<()> {
        self.mutate(vault, caller, "add_payee", |state, config, _| {
            registry::add_payee(state, *payee, config.max_payees)
        })?;
        info!(vault = %vault, payee = %payee, "payee added");
        Ok(())
    }

    pub fn remove_payee(&mut self, vault: &Identity, caller: &Identity, payee: &Identity) -> VaultResult<()> {
        self.mutate(vault, caller, "remove_payee", |state, _, _| {
            registry::remove_payee(state, payee)
        })?;
        info!(vault = %vault, payee = %payee, "payee removed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Payout scheduler
    // -----------------------------------------------------------------------

    /// Creates a recurring payout for a registered payee, first claimable at
    /// `request.start_time`.
    pub fn schedule_payout(
        &mut self,
        vault: &Identity,
        caller: &Identity,
        request: ScheduleRequest,
    ) -> VaultResult<()> {
        self.mutate(vault, caller, "schedule_payout", |state, config, now| {
            scheduler::schedule_payout(state, request, now, config.max_schedules)
        })?;
        info!(
            vault = %vault,
            payee = %request.payee,
            amount = request.amount,
            start_time = request.start_time,
            interval = request.interval,
            "payout scheduled"
        );
        Ok(())
    }

    pub fn cancel_payout(&mut self, vault: &Identity, caller: &Identity, payee: &Identity) -> VaultResult<()> {
        self.mutate(vault, caller, "cancel_payout", |state, _, _| {
            scheduler::cancel_payout(state, payee).map(|_| ())
        })?;
        info!(vault = %vault, payee = %payee, "payout cancelled");
        Ok(())
    }

    /// Pays the caller one window of their schedule and advances it.
    pub fn claim_payout(&mut self, vault: &Identity, caller: &Identity) -> VaultResult<Claim> {
        debug!(vault = %vault, caller = %caller, "claim requested");

        let state = self.store.load(vault)?;
        let now = self.clock.now();
        let account = AccountKey::Vault(*vault);
        let balance = self.ledger.balance(&account)?;

        let mut staged = state;
        let claim = scheduler::prepare_claim(&mut staged, caller, balance, self.reserve(), now)?;

        let wallet = AccountKey::Wallet(*caller);
        self.store
            .settle(&mut self.ledger, &staged, &account, &wallet, claim.amount)?;

        info!(
            vault = %vault,
            payee = %caller,
            amount = claim.amount,
            next_eligible_time = claim.next_eligible_time,
            "payout claimed"
        );
        Ok(claim)
    }

    // -----------------------------------------------------------------------
    // Epoch limits
    // -----------------------------------------------------------------------

    pub fn set_epoch_limit(
        &mut self,
        vault: &Identity,
        caller: &Identity,
        payee: &Identity,
        limit: u64,
        duration: i64,
    ) -> VaultResult<()> {
        self.mutate(vault, caller, "set_epoch_limit", |state, _, now| {
            epoch::set_limit(state, *payee, limit, duration, now)
        })?;
        info!(vault = %vault, payee = %payee, limit, duration, "epoch limit set");
        Ok(())
    }

    pub fn clear_epoch_limit(&mut self, vault: &Identity, caller: &Identity, payee: &Identity) -> VaultResult<()> {
        self.mutate(vault, caller, "clear_epoch_limit", |state, _, _| {
            epoch::clear_limit(state, payee).map(|_| ())
        })?;
        info!(vault = %vault, payee = %payee, "epoch limit cleared");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn vault_state(&self, vault: &Identity) -> VaultResult<VaultState> {
        Ok(self.store.load(vault)?)
    }

    pub fn vault_balance(&self, vault: &Identity) -> VaultResult<u64> {
        self.store.load(vault)?;
        Ok(self.ledger.balance(&AccountKey::Vault(*vault))?)
    }

    /// Number of open vaults.
    pub fn vault_count(&self) -> VaultResult<usize> {
        Ok(self.store.len()?)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Admin-only state change with no fund movement.
    fn mutate<F>(&mut self, vault: &Identity, caller: &Identity, operation: &'static str, apply: F) -> VaultResult<()>
    where
        F: FnOnce(&mut VaultState, &VaultConfig, i64) -> VaultResult<()>,
    {
        debug!(vault = %vault, caller = %caller, operation, "requested");

        let mut staged = self.store.load(vault)?;
        access::require_admin(caller, &staged)?;
        let now = self.clock.now();
        apply(&mut staged, &self.config, now)?;
        self.store.save(&staged)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VaultError;
    use crate::settlement::{close_sequential, open_sequential, settle_sequential};
    use crate::store::{MemoryVaultStore, StoreError, StoreResult, VaultStore};
    use payvault_protocol::{ManualClock, MemoryLedger};

    const NOW: i64 = 1_700_000_000;

    fn id(seed: &str) -> Identity {
        Identity::from_seed(seed)
    }

    fn program() -> VaultProgram<MemoryLedger, MemoryVaultStore, ManualClock> {
        let config = VaultConfig {
            minimum_reserve: 0,
            ..VaultConfig::default()
        };
        let mut program = VaultProgram::with_config(
            MemoryLedger::with_minimum_reserve(1_000),
            MemoryVaultStore::new(),
            ManualClock::new(NOW),
            config,
        );
        program.ledger_mut().airdrop(id("admin"), 1_000_000).unwrap();
        program.initialize(&id("admin")).unwrap();
        program
    }

    #[test]
    fn initialize_once_per_admin() {
        let mut p = program();
        assert_eq!(
            p.initialize(&id("admin")),
            Err(VaultError::AlreadyExists(id("admin")))
        );
        assert_eq!(p.vault_balance(&id("admin")).unwrap(), 0);
        assert_eq!(p.vault_count().unwrap(), 1);
    }

    #[test]
    fn reserve_uses_stricter_of_config_and_ledger() {
        let p = program();
        assert_eq!(p.reserve(), 1_000);
    }

    #[test]
    fn deposit_requires_vault_and_amount() {
        let mut p = program();
        assert_eq!(
            p.deposit(&id("nobody"), &id("admin"), 10),
            Err(VaultError::VaultNotFound(id("nobody")))
        );
        assert_eq!(
            p.deposit(&id("admin"), &id("admin"), 0),
            Err(VaultError::InvalidAmount)
        );
        assert_eq!(p.deposit(&id("admin"), &id("admin"), 5_000).unwrap(), 5_000);
    }

    #[test]
    fn deposit_ledger_failure_surfaces_verbatim() {
        let mut p = program();
        let err = p.deposit(&id("admin"), &id("broke"), 10).unwrap_err();
        assert!(matches!(
            err,
            VaultError::Ledger(payvault_protocol::LedgerError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn withdraw_keeps_reserve() {
        let mut p = program();
        p.deposit(&id("admin"), &id("admin"), 5_000).unwrap();

        assert!(matches!(
            p.withdraw(&id("admin"), &id("admin"), 4_001),
            Err(VaultError::InsufficientFunds { reserve: 1_000, .. })
        ));
        assert_eq!(p.withdraw(&id("admin"), &id("admin"), 4_000).unwrap(), 1_000);
    }

    #[test]
    fn admin_operations_reject_other_callers() {
        let mut p = program();
        let intruder = id("intruder");
        let expected = Err(VaultError::UnauthorizedAdmin { caller: intruder });

        assert_eq!(p.add_payee(&id("admin"), &intruder, &id("p1")), expected);
        assert_eq!(p.remove_payee(&id("admin"), &intruder, &id("p1")), expected);
        assert_eq!(p.cancel_payout(&id("admin"), &intruder, &id("p1")), expected);
        assert_eq!(p.set_epoch_limit(&id("admin"), &intruder, &id("p1"), 1, 1), expected);
        assert_eq!(p.clear_epoch_limit(&id("admin"), &intruder, &id("p1")), expected);
        assert_eq!(
            p.close(&id("admin"), &intruder),
            Err(VaultError::UnauthorizedAdmin { caller: intruder })
        );
    }

    #[test]
    fn claim_pays_and_advances() {
        let mut p = program();
        p.deposit(&id("admin"), &id("admin"), 10_000).unwrap();
        p.add_payee(&id("admin"), &id("admin"), &id("p1")).unwrap();
        p.schedule_payout(
            &id("admin"),
            &id("admin"),
            ScheduleRequest {
                payee: id("p1"),
                amount: 500,
                start_time: NOW + 5,
                interval: 10,
            },
        )
        .unwrap();

        p.clock().set(NOW + 5);
        let claim = p.claim_payout(&id("admin"), &id("p1")).unwrap();
        assert_eq!(claim.next_eligible_time, NOW + 15);
        assert_eq!(p.vault_balance(&id("admin")).unwrap(), 9_500);
        assert_eq!(
            p.ledger().balance(&AccountKey::Wallet(id("p1"))).unwrap(),
            500
        );
    }

    #[test]
    fn close_pays_admin_and_forgets_vault() {
        let mut p = program();
        p.deposit(&id("admin"), &id("admin"), 10_000).unwrap();
        assert_eq!(p.close(&id("admin"), &id("admin")).unwrap(), 10_000);

        assert_eq!(
            p.vault_state(&id("admin")),
            Err(VaultError::VaultNotFound(id("admin")))
        );
        assert_eq!(
            p.ledger().balance(&AccountKey::Wallet(id("admin"))).unwrap(),
            1_000_000
        );
        // The admin can open a fresh vault afterwards.
        p.initialize(&id("admin")).unwrap();
    }

    /// A store whose writes can be switched off after setup.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryVaultStore,
        fail_saves: bool,
    }

    impl VaultStore for FlakyStore {
        fn create(&mut self, state: &VaultState) -> StoreResult<()> {
            self.inner.create(state)
        }
        fn load(&self, admin: &Identity) -> StoreResult<VaultState> {
            self.inner.load(admin)
        }
        fn save(&mut self, state: &VaultState) -> StoreResult<()> {
            if self.fail_saves {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.inner.save(state)
        }
        fn delete(&mut self, admin: &Identity) -> StoreResult<VaultState> {
            self.inner.delete(admin)
        }
        fn len(&self) -> StoreResult<usize> {
            self.inner.len()
        }
        fn admins(&self) -> StoreResult<Vec<Identity>> {
            self.inner.admins()
        }
    }

    impl Settlement<MemoryLedger> for FlakyStore {
        fn open_vault(&mut self, ledger: &mut MemoryLedger, state: &VaultState) -> VaultResult<()> {
            open_sequential(self, ledger, state)
        }
        fn settle(
            &mut self,
            ledger: &mut MemoryLedger,
            state: &VaultState,
            from: &AccountKey,
            to: &AccountKey,
            amount: u64,
        ) -> VaultResult<()> {
            settle_sequential(self, ledger, state, from, to, amount)
        }
        fn close_vault(
            &mut self,
            ledger: &mut MemoryLedger,
            admin: &Identity,
            beneficiary: &AccountKey,
        ) -> VaultResult<u64> {
            close_sequential(self, ledger, admin, beneficiary)
        }
    }

    #[test]
    fn failed_state_write_reverses_claim() {
        let clock = ManualClock::new(NOW);
        let config = VaultConfig {
            minimum_reserve: 0,
            ..VaultConfig::default()
        };
        let mut p = VaultProgram::with_config(
            MemoryLedger::with_minimum_reserve(0),
            FlakyStore::default(),
            clock.clone(),
            config,
        );
        p.ledger_mut().airdrop(id("admin"), 10_000).unwrap();
        p.initialize(&id("admin")).unwrap();
        p.deposit(&id("admin"), &id("admin"), 10_000).unwrap();
        p.add_payee(&id("admin"), &id("admin"), &id("p1")).unwrap();
        p.schedule_payout(
            &id("admin"),
            &id("admin"),
            ScheduleRequest {
                payee: id("p1"),
                amount: 100,
                start_time: NOW + 1,
                interval: 10,
            },
        )
        .unwrap();
        let before = p.vault_state(&id("admin")).unwrap();

        clock.advance(1);
        p.store.fail_saves = true;
        assert_eq!(
            p.claim_payout(&id("admin"), &id("p1")),
            Err(VaultError::Store("disk full".into()))
        );

        assert_eq!(p.vault_state(&id("admin")).unwrap(), before);
        assert_eq!(p.vault_balance(&id("admin")).unwrap(), 10_000);
        assert_eq!(p.ledger().balance(&AccountKey::Wallet(id("p1"))).unwrap(), 0);
    }
}
