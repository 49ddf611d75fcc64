//! # CLI Interface
//!
//! Defines the command-line argument structure for `payvault-node` using
//! `clap` derive. Supports two subcommands: `run` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use payvault_contracts::VaultConfig;
use payvault_protocol::config::{
    DEFAULT_MAX_PAYEES, DEFAULT_MAX_SCHEDULES, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT,
};

/// PayVault node.
///
/// Hosts custodial vaults over a persistent ledger, serves the JSON-RPC
/// API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "payvault-node",
    about = "PayVault custodial vault node",
    version,
    propagate_version = true
)]
pub struct PayVaultCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the ledger and vault database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "PAYVAULT_DATA_DIR", default_value = ".payvault")]
    pub data_dir: PathBuf,

    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "PAYVAULT_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PAYVAULT_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Minimum balance a vault must keep while open, in smallest units.
    ///
    /// Persisted into the ledger and enforced as given, so it can lower the
    /// reserve as well as raise it. When omitted, an existing ledger keeps
    /// its stored value and a new one uses the protocol default.
    #[arg(long, env = "PAYVAULT_MINIMUM_RESERVE")]
    pub minimum_reserve: Option<u64>,

    /// Capacity of each vault's payee registry.
    #[arg(long, env = "PAYVAULT_MAX_PAYEES", default_value_t = DEFAULT_MAX_PAYEES)]
    pub max_payees: usize,

    /// Capacity of each vault's schedule map.
    #[arg(long, env = "PAYVAULT_MAX_SCHEDULES", default_value_t = DEFAULT_MAX_SCHEDULES)]
    pub max_schedules: usize,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "PAYVAULT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(
        long,
        default_value = "payvault_node=info,payvault_contracts=info,payvault_protocol=info,tower_http=debug"
    )]
    pub log_level: String,
}

impl RunArgs {
    /// Program configuration for these arguments.
    ///
    /// The config-side reserve is zero: the ledger's persisted reserve is
    /// the only floor the node enforces.
    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            max_payees: self.max_payees,
            max_schedules: self.max_schedules,
            minimum_reserve: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        PayVaultCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = PayVaultCli::try_parse_from(["payvault-node", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(args.max_payees, DEFAULT_MAX_PAYEES);
        assert_eq!(args.minimum_reserve, None);
    }

    #[test]
    fn run_overrides() {
        let cli = PayVaultCli::try_parse_from([
            "payvault-node",
            "run",
            "--data-dir",
            "/tmp/vaults",
            "--minimum-reserve",
            "0",
            "--log-format",
            "json",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.data_dir, PathBuf::from("/tmp/vaults"));
        assert_eq!(args.minimum_reserve, Some(0));
        assert_eq!(args.log_format, "json");
    }

    #[test]
    fn vault_config_leaves_reserve_to_the_ledger() {
        let cli = PayVaultCli::try_parse_from(["payvault-node", "run", "--max-payees", "3"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        let config = args.vault_config();
        assert_eq!(config.max_payees, 3);
        assert_eq!(config.max_schedules, DEFAULT_MAX_SCHEDULES);
        assert_eq!(config.minimum_reserve, 0);
    }
}
