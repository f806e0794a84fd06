//! # CLI Interface
//!
//! Defines the command-line argument structure for `mintforge-node` using
//! `clap` derive. Three subcommands: `run`, `init` and `version`. Every `run`
//! flag has an environment fallback so the node can be configured entirely
//! from a container definition.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use mintforge_core::config::{
    DEFAULT_DEVNET_RPC_URL, DEFAULT_MAINNET_RPC_URL, FALLBACK_FAUCET_URL,
};
use mintforge_core::{ForgeConfig, FundingMode};

use crate::logging::LogFormat;

/// MintForge node.
///
/// Serves an HTTP API for creating Solana wallets, checking balances,
/// requesting devnet airdrops and minting SPL tokens.
#[derive(Parser, Debug)]
#[command(
    name = "mintforge-node",
    about = "Wallet and SPL token provisioning service",
    version,
    propagate_version = true
)]
pub struct MintForgeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API and metrics servers.
    Run(RunArgs),
    /// Create the keystore and registry directories, optionally with a
    /// first wallet.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Where wallets and token records live.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Directory holding one `<address>.json` keypair file per wallet.
    #[arg(long, env = "MINTFORGE_KEYSTORE_DIR", default_value = "wallets")]
    pub keystore_dir: PathBuf,

    /// Root of the token registry (`<root>/<network>/<mint>.json`).
    #[arg(long, env = "MINTFORGE_REGISTRY_DIR", default_value = "tokens")]
    pub registry_dir: PathBuf,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Address for the HTTP API.
    #[arg(long, env = "MINTFORGE_BIND", default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "MINTFORGE_METRICS_PORT", default_value_t = 9742)]
    pub metrics_port: u16,

    #[command(flatten)]
    pub storage: StorageArgs,

    /// Devnet JSON-RPC endpoint.
    #[arg(long, env = "MINTFORGE_DEVNET_RPC", default_value = DEFAULT_DEVNET_RPC_URL)]
    pub devnet_rpc: String,

    /// Mainnet JSON-RPC endpoint.
    #[arg(long, env = "MINTFORGE_MAINNET_RPC", default_value = DEFAULT_MAINNET_RPC_URL)]
    pub mainnet_rpc: String,

    /// How a freshly generated devnet wallet is funded before minting:
    /// `fire-and-forget` or `await-confirmation`.
    #[arg(long, env = "MINTFORGE_FUNDING_MODE", default_value = "fire-and-forget")]
    pub funding_mode: FundingMode,

    /// Seconds to wait for a transaction to confirm.
    #[arg(long, env = "MINTFORGE_CONFIRM_TIMEOUT_SECS", default_value_t = 60)]
    pub confirm_timeout_secs: u64,

    /// Per-request timeout for JSON-RPC calls, in seconds.
    #[arg(long, env = "MINTFORGE_RPC_TIMEOUT_SECS", default_value_t = 30)]
    pub rpc_timeout_secs: u64,

    /// Run against an in-memory simulated cluster instead of real RPC
    /// endpoints. Nothing leaves the process.
    #[arg(long, env = "MINTFORGE_SIMULATE")]
    pub simulate: bool,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "MINTFORGE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Browser origins allowed by CORS. Repeat for several; omit to allow any.
    #[arg(long = "allowed-origin", env = "MINTFORGE_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Funding page offered to clients when the devnet faucet is throttled.
    #[arg(long, env = "MINTFORGE_FAUCET_URL", default_value = FALLBACK_FAUCET_URL)]
    pub faucet_url: String,
}

impl RunArgs {
    pub fn forge_config(&self) -> ForgeConfig {
        ForgeConfig {
            keystore_dir: self.storage.keystore_dir.clone(),
            registry_dir: self.storage.registry_dir.clone(),
            devnet_rpc_url: self.devnet_rpc.clone(),
            mainnet_rpc_url: self.mainnet_rpc.clone(),
            funding_mode: self.funding_mode,
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
            faucet_fallback_url: self.faucet_url.clone(),
            ..ForgeConfig::default()
        }
    }
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Also generate a first wallet and print its address.
    #[arg(long)]
    pub generate_wallet: bool,
}
