//! # Configuration & Constants
//!
//! Every magic number in MintForge lives here. Token shape, faucet amounts,
//! the mainnet funding floor, default endpoints and timeouts.
//!
//! [`ForgeConfig`] is the runtime half: where wallets and token records go on
//! disk, which RPC endpoints to use, and how patient to be with the cluster.
//! The node builds one from its CLI flags; tests build one around a tempdir.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ForgeError;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// One SOL is a billion lamports. Balances are stored in lamports and only
/// turned into SOL at the edges.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert lamports to SOL.
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

// ---------------------------------------------------------------------------
// Token Shape
// ---------------------------------------------------------------------------

/// Decimals of every mint we create.
pub const MINT_DECIMALS: u8 = 9;

/// Initial supply in whole tokens, minted to the creator's token account.
pub const INITIAL_SUPPLY_TOKENS: u64 = 1_000;

/// Initial supply in base units (`1000 × 10^9`).
pub const fn initial_supply_base_units() -> u64 {
    INITIAL_SUPPLY_TOKENS * 10u64.pow(MINT_DECIMALS as u32)
}

/// Size of an SPL token mint account in bytes.
pub const MINT_ACCOUNT_LEN: u64 = 82;

// ---------------------------------------------------------------------------
// Funding
// ---------------------------------------------------------------------------

/// Devnet airdrop size: 2 SOL.
pub const AIRDROP_LAMPORTS: u64 = 2 * LAMPORTS_PER_SOL;

/// A mainnet wallet must hold at least this much SOL before we spend any of
/// it on token creation.
pub const PRODUCTION_FUNDING_THRESHOLD_SOL: f64 = 2.0;

/// Web faucet offered to users when the devnet faucet rate-limits us.
pub const FALLBACK_FAUCET_URL: &str = "https://solfaucet.com/";

// ---------------------------------------------------------------------------
// Endpoints & Timing
// ---------------------------------------------------------------------------

/// Public devnet RPC endpoint.
pub const DEFAULT_DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";

/// Public mainnet-beta RPC endpoint.
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Per-request HTTP timeout for RPC calls.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for a submitted transaction to reach the target
/// commitment before giving up on it.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between signature status polls.
pub const DEFAULT_CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Funding Mode
// ---------------------------------------------------------------------------

/// What to do with the airdrop for a freshly generated devnet wallet during
/// token creation.
///
/// `FireAndForget` submits the airdrop and moves straight on to mint
/// creation. It is fast and usually works on devnet, but mint creation can
/// race the airdrop and fail with insufficient funds. `AwaitConfirmation`
/// waits for the airdrop to confirm first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FundingMode {
    #[default]
    FireAndForget,
    AwaitConfirmation,
}

impl FundingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FireAndForget => "fire-and-forget",
            Self::AwaitConfirmation => "await-confirmation",
        }
    }
}

impl fmt::Display for FundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FundingMode {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fire-and-forget" | "fire" => Ok(Self::FireAndForget),
            "await-confirmation" | "await" => Ok(Self::AwaitConfirmation),
            other => Err(ForgeError::InvalidInput(format!(
                "unknown funding mode '{other}' (expected fire-and-forget or await-confirmation)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`MintForge`](crate::service::MintForge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Directory holding one `<address>.json` keypair file per wallet.
    pub keystore_dir: PathBuf,
    /// Root of the token registry. Records land in `<root>/<network>/`.
    pub registry_dir: PathBuf,
    pub devnet_rpc_url: String,
    pub mainnet_rpc_url: String,
    pub funding_mode: FundingMode,
    pub rpc_timeout: Duration,
    pub confirm_timeout: Duration,
    pub confirm_poll_interval: Duration,
    /// Returned to clients alongside a rate-limited airdrop.
    pub faucet_fallback_url: String,
}

impl ForgeConfig {
    /// Defaults rooted at `data_dir`: wallets in `data_dir/wallets`, token
    /// records in `data_dir/tokens`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            keystore_dir: data_dir.join("wallets"),
            registry_dir: data_dir.join("tokens"),
            ..Self::default()
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            keystore_dir: PathBuf::from("wallets"),
            registry_dir: PathBuf::from("tokens"),
            devnet_rpc_url: DEFAULT_DEVNET_RPC_URL.to_string(),
            mainnet_rpc_url: DEFAULT_MAINNET_RPC_URL.to_string(),
            funding_mode: FundingMode::default(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            confirm_poll_interval: DEFAULT_CONFIRM_POLL_INTERVAL,
            faucet_fallback_url: FALLBACK_FAUCET_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_supply_is_one_thousand_whole_tokens() {
        assert_eq!(initial_supply_base_units(), 1_000_000_000_000);
    }

    #[test]
    fn lamports_convert_to_sol() {
        assert_eq!(lamports_to_sol(AIRDROP_LAMPORTS), 2.0);
        assert_eq!(lamports_to_sol(1_500_000_000), 1.5);
        assert_eq!(lamports_to_sol(0), 0.0);
    }

    #[test]
    fn funding_mode_parses_both_spellings() {
        assert_eq!("await".parse::<FundingMode>().unwrap(), FundingMode::AwaitConfirmation);
        assert_eq!(
            "Fire-And-Forget".parse::<FundingMode>().unwrap(),
            FundingMode::FireAndForget
        );
        assert!("eventually".parse::<FundingMode>().is_err());
    }

    #[test]
    fn funding_mode_default_is_fire_and_forget() {
        assert_eq!(FundingMode::default(), FundingMode::FireAndForget);
    }

    #[test]
    fn data_dir_layout() {
        let cfg = ForgeConfig::with_data_dir("/var/lib/mintforge");
        assert_eq!(cfg.keystore_dir, PathBuf::from("/var/lib/mintforge/wallets"));
        assert_eq!(cfg.registry_dir, PathBuf::from("/var/lib/mintforge/tokens"));
        assert_eq!(cfg.devnet_rpc_url, DEFAULT_DEVNET_RPC_URL);
    }
}
