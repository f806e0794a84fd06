//! # Network Selection
//!
//! Which cluster an operation runs against is decided per call, from the id
//! the client sends along. The [`NetworkSelector`] holds the configured
//! endpoints and hands out a fresh [`NetworkContext`] every time. There is no
//! "current network" anywhere in the process, so concurrent requests against
//! different clusters cannot see each other's choice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ForgeConfig;
use crate::error::{ForgeError, ForgeResult};

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// A supported cluster.
///
/// The wire ids are `"devnet"` and `"mainnet"`. They double as the
/// token registry partition names, so changing them orphans existing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// The test cluster. Free SOL, periodic resets.
    Devnet,
    /// The production cluster. Real SOL.
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devnet => "devnet",
            Self::Mainnet => "mainnet",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Mainnet)
    }

    /// Only the test cluster has a faucet.
    pub fn faucet_enabled(&self) -> bool {
        !self.is_production()
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::Devnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Self::Devnet),
            "mainnet" | "mainnet-beta" => Ok(Self::Mainnet),
            _ => Err(ForgeError::UnknownNetwork(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Commitment
// ---------------------------------------------------------------------------

/// How settled a transaction must be before we call it done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Whether a `confirmationStatus` reported by the cluster meets this level.
    pub fn is_satisfied_by(&self, status: &str) -> bool {
        let reached = match status {
            "processed" => Self::Processed,
            "confirmed" => Self::Confirmed,
            "finalized" => Self::Finalized,
            _ => return false,
        };
        reached >= *self
    }
}

impl Default for Commitment {
    fn default() -> Self {
        Self::Confirmed
    }
}

// ---------------------------------------------------------------------------
// NetworkContext
// ---------------------------------------------------------------------------

/// Everything an operation needs to know about its target cluster.
///
/// Built per request by [`NetworkSelector::resolve`] and passed by reference
/// down the call chain. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    pub network: Network,
    pub rpc_url: String,
    pub commitment: Commitment,
}

impl NetworkContext {
    pub fn faucet_enabled(&self) -> bool {
        self.network.faucet_enabled()
    }

    pub fn is_production(&self) -> bool {
        self.network.is_production()
    }

    /// Block explorer page for a token mint on this cluster.
    pub fn explorer_token_url(&self, mint: &str) -> String {
        match self.network {
            Network::Devnet => format!("https://solscan.io/token/{mint}?cluster=devnet"),
            Network::Mainnet => format!("https://solscan.io/token/{mint}"),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkSelector
// ---------------------------------------------------------------------------

/// Maps network ids to contexts using the configured endpoints.
#[derive(Debug, Clone)]
pub struct NetworkSelector {
    devnet_rpc_url: String,
    mainnet_rpc_url: String,
}

impl NetworkSelector {
    /// Build a selector, rejecting endpoints that are not `http(s)` URLs.
    pub fn new(devnet_rpc_url: &str, mainnet_rpc_url: &str) -> ForgeResult<Self> {
        Ok(Self {
            devnet_rpc_url: validate_rpc_url(devnet_rpc_url)?,
            mainnet_rpc_url: validate_rpc_url(mainnet_rpc_url)?,
        })
    }

    pub fn from_config(config: &ForgeConfig) -> ForgeResult<Self> {
        Self::new(&config.devnet_rpc_url, &config.mainnet_rpc_url)
    }

    /// Resolve a network id. Unknown ids fail with `UnknownNetwork`; they are
    /// never silently mapped to a default.
    pub fn resolve(&self, id: &str) -> ForgeResult<NetworkContext> {
        let network: Network = id.parse()?;
        Ok(self.context(network))
    }

    /// Resolve an optional id. An absent (or blank) id means devnet.
    pub fn resolve_or_default(&self, id: Option<&str>) -> ForgeResult<NetworkContext> {
        match id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => self.resolve(id),
            None => Ok(self.context(Network::default())),
        }
    }

    /// The context for a known network.
    pub fn context(&self, network: Network) -> NetworkContext {
        let rpc_url = match network {
            Network::Devnet => self.devnet_rpc_url.clone(),
            Network::Mainnet => self.mainnet_rpc_url.clone(),
        };
        NetworkContext {
            network,
            rpc_url,
            commitment: Commitment::default(),
        }
    }
}

fn validate_rpc_url(raw: &str) -> ForgeResult<String> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ForgeError::InvalidInput(format!("invalid RPC URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        scheme => Err(ForgeError::InvalidInput(format!(
            "invalid RPC URL '{raw}': unsupported scheme '{scheme}'"
        ))),
    }
}
