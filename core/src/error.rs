//! # Error Taxonomy
//!
//! One error type for the whole core, with variants that line up with what a
//! caller can do about them: a missing wallet, a refused policy, a busy
//! faucet, a flaky cluster. The node maps each variant to an HTTP status,
//! so new variants need a home there too.

use thiserror::Error;

use crate::crypto::keys::KeyError;
use crate::network::Network;

/// A request that is well-formed but not allowed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyViolation {
    /// Faucet requests are refused on networks without a faucet.
    #[error("airdrops are not available on {0}")]
    AirdropForbidden(Network),

    /// The wallet cannot cover token creation on a production network.
    #[error("insufficient balance: at least {required} SOL required, wallet holds {available} SOL")]
    InsufficientBalance { required: f64, available: f64 },
}

/// Errors surfaced by MintForge operations.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The cluster could not be reached, rejected a call, or returned
    /// something unusable.
    #[error("network error: {0}")]
    Network(String),

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    /// The faucet (or the RPC node in front of it) throttled us.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A write would replace existing data with something different.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the core.
pub type ForgeResult<T> = Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_violation_wraps_transparently() {
        let err: ForgeError = PolicyViolation::AirdropForbidden(Network::Mainnet).into();
        assert_eq!(err.to_string(), "airdrops are not available on mainnet");
    }

    #[test]
    fn insufficient_balance_message_names_both_amounts() {
        let err = PolicyViolation::InsufficientBalance {
            required: 2.0,
            available: 0.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 SOL"));
        assert!(msg.contains("0.5 SOL"));
    }
}
