//! # Cluster Access
//!
//! Everything that talks to a Solana cluster goes through [`ChainClient`].
//! The provisioner, the faucet and the balance oracle only ever see the
//! trait, which is what lets the whole token workflow run against
//! [`SimulatedChain`] in tests and in `--simulate` mode.
//!
//! A [`ChainConnector`] turns a per-request [`NetworkContext`] into a client.
//! Clients are cheap and short-lived; connection pooling happens underneath,
//! in the shared HTTP client.
//!
//! - [`rpc`]: JSON-RPC 2.0 envelope and HTTP transport.
//! - [`transaction`]: legacy transaction wire format and signing.
//! - [`programs`]: system, token and associated-token-account instructions.
//! - [`client`]: [`RpcChainClient`], the real thing.
//! - [`simulated`]: an in-memory cluster.

pub mod client;
pub mod programs;
pub mod rpc;
pub mod simulated;
pub mod transaction;

use async_trait::async_trait;
use std::sync::Arc;

use crate::crypto::keys::{Pubkey, Signature, WalletKeypair};
use crate::error::ForgeResult;
use crate::network::NetworkContext;

pub use client::{RpcChainClient, RpcConnector};
pub use simulated::{ChainOp, SimulatedChain};

/// Operations MintForge needs from a cluster.
///
/// Mutating calls return once the transaction has reached the context's
/// commitment level. The exception is `request_airdrop`, which returns as
/// soon as the faucet accepts the request. Pair it with
/// `confirm_transaction` if you need the lamports to have landed.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Balance in lamports. Unknown accounts hold zero.
    async fn get_balance(&self, address: &Pubkey) -> ForgeResult<u64>;

    /// Ask the cluster faucet for lamports.
    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> ForgeResult<Signature>;

    /// Block until `signature` reaches the target commitment, fails, or
    /// the confirmation timeout runs out.
    async fn confirm_transaction(&self, signature: &Signature) -> ForgeResult<()>;

    /// Create and initialize a token mint at `mint`'s address, paid for by `payer`.
    async fn create_mint(
        &self,
        payer: &WalletKeypair,
        mint: &WalletKeypair,
        mint_authority: &Pubkey,
        freeze_authority: Option<&Pubkey>,
        decimals: u8,
    ) -> ForgeResult<Signature>;

    /// The associated token account for (`owner`, `mint`), created if absent.
    async fn get_or_create_associated_token_account(
        &self,
        payer: &WalletKeypair,
        mint: &Pubkey,
        owner: &Pubkey,
    ) -> ForgeResult<Pubkey>;

    /// Mint `amount` base units of `mint` into `destination`.
    async fn mint_to(
        &self,
        payer: &WalletKeypair,
        mint: &Pubkey,
        destination: &Pubkey,
        authority: &WalletKeypair,
        amount: u64,
    ) -> ForgeResult<Signature>;
}

/// Produces a [`ChainClient`] bound to one network context.
pub trait ChainConnector: Send + Sync {
    fn connect(&self, context: &NetworkContext) -> ForgeResult<Arc<dyn ChainClient>>;
}
