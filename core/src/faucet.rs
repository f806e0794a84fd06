//! # Faucet
//!
//! Devnet airdrops. Production networks have no faucet, and asking for one
//! there is refused locally before anything is sent to the cluster.
//!
//! Two entry points: [`FaucetClient::request`] waits for the airdrop to
//! confirm, [`FaucetClient::submit`] only waits for the faucet to accept it.

use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::ChainConnector;
use crate::config::AIRDROP_LAMPORTS;
use crate::crypto::keys::{Pubkey, Signature};
use crate::error::{ForgeError, ForgeResult, PolicyViolation};
use crate::network::NetworkContext;

pub struct FaucetClient {
    connector: Arc<dyn ChainConnector>,
    amount: u64,
}

impl FaucetClient {
    /// A faucet that hands out [`AIRDROP_LAMPORTS`] per request.
    pub fn new(connector: Arc<dyn ChainConnector>) -> Self {
        Self {
            connector,
            amount: AIRDROP_LAMPORTS,
        }
    }

    /// Refuse networks without a faucet.
    pub fn ensure_permitted(&self, context: &NetworkContext) -> ForgeResult<()> {
        if context.faucet_enabled() {
            Ok(())
        } else {
            Err(PolicyViolation::AirdropForbidden(context.network).into())
        }
    }

    /// Request an airdrop and wait for it to confirm.
    pub async fn request(&self, context: &NetworkContext, wallet: &Pubkey) -> ForgeResult<Signature> {
        self.ensure_permitted(context)?;
        let client = self.connector.connect(context)?;
        let signature = client
            .request_airdrop(wallet, self.amount)
            .await
            .map_err(|e| log_rejection(wallet, e))?;
        client.confirm_transaction(&signature).await?;
        info!(%wallet, %signature, lamports = self.amount, "airdrop confirmed");
        Ok(signature)
    }

    /// Request an airdrop without waiting for confirmation.
    pub async fn submit(&self, context: &NetworkContext, wallet: &Pubkey) -> ForgeResult<Signature> {
        self.ensure_permitted(context)?;
        let signature = self
            .connector
            .connect(context)?
            .request_airdrop(wallet, self.amount)
            .await
            .map_err(|e| log_rejection(wallet, e))?;
        info!(%wallet, %signature, lamports = self.amount, "airdrop submitted");
        Ok(signature)
    }
}

fn log_rejection(wallet: &Pubkey, err: ForgeError) -> ForgeError {
    if let ForgeError::RateLimited(reason) = &err {
        warn!(%wallet, %reason, "faucet rate limited");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainOp, SimulatedChain};
    use crate::crypto::keys::WalletKeypair;
    use crate::network::{Network, NetworkSelector};

    fn selector() -> NetworkSelector {
        NetworkSelector::new("http://localhost:8899", "http://localhost:8898").unwrap()
    }

    #[tokio::test]
    async fn devnet_request_confirms_and_credits() {
        let chain = SimulatedChain::new().with_deferred_airdrops();
        let faucet = FaucetClient::new(Arc::new(chain.clone()));
        let wallet = WalletKeypair::generate();

        faucet
            .request(&selector().context(Network::Devnet), &wallet.pubkey())
            .await
            .unwrap();
        assert_eq!(chain.balance(Network::Devnet, &wallet.pubkey()), AIRDROP_LAMPORTS);
        assert_eq!(chain.calls(ChainOp::ConfirmTransaction), 1);
    }

    #[tokio::test]
    async fn submit_does_not_wait() {
        let chain = SimulatedChain::new().with_deferred_airdrops();
        let faucet = FaucetClient::new(Arc::new(chain.clone()));
        let wallet = WalletKeypair::generate();

        faucet
            .submit(&selector().context(Network::Devnet), &wallet.pubkey())
            .await
            .unwrap();
        assert_eq!(chain.calls(ChainOp::ConfirmTransaction), 0);
        assert_eq!(chain.balance(Network::Devnet, &wallet.pubkey()), 0);
    }

    #[tokio::test]
    async fn mainnet_is_refused_without_contacting_the_cluster() {
        let chain = SimulatedChain::new();
        let faucet = FaucetClient::new(Arc::new(chain.clone()));
        let wallet = WalletKeypair::generate();
        let mainnet = selector().context(Network::Mainnet);

        let err = faucet.request(&mainnet, &wallet.pubkey()).await.unwrap_err();
        assert!(matches!(
            err,
            ForgeError::Policy(PolicyViolation::AirdropForbidden(Network::Mainnet))
        ));
        assert!(faucet.submit(&mainnet, &wallet.pubkey()).await.is_err());
        assert_eq!(chain.calls(ChainOp::RequestAirdrop), 0);
    }

    #[tokio::test]
    async fn rate_limit_passes_through() {
        let chain = SimulatedChain::new().with_airdrop_quota(0);
        let faucet = FaucetClient::new(Arc::new(chain));
        let wallet = WalletKeypair::generate();

        let err = faucet
            .request(&selector().context(Network::Devnet), &wallet.pubkey())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::RateLimited(_)));
    }
}
