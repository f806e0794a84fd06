//! SOL balance lookups.

use std::sync::Arc;
use tracing::debug;

use crate::chain::ChainConnector;
use crate::config::lamports_to_sol;
use crate::crypto::keys::Pubkey;
use crate::error::{ForgeError, ForgeResult};
use crate::network::NetworkContext;

pub struct BalanceOracle {
    connector: Arc<dyn ChainConnector>,
}

impl BalanceOracle {
    pub fn new(connector: Arc<dyn ChainConnector>) -> Self {
        Self { connector }
    }

    /// Balance of `address` in SOL on the context's network.
    ///
    /// A string that is not a valid address is reported as a network error,
    /// the same way the cluster itself would reject it.
    pub async fn query(&self, context: &NetworkContext, address: &str) -> ForgeResult<f64> {
        let pubkey: Pubkey = address
            .trim()
            .parse()
            .map_err(|_| ForgeError::Network(format!("getBalance: invalid address '{address}'")))?;
        self.query_pubkey(context, &pubkey).await
    }

    pub async fn query_pubkey(&self, context: &NetworkContext, address: &Pubkey) -> ForgeResult<f64> {
        let lamports = self.connector.connect(context)?.get_balance(address).await?;
        debug!(%address, network = %context.network, lamports, "balance queried");
        Ok(lamports_to_sol(lamports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainOp, SimulatedChain};
    use crate::config::LAMPORTS_PER_SOL;
    use crate::crypto::keys::WalletKeypair;
    use crate::network::{Network, NetworkSelector};

    fn selector() -> NetworkSelector {
        NetworkSelector::new("http://localhost:8899", "http://localhost:8898").unwrap()
    }

    #[tokio::test]
    async fn reports_sol_per_network() {
        let chain = SimulatedChain::new();
        let oracle = BalanceOracle::new(Arc::new(chain.clone()));
        let wallet = WalletKeypair::generate();
        chain.set_balance(Network::Devnet, &wallet.pubkey(), 1_500_000_000);
        chain.set_balance(Network::Mainnet, &wallet.pubkey(), 3 * LAMPORTS_PER_SOL);

        let s = selector();
        assert_eq!(oracle.query(&s.context(Network::Devnet), &wallet.address()).await.unwrap(), 1.5);
        assert_eq!(oracle.query(&s.context(Network::Mainnet), &wallet.address()).await.unwrap(), 3.0);
    }

    #[tokio::test]
    async fn fresh_address_is_zero() {
        let oracle = BalanceOracle::new(Arc::new(SimulatedChain::new()));
        let ctx = selector().context(Network::Devnet);
        let balance = oracle.query(&ctx, &WalletKeypair::generate().address()).await.unwrap();
        assert_eq!(balance, 0.0);
    }

    #[tokio::test]
    async fn malformed_address_never_reaches_the_cluster() {
        let chain = SimulatedChain::new();
        let oracle = BalanceOracle::new(Arc::new(chain.clone()));
        let ctx = selector().context(Network::Devnet);

        let err = oracle.query(&ctx, "not-an-address").await.unwrap_err();
        assert!(matches!(err, ForgeError::Network(_)));
        assert_eq!(chain.calls(ChainOp::GetBalance), 0);
    }
}
