//! # MintForge Facade
//!
//! The operations the HTTP surface exposes, each taking the client's network
//! id as a plain argument. [`MintForge`] owns one of every component and
//! resolves a fresh [`NetworkContext`] per call.

use std::sync::Arc;
use tracing::info;

use crate::balance::BalanceOracle;
use crate::chain::{ChainConnector, RpcConnector};
use crate::config::ForgeConfig;
use crate::crypto::keys::{Pubkey, Signature};
use crate::error::{ForgeError, ForgeResult};
use crate::faucet::FaucetClient;
use crate::keystore::Keystore;
use crate::network::{NetworkContext, NetworkSelector};
use crate::provisioner::{ProvisionError, TokenProvisioner};
use crate::registry::{TokenRecord, TokenRegistry};

pub struct MintForge {
    selector: NetworkSelector,
    keystore: Arc<Keystore>,
    oracle: Arc<BalanceOracle>,
    faucet: Arc<FaucetClient>,
    registry: Arc<TokenRegistry>,
    provisioner: TokenProvisioner,
}

impl MintForge {
    /// Wire up every component around `connector`.
    pub fn new(config: &ForgeConfig, connector: Arc<dyn ChainConnector>) -> ForgeResult<Self> {
        let selector = NetworkSelector::from_config(config)?;
        let keystore = Arc::new(Keystore::new(config.keystore_dir.clone()));
        let registry = Arc::new(TokenRegistry::new(config.registry_dir.clone()));
        let oracle = Arc::new(BalanceOracle::new(connector.clone()));
        let faucet = Arc::new(FaucetClient::new(connector.clone()));
        let provisioner = TokenProvisioner::new(
            keystore.clone(),
            oracle.clone(),
            faucet.clone(),
            registry.clone(),
            connector,
            config.funding_mode,
        );
        Ok(Self {
            selector,
            keystore,
            oracle,
            faucet,
            registry,
            provisioner,
        })
    }

    /// Talk to real clusters over JSON-RPC.
    pub fn connect(config: &ForgeConfig) -> ForgeResult<Self> {
        let connector = Arc::new(RpcConnector::new(config)?);
        Self::new(config, connector)
    }

    pub fn keystore(&self) -> &Keystore {
        &self.keystore
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// Resolve an optional network id, defaulting to devnet.
    pub fn resolve_network(&self, network: Option<&str>) -> ForgeResult<NetworkContext> {
        self.selector.resolve_or_default(network)
    }

    /// Names of all stored wallets.
    pub fn wallets(&self) -> ForgeResult<Vec<String>> {
        self.keystore.list()
    }

    /// Generate and store a new wallet. Returns its address.
    pub fn generate_wallet(&self) -> ForgeResult<String> {
        Ok(self.keystore.generate()?.address())
    }

    /// SOL balance of a stored wallet.
    pub async fn balance(&self, wallet_name: &str, network: Option<&str>) -> ForgeResult<f64> {
        let context = self.resolve_network(network)?;
        let wallet = self.keystore.load(wallet_name)?;
        self.oracle.query_pubkey(&context, &wallet.pubkey()).await
    }

    /// Airdrop to a stored wallet and wait for it to confirm.
    ///
    /// Production networks are refused before the keystore is consulted.
    pub async fn request_airdrop(&self, wallet_name: &str, network: Option<&str>) -> ForgeResult<Signature> {
        let context = self.resolve_network(network)?;
        self.faucet.ensure_permitted(&context)?;
        let wallet = self.keystore.load(wallet_name)?;
        self.faucet.request(&context, &wallet.pubkey()).await
    }

    /// Run the token creation workflow. The token is registered before this
    /// returns.
    pub async fn create_token(
        &self,
        selected_wallet: Option<&str>,
        network: Option<&str>,
    ) -> Result<TokenRecord, ProvisionError> {
        let context = self.resolve_network(network).map_err(ProvisionError::pending)?;
        self.provisioner.create(&context, selected_wallet).await
    }

    /// Register a token created elsewhere. Safe to repeat.
    pub fn save_token(
        &self,
        network: Option<&str>,
        wallet_address: &str,
        token_mint_address: &str,
        token_account: &str,
    ) -> ForgeResult<TokenRecord> {
        let context = self.resolve_network(network)?;
        for (field, value) in [
            ("walletAddress", wallet_address),
            ("tokenMintAddress", token_mint_address),
            ("tokenAccount", token_account),
        ] {
            value
                .trim()
                .parse::<Pubkey>()
                .map_err(|_| ForgeError::InvalidInput(format!("{field} is not a valid address")))?;
        }

        let record = TokenRecord::new(wallet_address.trim(), token_mint_address.trim(), token_account.trim());
        self.registry.persist(context.network, &record)?;
        info!(mint = %record.token_mint_address, network = %context.network, "token saved");
        Ok(record)
    }

    /// All tokens registered on a network.
    pub fn tokens(&self, network: Option<&str>) -> ForgeResult<Vec<TokenRecord>> {
        let context = self.resolve_network(network)?;
        self.registry.list(context.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainOp, SimulatedChain};
    use crate::config::{AIRDROP_LAMPORTS, LAMPORTS_PER_SOL};
    use crate::crypto::keys::WalletKeypair;
    use crate::error::PolicyViolation;
    use crate::network::Network;

    fn forge() -> (tempfile::TempDir, SimulatedChain, MintForge) {
        let dir = tempfile::tempdir().unwrap();
        let chain = SimulatedChain::new();
        let forge = MintForge::new(&ForgeConfig::with_data_dir(dir.path()), Arc::new(chain.clone())).unwrap();
        (dir, chain, forge)
    }

    #[tokio::test]
    async fn balance_of_stored_wallet() {
        let (_dir, chain, forge) = forge();
        let address = forge.generate_wallet().unwrap();
        chain.set_balance(Network::Devnet, &address.parse().unwrap(), 2 * LAMPORTS_PER_SOL);

        assert_eq!(forge.balance(&address, None).await.unwrap(), 2.0);
        assert_eq!(forge.balance(&address, Some("mainnet")).await.unwrap(), 0.0);
        assert!(matches!(
            forge.balance("doesNotExist", Some("devnet")).await,
            Err(ForgeError::NotFound(_))
        ));
        assert!(matches!(
            forge.balance(&address, Some("moonnet")).await,
            Err(ForgeError::UnknownNetwork(_))
        ));
    }

    #[tokio::test]
    async fn airdrop_credits_two_sol_on_devnet() {
        let (_dir, chain, forge) = forge();
        let address = forge.generate_wallet().unwrap();

        forge.request_airdrop(&address, Some("devnet")).await.unwrap();
        assert_eq!(chain.balance(Network::Devnet, &address.parse().unwrap()), AIRDROP_LAMPORTS);
    }

    #[tokio::test]
    async fn mainnet_airdrop_refused_even_for_unknown_wallet() {
        let (_dir, chain, forge) = forge();

        let err = forge.request_airdrop("doesNotExist", Some("mainnet")).await.unwrap_err();
        assert!(matches!(
            err,
            ForgeError::Policy(PolicyViolation::AirdropForbidden(Network::Mainnet))
        ));
        assert_eq!(chain.calls(ChainOp::RequestAirdrop), 0);
    }

    #[tokio::test]
    async fn create_token_with_unknown_network_is_pending_error() {
        let (_dir, chain, forge) = forge();
        let err = forge.create_token(None, Some("localnet")).await.unwrap_err();
        assert_eq!(err.state, crate::provisioner::ProvisionState::Pending);
        assert!(matches!(err.source, ForgeError::UnknownNetwork(_)));
        assert_eq!(chain.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn created_token_is_listed_on_its_network_only() {
        let (_dir, _chain, forge) = forge();
        let record = forge.create_token(None, Some("devnet")).await.unwrap();

        assert_eq!(forge.tokens(Some("devnet")).unwrap(), vec![record.clone()]);
        assert!(forge.tokens(Some("mainnet")).unwrap().is_empty());
        assert_eq!(forge.tokens(None).unwrap(), vec![record]);
    }

    #[test]
    fn save_token_is_idempotent_and_validates() {
        let (_dir, _chain, forge) = forge();
        let wallet = WalletKeypair::generate().address();
        let mint = WalletKeypair::generate().address();
        let account = WalletKeypair::generate().address();

        forge.save_token(Some("mainnet"), &wallet, &mint, &account).unwrap();
        forge.save_token(Some("mainnet"), &wallet, &mint, &account).unwrap();
        assert_eq!(forge.tokens(Some("mainnet")).unwrap().len(), 1);

        assert!(matches!(
            forge.save_token(Some("mainnet"), "nope", &mint, &account),
            Err(ForgeError::InvalidInput(_))
        ));
        let other = WalletKeypair::generate().address();
        assert!(matches!(
            forge.save_token(Some("mainnet"), &other, &mint, &account),
            Err(ForgeError::Conflict(_))
        ));
    }
}
