//! # Token Provisioner
//!
//! Creating a token is four chain operations that can each fail on their
//! own, so the workflow is an explicit state machine:
//!
//! ```text
//! Pending ──▶ WalletReady ──▶ MintCreated ──▶ AccountReady ──▶ Minted
//! ```
//!
//! - **Pending → WalletReady**: load the chosen wallet (and check that a
//!   production wallet can afford this), or generate one and fund it from
//!   the faucet.
//! - **WalletReady → MintCreated**: create a mint with 9 decimals, the
//!   wallet as mint authority and no freeze authority.
//! - **MintCreated → AccountReady**: get or create the wallet's associated
//!   token account for the mint.
//! - **AccountReady → Minted**: mint the initial supply into that account,
//!   then register the token.
//!
//! A failure is reported as a [`ProvisionError`] carrying the last state
//! reached plus whatever addresses exist by then. A mint created before a
//! later step failed is left on-chain, and the error says where it is.
//!
//! Concurrent creations for the same existing wallet are serialized by a
//! per-wallet lock, so they never race on that wallet's balance.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::balance::BalanceOracle;
use crate::chain::ChainConnector;
use crate::config::{initial_supply_base_units, FundingMode, MINT_DECIMALS, PRODUCTION_FUNDING_THRESHOLD_SOL};
use crate::crypto::keys::{Pubkey, WalletKeypair};
use crate::error::{ForgeError, PolicyViolation};
use crate::faucet::FaucetClient;
use crate::keystore::Keystore;
use crate::network::NetworkContext;
use crate::registry::{TokenRecord, TokenRegistry};

// ---------------------------------------------------------------------------
// States & Errors
// ---------------------------------------------------------------------------

/// How far a token creation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProvisionState {
    Pending,
    WalletReady,
    MintCreated,
    AccountReady,
    Minted,
}

impl ProvisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::WalletReady => "wallet_ready",
            Self::MintCreated => "mint_created",
            Self::AccountReady => "account_ready",
            Self::Minted => "minted",
        }
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token creation that stopped partway.
#[derive(Debug, Error)]
#[error("token creation stopped at {state}: {source}")]
pub struct ProvisionError {
    /// The last state successfully reached.
    pub state: ProvisionState,
    pub wallet: Option<String>,
    /// Set once the mint exists on-chain.
    pub mint: Option<String>,
    pub source: ForgeError,
}

impl ProvisionError {
    /// An error before any work was done.
    pub fn pending(source: ForgeError) -> Self {
        Self {
            state: ProvisionState::Pending,
            wallet: None,
            mint: None,
            source,
        }
    }
}

struct Progress {
    state: ProvisionState,
    wallet: Option<Pubkey>,
    mint: Option<Pubkey>,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: ProvisionState::Pending,
            wallet: None,
            mint: None,
        }
    }

    fn advance(&mut self, next: ProvisionState) {
        debug!(from = %self.state, to = %next, "provisioning advanced");
        self.state = next;
    }

    fn fail(&self, source: impl Into<ForgeError>) -> ProvisionError {
        let source = source.into();
        warn!(state = %self.state, error = %source, "token creation failed");
        ProvisionError {
            state: self.state,
            wallet: self.wallet.map(|w| w.to_string()),
            mint: self.mint.map(|m| m.to_string()),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet Locks
// ---------------------------------------------------------------------------

/// Per-wallet async locks. Entries are dropped when nobody holds them.
#[derive(Default)]
pub struct WalletLocks {
    locks: Mutex<HashMap<Pubkey, Arc<AsyncMutex<()>>>>,
}

impl WalletLocks {
    pub async fn acquire(&self, wallet: &Pubkey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(*wallet).or_default().clone()
        };
        lock.lock_owned().await
    }
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

pub struct TokenProvisioner {
    keystore: Arc<Keystore>,
    oracle: Arc<BalanceOracle>,
    faucet: Arc<FaucetClient>,
    registry: Arc<TokenRegistry>,
    connector: Arc<dyn ChainConnector>,
    funding_mode: FundingMode,
    locks: WalletLocks,
}

impl TokenProvisioner {
    pub fn new(
        keystore: Arc<Keystore>,
        oracle: Arc<BalanceOracle>,
        faucet: Arc<FaucetClient>,
        registry: Arc<TokenRegistry>,
        connector: Arc<dyn ChainConnector>,
        funding_mode: FundingMode,
    ) -> Self {
        Self {
            keystore,
            oracle,
            faucet,
            registry,
            connector,
            funding_mode,
            locks: WalletLocks::default(),
        }
    }

    pub fn funding_mode(&self) -> FundingMode {
        self.funding_mode
    }

    /// Create a token owned by `wallet_name`, or by a freshly generated wallet
    /// when no name is given, and register it.
    pub async fn create(
        &self,
        context: &NetworkContext,
        wallet_name: Option<&str>,
    ) -> Result<TokenRecord, ProvisionError> {
        let mut progress = Progress::new();
        let wallet_name = wallet_name.map(str::trim).filter(|name| !name.is_empty());

        let (wallet, _guard) = match wallet_name {
            Some(name) => {
                let wallet = self.keystore.load(name).map_err(|e| progress.fail(e))?;
                progress.wallet = Some(wallet.pubkey());
                let guard = self.locks.acquire(&wallet.pubkey()).await;
                if context.is_production() {
                    let available = self
                        .oracle
                        .query_pubkey(context, &wallet.pubkey())
                        .await
                        .map_err(|e| progress.fail(e))?;
                    if available < PRODUCTION_FUNDING_THRESHOLD_SOL {
                        return Err(progress.fail(PolicyViolation::InsufficientBalance {
                            required: PRODUCTION_FUNDING_THRESHOLD_SOL,
                            available,
                        }));
                    }
                }
                (wallet, Some(guard))
            }
            None => {
                if context.is_production() {
                    // A wallet generated now holds nothing, and production has no faucet.
                    return Err(progress.fail(PolicyViolation::InsufficientBalance {
                        required: PRODUCTION_FUNDING_THRESHOLD_SOL,
                        available: 0.0,
                    }));
                }
                let wallet = self.keystore.generate().map_err(|e| progress.fail(e))?;
                progress.wallet = Some(wallet.pubkey());
                self.fund(context, &wallet).await.map_err(|e| progress.fail(e))?;
                (wallet, None)
            }
        };
        progress.advance(ProvisionState::WalletReady);

        let client = self.connector.connect(context).map_err(|e| progress.fail(e))?;
        let mint = WalletKeypair::generate();
        client
            .create_mint(&wallet, &mint, &wallet.pubkey(), None, MINT_DECIMALS)
            .await
            .map_err(|e| progress.fail(e))?;
        progress.mint = Some(mint.pubkey());
        progress.advance(ProvisionState::MintCreated);

        let account = client
            .get_or_create_associated_token_account(&wallet, &mint.pubkey(), &wallet.pubkey())
            .await
            .map_err(|e| progress.fail(e))?;
        progress.advance(ProvisionState::AccountReady);

        client
            .mint_to(&wallet, &mint.pubkey(), &account, &wallet, initial_supply_base_units())
            .await
            .map_err(|e| progress.fail(e))?;
        progress.advance(ProvisionState::Minted);

        let record = TokenRecord::new(wallet.address(), mint.address(), account.to_string());
        self.registry
            .persist(context.network, &record)
            .map_err(|e| progress.fail(e))?;

        info!(
            wallet = %record.wallet_address,
            mint = %record.token_mint_address,
            account = %record.token_account,
            network = %context.network,
            explorer = %context.explorer_token_url(&record.token_mint_address),
            "token created"
        );
        Ok(record)
    }

    async fn fund(&self, context: &NetworkContext, wallet: &WalletKeypair) -> Result<(), ForgeError> {
        match self.funding_mode {
            FundingMode::FireAndForget => {
                self.faucet.submit(context, &wallet.pubkey()).await?;
            }
            FundingMode::AwaitConfirmation => {
                self.faucet.request(context, &wallet.pubkey()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainOp, SimulatedChain};
    use crate::config::LAMPORTS_PER_SOL;
    use crate::network::{Network, NetworkSelector};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        chain: SimulatedChain,
        keystore: Arc<Keystore>,
        registry: Arc<TokenRegistry>,
        provisioner: TokenProvisioner,
        selector: NetworkSelector,
    }

    fn harness_with(chain: SimulatedChain, mode: FundingMode) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let connector: Arc<dyn ChainConnector> = Arc::new(chain.clone());
        let keystore = Arc::new(Keystore::new(dir.path().join("wallets")));
        let registry = Arc::new(TokenRegistry::new(dir.path().join("tokens")));
        let provisioner = TokenProvisioner::new(
            keystore.clone(),
            Arc::new(BalanceOracle::new(connector.clone())),
            Arc::new(FaucetClient::new(connector.clone())),
            registry.clone(),
            connector,
            mode,
        );
        Harness {
            _dir: dir,
            chain,
            keystore,
            registry,
            provisioner,
            selector: NetworkSelector::new("http://localhost:8899", "http://localhost:8898").unwrap(),
        }
    }

    fn harness() -> Harness {
        harness_with(SimulatedChain::new(), FundingMode::FireAndForget)
    }

    // -- 1. Happy paths -----------------------------------------------------

    #[tokio::test]
    async fn devnet_without_wallet_generates_funds_and_mints() {
        let h = harness();
        let devnet = h.selector.context(Network::Devnet);

        let record = h.provisioner.create(&devnet, None).await.unwrap();

        assert!(h.keystore.load(&record.wallet_address).is_ok());
        let mint: Pubkey = record.token_mint_address.parse().unwrap();
        let account: Pubkey = record.token_account.parse().unwrap();
        let snapshot = h.chain.mint(Network::Devnet, &mint).unwrap();
        assert_eq!(snapshot.decimals, 9);
        assert_eq!(snapshot.supply, 1_000_000_000_000);
        assert_eq!(snapshot.freeze_authority, None);
        assert_eq!(snapshot.mint_authority.to_string(), record.wallet_address);
        assert_eq!(h.chain.token_balance(Network::Devnet, &account), Some(1_000_000_000_000));
        assert_eq!(h.chain.calls(ChainOp::RequestAirdrop), 1);
        assert_eq!(h.registry.list(Network::Devnet).unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn mainnet_with_funded_wallet_skips_faucet() {
        let h = harness();
        let wallet = h.keystore.generate().unwrap();
        h.chain.set_balance(Network::Mainnet, &wallet.pubkey(), 3 * LAMPORTS_PER_SOL);

        let record = h
            .provisioner
            .create(&h.selector.context(Network::Mainnet), Some(&wallet.address()))
            .await
            .unwrap();

        assert_eq!(record.wallet_address, wallet.address());
        assert_eq!(h.chain.calls(ChainOp::RequestAirdrop), 0);
        assert_eq!(h.registry.list(Network::Mainnet).unwrap().len(), 1);
        assert!(h.registry.list(Network::Devnet).unwrap().is_empty());
    }

    #[tokio::test]
    async fn devnet_existing_wallet_is_not_balance_checked() {
        let h = harness();
        let wallet = h.keystore.generate().unwrap();
        h.chain.set_balance(Network::Devnet, &wallet.pubkey(), LAMPORTS_PER_SOL / 10);

        h.provisioner
            .create(&h.selector.context(Network::Devnet), Some(&wallet.address()))
            .await
            .unwrap();
        assert_eq!(h.chain.calls(ChainOp::GetBalance), 0);
    }

    // -- 2. Policy ----------------------------------------------------------

    #[tokio::test]
    async fn mainnet_below_threshold_never_touches_the_chain() {
        let h = harness();
        let wallet = h.keystore.generate().unwrap();
        h.chain.set_balance(Network::Mainnet, &wallet.pubkey(), 1_500_000_000);

        let err = h
            .provisioner
            .create(&h.selector.context(Network::Mainnet), Some(&wallet.address()))
            .await
            .unwrap_err();

        assert_eq!(err.state, ProvisionState::Pending);
        assert!(matches!(
            err.source,
            ForgeError::Policy(PolicyViolation::InsufficientBalance { available, .. }) if available == 1.5
        ));
        assert_eq!(h.chain.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn mainnet_without_wallet_is_refused_up_front() {
        let h = harness();
        let err = h
            .provisioner
            .create(&h.selector.context(Network::Mainnet), None)
            .await
            .unwrap_err();

        assert!(matches!(err.source, ForgeError::Policy(_)));
        assert!(h.keystore.list().unwrap().is_empty());
        assert_eq!(h.chain.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_wallet_is_not_found() {
        let h = harness();
        let err = h
            .provisioner
            .create(&h.selector.context(Network::Devnet), Some("doesNotExist"))
            .await
            .unwrap_err();
        assert!(matches!(err.source, ForgeError::NotFound(_)));
        assert_eq!(h.chain.mutating_calls(), 0);
    }

    // -- 3. Partial failures --------------------------------------------------

    #[tokio::test]
    async fn failure_after_mint_reports_the_orphaned_mint() {
        let h = harness();
        h.chain.fail_on(ChainOp::CreateAssociatedAccount);

        let err = h
            .provisioner
            .create(&h.selector.context(Network::Devnet), None)
            .await
            .unwrap_err();

        assert_eq!(err.state, ProvisionState::MintCreated);
        let mint: Pubkey = err.mint.as_deref().unwrap().parse().unwrap();
        assert!(h.chain.mint(Network::Devnet, &mint).is_some());
        assert!(err.wallet.is_some());
        assert!(h.registry.list(Network::Devnet).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_in_mint_to_stops_at_account_ready() {
        let h = harness();
        h.chain.fail_on(ChainOp::MintTo);

        let err = h
            .provisioner
            .create(&h.selector.context(Network::Devnet), None)
            .await
            .unwrap_err();
        assert_eq!(err.state, ProvisionState::AccountReady);
        assert!(err.mint.is_some());
    }

    #[tokio::test]
    async fn faucet_rate_limit_stops_before_wallet_ready() {
        let h = harness_with(SimulatedChain::new().with_airdrop_quota(0), FundingMode::FireAndForget);

        let err = h
            .provisioner
            .create(&h.selector.context(Network::Devnet), None)
            .await
            .unwrap_err();
        assert_eq!(err.state, ProvisionState::Pending);
        assert!(matches!(err.source, ForgeError::RateLimited(_)));
        assert!(err.wallet.is_some());
        assert_eq!(h.chain.calls(ChainOp::CreateMint), 0);
    }

    // -- 4. Funding modes ---------------------------------------------------

    #[tokio::test]
    async fn fire_and_forget_races_a_slow_airdrop() {
        let h = harness_with(SimulatedChain::new().with_deferred_airdrops(), FundingMode::FireAndForget);

        let err = h
            .provisioner
            .create(&h.selector.context(Network::Devnet), None)
            .await
            .unwrap_err();
        assert_eq!(err.state, ProvisionState::WalletReady);
        assert!(err.mint.is_none());
        assert_eq!(h.chain.calls(ChainOp::ConfirmTransaction), 0);
    }

    #[tokio::test]
    async fn await_confirmation_wins_the_race() {
        let h = harness_with(
            SimulatedChain::new().with_deferred_airdrops(),
            FundingMode::AwaitConfirmation,
        );

        h.provisioner
            .create(&h.selector.context(Network::Devnet), None)
            .await
            .unwrap();
        assert_eq!(h.chain.calls(ChainOp::ConfirmTransaction), 1);
        assert_eq!(h.provisioner.funding_mode(), FundingMode::AwaitConfirmation);
    }

    // -- 5. Concurrency -----------------------------------------------------

    #[tokio::test]
    async fn concurrent_creations_for_one_wallet_both_succeed() {
        let h = harness();
        let wallet = h.keystore.generate().unwrap();
        h.chain.set_balance(Network::Devnet, &wallet.pubkey(), LAMPORTS_PER_SOL);
        let devnet = h.selector.context(Network::Devnet);
        let address = wallet.address();

        let (a, b) = tokio::join!(
            h.provisioner.create(&devnet, Some(&address)),
            h.provisioner.create(&devnet, Some(&address)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.token_mint_address, b.token_mint_address);
        assert_eq!(h.registry.list(Network::Devnet).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn wallet_locks_are_released() {
        let locks = WalletLocks::default();
        let wallet = WalletKeypair::generate().pubkey();
        drop(locks.acquire(&wallet).await);
        let _again = locks.acquire(&wallet).await;
        assert_eq!(locks.locks.lock().len(), 1);
    }
}
