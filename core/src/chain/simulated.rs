//! # Simulated Cluster
//!
//! An in-memory stand-in for a Solana cluster. It keeps a separate ledger per
//! network, charges rent and fees like the real thing, and counts every call
//! so tests can assert what was (and was not) attempted.
//!
//! It is also what the node runs against with `--simulate`, which makes the
//! whole HTTP surface usable offline.
//!
//! Knobs:
//! - [`with_airdrop_quota`](SimulatedChain::with_airdrop_quota): after N
//!   airdrops, the faucet rate-limits.
//! - [`with_deferred_airdrops`](SimulatedChain::with_deferred_airdrops):
//!   airdropped lamports only land once the airdrop is confirmed, which is
//!   how an unconfirmed airdrop races mint creation on a real cluster.
//! - [`fail_on`](SimulatedChain::fail_on): make one operation fail.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::chain::programs::{associated_token_address, TOKEN_ACCOUNT_LEN};
use crate::config::MINT_ACCOUNT_LEN;
use crate::chain::{ChainClient, ChainConnector};
use crate::crypto::keys::{Pubkey, Signature, WalletKeypair};
use crate::error::{ForgeError, ForgeResult};
use crate::network::{Network, NetworkContext};

/// Account storage overhead charged on top of the data length.
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

/// Default rent rate times the two-year exemption threshold.
const RENT_LAMPORTS_PER_BYTE: u64 = 3_480 * 2;

/// Rent-exempt minimum for an account holding `data_len` bytes.
pub const fn rent_exempt_minimum(data_len: u64) -> u64 {
    (ACCOUNT_STORAGE_OVERHEAD + data_len) * RENT_LAMPORTS_PER_BYTE
}

/// Rent-exempt minimum for a mint account.
pub const MINT_RENT_LAMPORTS: u64 = rent_exempt_minimum(MINT_ACCOUNT_LEN);

/// Rent-exempt minimum for a token account.
pub const TOKEN_ACCOUNT_RENT_LAMPORTS: u64 = rent_exempt_minimum(TOKEN_ACCOUNT_LEN);

/// Fee per signature.
pub const SIGNATURE_FEE_LAMPORTS: u64 = 5_000;

/// A cluster operation, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainOp {
    GetBalance,
    RequestAirdrop,
    ConfirmTransaction,
    CreateMint,
    CreateAssociatedAccount,
    MintTo,
}

impl ChainOp {
    /// Operations that change ledger state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::GetBalance | Self::ConfirmTransaction)
    }
}

/// Observable state of a simulated mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintSnapshot {
    pub decimals: u8,
    pub mint_authority: Pubkey,
    pub freeze_authority: Option<Pubkey>,
    pub supply: u64,
}

#[derive(Debug, Clone)]
struct TokenAccount {
    mint: Pubkey,
    owner: Pubkey,
    amount: u64,
}

#[derive(Default)]
struct Ledger {
    lamports: HashMap<Pubkey, u64>,
    mints: HashMap<Pubkey, MintSnapshot>,
    token_accounts: HashMap<Pubkey, TokenAccount>,
    pending_airdrops: HashMap<Signature, (Pubkey, u64)>,
    signatures: HashSet<Signature>,
}

impl Ledger {
    fn debit(&mut self, payer: &Pubkey, lamports: u64, what: &str) -> ForgeResult<()> {
        let balance = self.lamports.entry(*payer).or_default();
        if *balance < lamports {
            return Err(ForgeError::Network(format!(
                "{what}: insufficient funds for rent and fees (payer {payer} holds {balance}, needs {lamports})"
            )));
        }
        *balance -= lamports;
        Ok(())
    }

    fn record_signature(&mut self) -> Signature {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&rand::random::<[u8; 32]>());
        bytes[32..].copy_from_slice(&rand::random::<[u8; 32]>());
        let signature = Signature::from_bytes(bytes);
        self.signatures.insert(signature);
        signature
    }
}

#[derive(Default)]
struct SimState {
    ledgers: HashMap<Network, Ledger>,
    calls: HashMap<ChainOp, usize>,
    failures: HashSet<ChainOp>,
    airdrop_quota: Option<usize>,
    airdrops_served: usize,
    deferred_airdrops: bool,
}

impl SimState {
    fn record(&mut self, op: ChainOp) -> ForgeResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failures.contains(&op) {
            return Err(ForgeError::Network(format!("simulated failure in {op:?}")));
        }
        Ok(())
    }

    fn ledger(&mut self, network: Network) -> &mut Ledger {
        self.ledgers.entry(network).or_default()
    }
}

/// In-memory cluster. Cloning shares state.
#[derive(Clone, Default)]
pub struct SimulatedChain {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_airdrop_quota(self, quota: usize) -> Self {
        self.state.lock().airdrop_quota = Some(quota);
        self
    }

    pub fn with_deferred_airdrops(self) -> Self {
        self.state.lock().deferred_airdrops = true;
        self
    }

    /// Make every future call of `op` fail with a network error.
    pub fn fail_on(&self, op: ChainOp) {
        self.state.lock().failures.insert(op);
    }

    pub fn set_balance(&self, network: Network, address: &Pubkey, lamports: u64) {
        self.state.lock().ledger(network).lamports.insert(*address, lamports);
    }

    pub fn balance(&self, network: Network, address: &Pubkey) -> u64 {
        self.state
            .lock()
            .ledger(network)
            .lamports
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn mint(&self, network: Network, mint: &Pubkey) -> Option<MintSnapshot> {
        self.state.lock().ledger(network).mints.get(mint).cloned()
    }

    /// Token amount held by a token account, if it exists.
    pub fn token_balance(&self, network: Network, account: &Pubkey) -> Option<u64> {
        self.state
            .lock()
            .ledger(network)
            .token_accounts
            .get(account)
            .map(|a| a.amount)
    }

    pub fn calls(&self, op: ChainOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn mutating_calls(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutating())
            .map(|(_, n)| n)
            .sum()
    }
}

impl ChainConnector for SimulatedChain {
    fn connect(&self, context: &NetworkContext) -> ForgeResult<Arc<dyn ChainClient>> {
        Ok(Arc::new(SimulatedClient {
            chain: self.clone(),
            network: context.network,
        }))
    }
}

struct SimulatedClient {
    chain: SimulatedChain,
    network: Network,
}

#[async_trait]
impl ChainClient for SimulatedClient {
    async fn get_balance(&self, address: &Pubkey) -> ForgeResult<u64> {
        let mut state = self.chain.state.lock();
        state.record(ChainOp::GetBalance)?;
        Ok(state.ledger(self.network).lamports.get(address).copied().unwrap_or(0))
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> ForgeResult<Signature> {
        let mut state = self.chain.state.lock();
        state.record(ChainOp::RequestAirdrop)?;
        if self.network.is_production() {
            return Err(ForgeError::Network("requestAirdrop: method not supported on this cluster".into()));
        }
        if let Some(quota) = state.airdrop_quota {
            if state.airdrops_served >= quota {
                return Err(ForgeError::RateLimited(
                    "requestAirdrop: airdrop limit reached, try again later".into(),
                ));
            }
        }
        state.airdrops_served += 1;
        let deferred = state.deferred_airdrops;

        let ledger = state.ledger(self.network);
        let signature = ledger.record_signature();
        if deferred {
            ledger.pending_airdrops.insert(signature, (*address, lamports));
        } else {
            *ledger.lamports.entry(*address).or_default() += lamports;
        }
        debug!(%address, lamports, deferred, "simulated airdrop");
        Ok(signature)
    }

    async fn confirm_transaction(&self, signature: &Signature) -> ForgeResult<()> {
        let mut state = self.chain.state.lock();
        state.record(ChainOp::ConfirmTransaction)?;
        let ledger = state.ledger(self.network);
        if !ledger.signatures.contains(signature) {
            return Err(ForgeError::Network(format!("signature {signature} not found")));
        }
        if let Some((address, lamports)) = ledger.pending_airdrops.remove(signature) {
            *ledger.lamports.entry(address).or_default() += lamports;
        }
        Ok(())
    }

    async fn create_mint(
        &self,
        payer: &WalletKeypair,
        mint: &WalletKeypair,
        mint_authority: &Pubkey,
        freeze_authority: Option<&Pubkey>,
        decimals: u8,
    ) -> ForgeResult<Signature> {
        let mut state = self.chain.state.lock();
        state.record(ChainOp::CreateMint)?;
        let ledger = state.ledger(self.network);

        let mint_key = mint.pubkey();
        if ledger.mints.contains_key(&mint_key) || ledger.lamports.get(&mint_key).copied().unwrap_or(0) > 0 {
            return Err(ForgeError::Network(format!("create_mint: account {mint_key} already in use")));
        }
        ledger.debit(&payer.pubkey(), MINT_RENT_LAMPORTS + 2 * SIGNATURE_FEE_LAMPORTS, "create_mint")?;
        ledger.lamports.insert(mint_key, MINT_RENT_LAMPORTS);
        ledger.mints.insert(
            mint_key,
            MintSnapshot {
                decimals,
                mint_authority: *mint_authority,
                freeze_authority: freeze_authority.copied(),
                supply: 0,
            },
        );
        Ok(ledger.record_signature())
    }

    async fn get_or_create_associated_token_account(
        &self,
        payer: &WalletKeypair,
        mint: &Pubkey,
        owner: &Pubkey,
    ) -> ForgeResult<Pubkey> {
        let account = associated_token_address(owner, mint)?;
        let mut state = self.chain.state.lock();
        state.record(ChainOp::CreateAssociatedAccount)?;
        let ledger = state.ledger(self.network);

        if ledger.token_accounts.contains_key(&account) {
            return Ok(account);
        }
        if !ledger.mints.contains_key(mint) {
            return Err(ForgeError::Network(format!("create_associated_token_account: invalid mint {mint}")));
        }
        ledger.debit(
            &payer.pubkey(),
            TOKEN_ACCOUNT_RENT_LAMPORTS + SIGNATURE_FEE_LAMPORTS,
            "create_associated_token_account",
        )?;
        ledger.lamports.insert(account, TOKEN_ACCOUNT_RENT_LAMPORTS);
        ledger.token_accounts.insert(
            account,
            TokenAccount {
                mint: *mint,
                owner: *owner,
                amount: 0,
            },
        );
        ledger.record_signature();
        Ok(account)
    }

    async fn mint_to(
        &self,
        payer: &WalletKeypair,
        mint: &Pubkey,
        destination: &Pubkey,
        authority: &WalletKeypair,
        amount: u64,
    ) -> ForgeResult<Signature> {
        let mut state = self.chain.state.lock();
        state.record(ChainOp::MintTo)?;
        let ledger = state.ledger(self.network);

        let authorized = match ledger.mints.get(mint) {
            Some(snapshot) => snapshot.mint_authority == authority.pubkey(),
            None => return Err(ForgeError::Network(format!("mint_to: invalid mint {mint}"))),
        };
        if !authorized {
            return Err(ForgeError::Network("mint_to: owner does not match mint authority".into()));
        }
        match ledger.token_accounts.get(destination) {
            Some(acct) if acct.mint == *mint => {}
            Some(_) => return Err(ForgeError::Network("mint_to: account not associated with this mint".into())),
            None => return Err(ForgeError::Network(format!("mint_to: invalid account {destination}"))),
        }
        let signers: u64 = if payer.pubkey() == authority.pubkey() { 1 } else { 2 };
        ledger.debit(&payer.pubkey(), signers * SIGNATURE_FEE_LAMPORTS, "mint_to")?;

        let overflow = || ForgeError::Network("mint_to: supply overflow".into());
        if let Some(snapshot) = ledger.mints.get_mut(mint) {
            snapshot.supply = snapshot.supply.checked_add(amount).ok_or_else(overflow)?;
        }
        if let Some(acct) = ledger.token_accounts.get_mut(destination) {
            acct.amount = acct.amount.checked_add(amount).ok_or_else(overflow)?;
        }
        Ok(ledger.record_signature())
    }
}
