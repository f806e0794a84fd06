//! JSON-RPC implementation of [`ChainClient`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::chain::programs;
use crate::chain::rpc::{RpcTransport, WithContext};
use crate::chain::transaction::{Blockhash, Instruction, Message, Transaction};
use crate::chain::{ChainClient, ChainConnector};
use crate::config::{ForgeConfig, MINT_ACCOUNT_LEN};
use crate::crypto::keys::{Pubkey, Signature, WalletKeypair};
use crate::error::{ForgeError, ForgeResult};
use crate::network::{Commitment, NetworkContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    #[serde(default)]
    err: Option<serde_json::Value>,
    #[serde(default)]
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestBlockhash {
    blockhash: String,
}

/// Talks to one cluster over JSON-RPC.
pub struct RpcChainClient {
    transport: RpcTransport,
    commitment: Commitment,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl RpcChainClient {
    pub fn new(
        http: reqwest::Client,
        context: &NetworkContext,
        confirm_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport: RpcTransport::new(http, context.rpc_url.clone()),
            commitment: context.commitment,
            confirm_timeout,
            poll_interval,
        }
    }

    fn commitment_config(&self) -> serde_json::Value {
        json!({ "commitment": self.commitment.as_str() })
    }

    async fn latest_blockhash(&self) -> ForgeResult<Blockhash> {
        let latest: WithContext<LatestBlockhash> = self
            .transport
            .call("getLatestBlockhash", json!([self.commitment_config()]))
            .await?;
        latest.value.blockhash.parse()
    }

    async fn minimum_balance_for_rent_exemption(&self, space: u64) -> ForgeResult<u64> {
        self.transport
            .call("getMinimumBalanceForRentExemption", json!([space]))
            .await
    }

    async fn account_exists(&self, address: &Pubkey) -> ForgeResult<bool> {
        let info: WithContext<Option<serde_json::Value>> = self
            .transport
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;
        Ok(info.value.is_some())
    }

    /// Compile, sign, submit and confirm.
    async fn send_and_confirm(
        &self,
        instructions: &[Instruction],
        payer: &WalletKeypair,
        signers: &[&WalletKeypair],
    ) -> ForgeResult<Signature> {
        let blockhash = self.latest_blockhash().await?;
        let message = Message::compile(instructions, &payer.pubkey(), blockhash)?;
        let tx = Transaction::sign(&message, signers)?;

        let submitted: String = self
            .transport
            .call(
                "sendTransaction",
                json!([
                    tx.to_base58()?,
                    { "encoding": "base58", "preflightCommitment": self.commitment.as_str() }
                ]),
            )
            .await?;
        let signature: Signature = submitted
            .parse()
            .map_err(|_| ForgeError::Network(format!("sendTransaction returned bad signature '{submitted}'")))?;
        debug!(%signature, "transaction submitted");

        self.confirm_transaction(&signature).await?;
        Ok(signature)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_balance(&self, address: &Pubkey) -> ForgeResult<u64> {
        let balance: WithContext<u64> = self
            .transport
            .call("getBalance", json!([address.to_string(), self.commitment_config()]))
            .await?;
        Ok(balance.value)
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> ForgeResult<Signature> {
        let submitted: String = self
            .transport
            .call(
                "requestAirdrop",
                json!([address.to_string(), lamports, self.commitment_config()]),
            )
            .await?;
        submitted
            .parse()
            .map_err(|_| ForgeError::Network(format!("requestAirdrop returned bad signature '{submitted}'")))
    }

    async fn confirm_transaction(&self, signature: &Signature) -> ForgeResult<()> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
                .transport
                .call(
                    "getSignatureStatuses",
                    json!([[signature.to_string()], { "searchTransactionHistory": true }]),
                )
                .await?;

            if let Some(Some(status)) = statuses.value.into_iter().next() {
                if let Some(err) = status.err {
                    return Err(ForgeError::Network(format!("transaction {signature} failed: {err}")));
                }
                let reached = status
                    .confirmation_status
                    .as_deref()
                    .map(|s| self.commitment.is_satisfied_by(s))
                    .unwrap_or(false);
                if reached {
                    debug!(%signature, "transaction confirmed");
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(ForgeError::Network(format!(
                    "timed out after {:?} waiting for {signature} to reach {}",
                    self.confirm_timeout,
                    self.commitment.as_str()
                )));
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn create_mint(
        &self,
        payer: &WalletKeypair,
        mint: &WalletKeypair,
        mint_authority: &Pubkey,
        freeze_authority: Option<&Pubkey>,
        decimals: u8,
    ) -> ForgeResult<Signature> {
        let rent = self.minimum_balance_for_rent_exemption(MINT_ACCOUNT_LEN).await?;
        let instructions = [
            programs::create_account(
                &payer.pubkey(),
                &mint.pubkey(),
                rent,
                MINT_ACCOUNT_LEN,
                &programs::TOKEN_PROGRAM_ID,
            ),
            programs::initialize_mint2(&mint.pubkey(), mint_authority, freeze_authority, decimals),
        ];
        let signature = self.send_and_confirm(&instructions, payer, &[payer, mint]).await?;
        info!(mint = %mint.pubkey(), %signature, "mint created");
        Ok(signature)
    }

    async fn get_or_create_associated_token_account(
        &self,
        payer: &WalletKeypair,
        mint: &Pubkey,
        owner: &Pubkey,
    ) -> ForgeResult<Pubkey> {
        let account = programs::associated_token_address(owner, mint)?;
        if self.account_exists(&account).await? {
            debug!(%account, "associated token account already exists");
            return Ok(account);
        }
        let instruction =
            programs::create_associated_token_account_idempotent(&payer.pubkey(), &account, owner, mint);
        self.send_and_confirm(&[instruction], payer, &[payer]).await?;
        info!(%account, %mint, "associated token account created");
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
        let instruction = programs::mint_to(mint, destination, &authority.pubkey(), amount);
        self.send_and_confirm(&[instruction], payer, &[payer, authority]).await
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Builds [`RpcChainClient`]s that share one pooled HTTP client.
#[derive(Clone)]
pub struct RpcConnector {
    http: reqwest::Client,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl RpcConnector {
    pub fn new(config: &ForgeConfig) -> ForgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.rpc_timeout)
            .build()
            .map_err(|e| ForgeError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            confirm_timeout: config.confirm_timeout,
            poll_interval: config.confirm_poll_interval,
        })
    }
}

impl ChainConnector for RpcConnector {
    fn connect(&self, context: &NetworkContext) -> ForgeResult<Arc<dyn ChainClient>> {
        Ok(Arc::new(RpcChainClient::new(
            self.http.clone(),
            context,
            self.confirm_timeout,
            self.poll_interval,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkSelector;

    #[test]
    fn signature_status_tolerates_missing_fields() {
        let status: SignatureStatus = serde_json::from_value(json!({
            "slot": 1, "confirmations": null, "err": null, "confirmationStatus": "confirmed"
        }))
        .unwrap();
        assert!(status.err.is_none());
        assert_eq!(status.confirmation_status.as_deref(), Some("confirmed"));

        let bare: SignatureStatus = serde_json::from_value(json!({ "slot": 1 })).unwrap();
        assert!(bare.confirmation_status.is_none());
    }

    #[test]
    fn failed_status_carries_error() {
        let status: SignatureStatus = serde_json::from_value(json!({
            "err": { "InstructionError": [0, { "Custom": 1 }] },
            "confirmationStatus": "processed"
        }))
        .unwrap();
        assert!(status.err.is_some());
    }

    #[test]
    fn connector_binds_client_to_context_endpoint() {
        let config = ForgeConfig::default();
        let selector = NetworkSelector::new("http://127.0.0.1:8899", "http://127.0.0.1:9899").unwrap();
        let connector = RpcConnector::new(&config).unwrap();
        let devnet = selector.resolve("devnet").unwrap();

        let client = RpcChainClient::new(
            connector.http.clone(),
            &devnet,
            config.confirm_timeout,
            config.confirm_poll_interval,
        );
        assert_eq!(client.transport.url(), "http://127.0.0.1:8899");
        assert!(connector.connect(&devnet).is_ok());
    }
}
