//! # Token Registry
//!
//! A record of every token mint created through MintForge, kept as one JSON
//! file per mint under `<root>/<network>/<mint>.json`. Partitions never mix:
//! listing devnet shows devnet records only.
//!
//! Persisting is idempotent. Writing the same record twice is a no-op.
//! Writing a *different* record for a mint that is already registered is a
//! conflict, because a mint has exactly one creator and one token account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::crypto::keys::Pubkey;
use crate::error::{ForgeError, ForgeResult};
use crate::network::Network;

/// A created token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub wallet_address: String,
    pub token_mint_address: String,
    pub token_account: String,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// A record stamped with the current time.
    pub fn new(wallet_address: impl Into<String>, token_mint_address: impl Into<String>, token_account: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            token_mint_address: token_mint_address.into(),
            token_account: token_account.into(),
            created_at: Utc::now(),
        }
    }

    /// Same wallet, mint and account. Timestamps are ignored.
    pub fn same_token(&self, other: &TokenRecord) -> bool {
        self.wallet_address == other.wallet_address
            && self.token_mint_address == other.token_mint_address
            && self.token_account == other.token_account
    }
}

#[derive(Debug, Clone)]
pub struct TokenRegistry {
    root: PathBuf,
}

impl TokenRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn partition(&self, network: Network) -> PathBuf {
        self.root.join(network.as_str())
    }

    fn record_path(&self, network: Network, mint: &Pubkey) -> PathBuf {
        self.partition(network).join(format!("{mint}.json"))
    }

    /// Store `record` in `network`'s partition.
    pub fn persist(&self, network: Network, record: &TokenRecord) -> ForgeResult<()> {
        let mint: Pubkey = record.token_mint_address.parse().map_err(|_| {
            ForgeError::InvalidInput(format!("invalid token mint address '{}'", record.token_mint_address))
        })?;

        // An unparsable file is invisible to `list`, so it is replaced here too.
        match self.get(network, &mint) {
            Ok(Some(existing)) if existing.same_token(record) => {
                debug!(%mint, %network, "token already registered");
                return Ok(());
            }
            Ok(Some(_)) => {
                return Err(ForgeError::Conflict(format!(
                    "mint {mint} is already registered on {network} with a different wallet or account"
                )));
            }
            Ok(None) => {}
            Err(ForgeError::Serialization(e)) => {
                warn!(%mint, %network, error = %e, "replacing unreadable token record");
            }
            Err(e) => return Err(e),
        }

        fs::create_dir_all(self.partition(network))?;
        fs::write(self.record_path(network, &mint), serde_json::to_string_pretty(record)?)?;
        info!(%mint, %network, wallet = %record.wallet_address, "token registered");
        Ok(())
    }

    /// The record for `mint`, if registered.
    pub fn get(&self, network: Network, mint: &Pubkey) -> ForgeResult<Option<TokenRecord>> {
        match fs::read_to_string(self.record_path(network, mint)) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All records in `network`'s partition, oldest first. A partition that
    /// was never written lists as empty. Unreadable files are skipped with
    /// a warning so one bad file does not hide the rest.
    pub fn list(&self, network: Network) -> ForgeResult<Vec<TokenRecord>> {
        let entries = match fs::read_dir(self.partition(network)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(ForgeError::from)
                .and_then(|contents| serde_json::from_str::<TokenRecord>(&contents).map_err(ForgeError::from));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable token record"),
            }
        }
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.token_mint_address.cmp(&b.token_mint_address))
        });
        Ok(records)
    }
}
