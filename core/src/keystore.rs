//! # Wallet Keystore
//!
//! One file per wallet, named `<address>.json`, holding the 64-byte keypair
//! as a JSON array of integers. That is the `solana-keygen` format, so
//! `solana balance -k wallets/<address>.json` just works.
//!
//! Wallet names are addresses. A name that does not parse as one cannot
//! possibly have a file here, so it is reported as not found before the
//! filesystem is touched. This also keeps `../` and friends out of paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::crypto::keys::{KeyError, Pubkey, WalletKeypair};
use crate::error::{ForgeError, ForgeResult};

#[derive(Debug, Clone)]
pub struct Keystore {
    root: PathBuf,
}

impl Keystore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn wallet_path(&self, address: &Pubkey) -> PathBuf {
        self.root.join(format!("{address}.json"))
    }

    /// Generate a new wallet and persist it. The file is written before the
    /// keypair is returned, so a wallet that exists in memory exists on disk.
    pub fn generate(&self) -> ForgeResult<WalletKeypair> {
        let keypair = WalletKeypair::generate();
        self.persist(&keypair)?;
        info!(wallet = %keypair.pubkey(), "generated wallet");
        Ok(keypair)
    }

    /// Load a wallet by name (its base58 address).
    pub fn load(&self, name: &str) -> ForgeResult<WalletKeypair> {
        let name = name.trim();
        let address: Pubkey = name
            .parse()
            .map_err(|_| ForgeError::NotFound(format!("wallet '{name}'")))?;

        let path = self.wallet_path(&address);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ForgeError::NotFound(format!("wallet '{name}'")));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes: Vec<u8> = serde_json::from_str(&contents)?;
        let keypair = WalletKeypair::from_keypair_bytes(&bytes)?;
        if keypair.pubkey() != address {
            // File renamed or copied over another wallet's name.
            return Err(KeyError::KeypairMismatch.into());
        }
        debug!(wallet = %address, "loaded wallet");
        Ok(keypair)
    }

    /// Addresses of all stored wallets, sorted. A missing directory is an
    /// empty keystore.
    pub fn list(&self) -> ForgeResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut wallets = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                wallets.push(stem.to_string());
            }
        }
        wallets.sort();
        Ok(wallets)
    }

    fn persist(&self, keypair: &WalletKeypair) -> ForgeResult<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.wallet_path(&keypair.pubkey());
        let bytes = keypair.to_keypair_bytes().to_vec();
        fs::write(&path, serde_json::to_string(&bytes)?)?;
        restrict_permissions(&path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
