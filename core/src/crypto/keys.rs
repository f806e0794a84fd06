//! # Key Management
//!
//! Ed25519 keypairs, public keys and signatures in the shapes Solana uses.
//!
//! A wallet is an Ed25519 keypair. Its address is the base58 encoding of the
//! 32-byte public key, and its on-disk secret is the 64-byte "keypair bytes"
//! layout used by `solana-keygen`: the 32-byte seed followed by the 32-byte
//! public key. Keeping that layout means wallet files written here can be fed
//! straight into the Solana CLI and vice versa.
//!
//! Key bytes are never logged. `Debug` on [`WalletKeypair`] prints the
//! address only.

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of the serialized keypair (seed || public key).
pub const KEYPAIR_LENGTH: usize = 64;

/// Length of an Ed25519 public key, and therefore of a Solana address.
pub const PUBKEY_LENGTH: usize = 32;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Maximum number of seeds accepted by program-address derivation.
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single program-address seed.
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Errors that can occur during key operations.
///
/// Messages say what was wrong with the input, never what the input was.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid keypair bytes: expected {KEYPAIR_LENGTH} bytes, got {0}")]
    InvalidKeypairLength(usize),

    #[error("invalid public key: not a {PUBKEY_LENGTH}-byte base58 string")]
    InvalidPublicKey,

    #[error("invalid signature: not a {SIGNATURE_LENGTH}-byte base58 string")]
    InvalidSignature,

    #[error("keypair validation failed: public key does not match secret key")]
    KeypairMismatch,

    #[error("invalid program address seeds")]
    InvalidSeeds,
}

// ---------------------------------------------------------------------------
// WalletKeypair
// ---------------------------------------------------------------------------

/// An Ed25519 keypair that owns a wallet (or a freshly created mint account).
///
/// `WalletKeypair` does not implement `Serialize`. Writing secret material to
/// disk goes through [`to_keypair_bytes`](Self::to_keypair_bytes) in the
/// keystore and nowhere else.
///
/// # Examples
///
/// ```
/// use mintforge_core::crypto::keys::WalletKeypair;
///
/// let kp = WalletKeypair::generate();
/// let restored = WalletKeypair::from_keypair_bytes(&kp.to_keypair_bytes()).unwrap();
/// assert_eq!(kp.address(), restored.address());
/// ```
pub struct WalletKeypair {
    signing_key: SigningKey,
}

impl WalletKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuild a keypair from the 64-byte `seed || pubkey` layout.
    ///
    /// The public half is re-derived from the seed and compared with the
    /// stored one, so a file with a tampered or truncated tail is rejected
    /// instead of producing a wallet with a different address.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEYPAIR_LENGTH {
            return Err(KeyError::InvalidKeypairLength(bytes.len()));
        }
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        seed.copy_from_slice(&bytes[..SECRET_KEY_LENGTH]);
        let keypair = Self::from_seed(&seed);

        if keypair.pubkey().as_bytes()[..] != bytes[SECRET_KEY_LENGTH..] {
            return Err(KeyError::KeypairMismatch);
        }
        Ok(keypair)
    }

    /// Export the 64-byte `seed || pubkey` layout.
    ///
    /// **Handle with care.** This is the whole wallet.
    pub fn to_keypair_bytes(&self) -> [u8; KEYPAIR_LENGTH] {
        let mut out = [0u8; KEYPAIR_LENGTH];
        out[..SECRET_KEY_LENGTH].copy_from_slice(&self.signing_key.to_bytes());
        out[SECRET_KEY_LENGTH..].copy_from_slice(&self.signing_key.verifying_key().to_bytes());
        out
    }

    /// The public key of this keypair.
    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.signing_key.verifying_key().to_bytes())
    }

    /// The base58 wallet address.
    pub fn address(&self) -> String {
        self.pubkey().to_string()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.pubkey().verify(message, signature)
    }
}

impl Clone for WalletKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for WalletKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletKeypair({})", self.pubkey())
    }
}

impl PartialEq for WalletKeypair {
    /// Keypairs compare by public key. Secret material is never compared.
    fn eq(&self, other: &Self) -> bool {
        self.pubkey() == other.pubkey()
    }
}

impl Eq for WalletKeypair {}

// ---------------------------------------------------------------------------
// Pubkey
// ---------------------------------------------------------------------------

/// A 32-byte account address.
///
/// Not every `Pubkey` is an Ed25519 point: program-derived addresses are
/// deliberately off the curve so that no private key can ever sign for them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; PUBKEY_LENGTH]);

impl Pubkey {
    /// Wrap raw bytes. `const` so program IDs can be declared as constants.
    pub const fn new_from_array(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBKEY_LENGTH] {
        &self.0
    }

    /// Whether these bytes decompress to a point on the Ed25519 curve.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }

    /// Verify an Ed25519 signature made by this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Hash `seeds || program_id || "ProgramDerivedAddress"` into an address.
    ///
    /// Returns `Err(KeyError::InvalidSeeds)` if the seeds are out of bounds or
    /// the hash lands on the curve (a valid keypair could sign for it).
    pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Pubkey, KeyError> {
        if seeds.len() > MAX_SEEDS || seeds.iter().any(|s| s.len() > MAX_SEED_LEN) {
            return Err(KeyError::InvalidSeeds);
        }
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let candidate = Pubkey(hasher.finalize().into());

        if candidate.is_on_curve() {
            return Err(KeyError::InvalidSeeds);
        }
        Ok(candidate)
    }

    /// Find the first off-curve program address, searching bump seeds from
    /// 255 downwards. Returns the address and the bump that produced it.
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8), KeyError> {
        if seeds.len() >= MAX_SEEDS {
            return Err(KeyError::InvalidSeeds);
        }
        for bump in (0..=u8::MAX).rev() {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);
            if let Ok(address) = Self::create_program_address(&with_bump, program_id) {
                return Ok((address, bump));
            }
        }
        Err(KeyError::InvalidSeeds)
    }
}

impl FromStr for Pubkey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidPublicKey)?;
        let bytes: [u8; PUBKEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// A 64-byte Ed25519 signature. Also serves as the transaction ID on-chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }
}

impl FromStr for Signature {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidSignature)?;
        let bytes: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_string();
        write!(f, "Signature({}...)", &s[..s.len().min(12)])
    }
}
