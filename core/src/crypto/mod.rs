//! # Cryptographic Primitives
//!
//! Ed25519 keys, base58 addresses and program-derived addresses. Hashing for
//! PDAs uses SHA-256 because that is what the runtime uses.

pub mod keys;

pub use keys::{KeyError, Pubkey, Signature, WalletKeypair};
