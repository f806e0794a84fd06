// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MintForge Core Library
//!
//! Wallets, balances, faucet requests and SPL token mints on a Solana
//! cluster, behind one small facade. The HTTP node is a thin skin over
//! [`service::MintForge`]; everything that matters lives here.
//!
//! Two networks exist: devnet, where SOL is free and mistakes are cheap, and
//! mainnet, where neither is true. Every operation is told which one it runs
//! against, per call. Nothing about the selected network is remembered
//! between calls, so two requests can never trip over each other's choice.
//!
//! ## Architecture
//!
//! - **network**: Network identifiers, RPC endpoints, and the selector
//!   that turns a client-supplied id into a context.
//! - **crypto**: Ed25519 keypairs, base58 addresses, program-derived addresses.
//! - **keystore**: Wallet keypairs on disk, one JSON file per address.
//! - **balance**: SOL balance lookups.
//! - **faucet**: Devnet airdrops. Mainnet says no.
//! - **registry**: Created-token records, partitioned by network.
//! - **provisioner**: The create-token workflow, as an explicit state machine.
//! - **chain**: Everything that talks to a cluster: JSON-RPC transport,
//!   transaction wire format, token program instructions, and an in-memory
//!   simulated cluster for tests and offline runs.
//! - **service**: The facade that ties the above together.
//! - **config**: Constants and runtime configuration.
//! - **error**: The error taxonomy every module reports in.

pub mod balance;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod faucet;
pub mod keystore;
pub mod network;
pub mod provisioner;
pub mod registry;
pub mod service;

pub use config::{ForgeConfig, FundingMode};
pub use error::{ForgeError, ForgeResult, PolicyViolation};
pub use network::{Network, NetworkContext, NetworkSelector};
pub use provisioner::{ProvisionError, ProvisionState};
pub use registry::TokenRecord;
pub use service::MintForge;
