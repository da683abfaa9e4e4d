// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger integration.
//!
//! This module provides functionality for:
//! - Canonical encoding of transaction intents
//! - Keccak-256 digests and recoverable secp256k1 signatures
//! - Nonce selection
//! - The ledger node RPC client

pub mod client;
pub mod encoding;
pub mod nonce;
pub mod signing;
pub mod types;

pub use client::{NodeClient, RpcError};
pub use signing::{RecoverableSignature, SignerError};
pub use types::*;
