// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger Dashboard - Wallet Client for a Polled Ledger Node
//!
//! Holds one secp256k1 key per session, signs canonical transaction intents
//! and submits them to a JSON/HTTP ledger node, while a background poller
//! keeps a local view of blocks, mempool and balances.
//!
//! ## Modules
//!
//! - `blockchain` - Wire types, canonical encoding, signing, nonces, node client
//! - `storage` - Key material and the persisted wallet record
//! - `chain_view` - Client-side chain snapshot
//! - `poller` - Chain-state polling with cancellation
//! - `terminal` - Command interpreter
//! - `state` - Session context

pub mod blockchain;
pub mod chain_view;
pub mod config;
pub mod error;
pub mod poller;
pub mod state;
pub mod storage;
pub mod terminal;

#[cfg(test)]
pub(crate) mod test_support;
