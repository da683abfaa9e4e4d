// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Storage
//!
//! Holds the session's key material and the single persisted wallet record.
//!
//! ## Storage Layout
//!
//! ```text
//! $WALLET_FILE          # { "address": "0x…", "privateKey": "0x…" }
//! $WALLET_FILE.tmp      # transient, renamed over the record on save
//! ```
//!
//! The record is plaintext JSON with owner-only permissions on Unix.

pub mod key_store;

pub use key_store::{
    FileKeyStorage, InMemoryKeyStorage, KeyError, KeyMaterial, KeyMaterialStore, KeyStorage,
    WalletRecord,
};
