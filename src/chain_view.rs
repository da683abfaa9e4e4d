// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client-side snapshot of the chain.
//!
//! Each slice (blocks, mempool, per-address balances) is replaced wholesale
//! by the poller; nothing is merged incrementally. Readers take the view's
//! read lock and never mutate it.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::blockchain::types::{Block, MempoolEntry};

/// Default number of addresses whose balance is cached.
pub const DEFAULT_BALANCE_CAPACITY: usize = 64;

/// The kinds of data the poller keeps fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Blocks,
    Mempool,
    Balance,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataKind::Blocks => "blocks",
            DataKind::Mempool => "mempool",
            DataKind::Balance => "balance",
        };
        f.write_str(name)
    }
}

/// Transitions observed while applying fetched state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEvent {
    /// The block count grew since the previous observation.
    NewBlock {
        previous_count: usize,
        current_count: usize,
    },
}

/// A cached balance and when it was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceEntry {
    pub balance: u64,
    pub updated_at: DateTime<Utc>,
}

/// Last-polled blocks, mempool and balances for one session.
pub struct ClientChainView {
    blocks: Vec<Block>,
    mempool: Vec<MempoolEntry>,
    balances: LruCache<String, BalanceEntry>,
    errors: HashMap<DataKind, String>,
    observed_block_count: Option<usize>,
}

impl ClientChainView {
    pub fn new(balance_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(balance_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            blocks: Vec::new(),
            mempool: Vec::new(),
            balances: LruCache::new(capacity),
            errors: HashMap::new(),
            observed_block_count: None,
        }
    }

    /// Blocks, newest first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.blocks.first()
    }

    pub fn mempool(&self) -> &[MempoolEntry] {
        &self.mempool
    }

    /// Replace the block slice and sort it by number, descending.
    ///
    /// Returns [`ChainEvent::NewBlock`] when the count grew relative to the
    /// previous replacement. The first replacement only establishes the
    /// baseline; a shrinking count is accepted silently.
    pub fn replace_blocks(&mut self, mut blocks: Vec<Block>) -> Option<ChainEvent> {
        blocks.sort_by(|a, b| b.number.cmp(&a.number));
        let current_count = blocks.len();
        self.blocks = blocks;
        self.errors.remove(&DataKind::Blocks);

        let previous = self.observed_block_count.replace(current_count)?;
        (current_count > previous).then_some(ChainEvent::NewBlock {
            previous_count: previous,
            current_count,
        })
    }

    pub fn replace_mempool(&mut self, entries: Vec<MempoolEntry>) {
        self.mempool = entries;
        self.errors.remove(&DataKind::Mempool);
    }

    pub fn set_balance(&mut self, address: &str, balance: u64) {
        self.balances.put(
            address.to_string(),
            BalanceEntry {
                balance,
                updated_at: Utc::now(),
            },
        );
        self.errors.remove(&DataKind::Balance);
    }

    /// Cached balance for `address`. Keys are the exact address text, since
    /// the node keeps differently cased spellings as separate accounts.
    /// Does not touch recency.
    pub fn balance(&self, address: &str) -> Option<u64> {
        self.balance_entry(address).map(|entry| entry.balance)
    }

    pub fn balance_entry(&self, address: &str) -> Option<BalanceEntry> {
        self.balances.peek(address).copied()
    }

    pub fn record_error(&mut self, kind: DataKind, message: impl Into<String>) {
        self.errors.insert(kind, message.into());
    }

    /// Most recent fetch failure for `kind`, cleared by the next success.
    pub fn last_error(&self, kind: DataKind) -> Option<&str> {
        self.errors.get(&kind).map(String::as_str)
    }

    /// Whether every pair of consecutive held blocks links `prev_hash` to
    /// its predecessor's `hash`. Gaps in the held set are not checked.
    pub fn is_linked(&self) -> bool {
        self.blocks.windows(2).all(|pair| {
            let (newer, older) = (&pair[0], &pair[1]);
            older.number.checked_add(1) != Some(newer.number) || newer.prev_hash == older.hash
        })
    }
}

impl Default for ClientChainView {
    fn default() -> Self {
        Self::new(DEFAULT_BALANCE_CAPACITY)
    }
}

impl fmt::Debug for ClientChainView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientChainView")
            .field("blocks", &self.blocks.len())
            .field("mempool", &self.mempool.len())
            .field("balances", &self.balances.len())
            .field("errors", &self.errors)
            .finish()
    }
}
