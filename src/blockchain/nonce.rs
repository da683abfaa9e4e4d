// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction nonce selection.
//!
//! The node accepts a transaction when its nonce is strictly greater than
//! the last nonce it recorded for the sender, and exposes no endpoint to
//! read that value. Nonces are therefore wall-clock milliseconds, bumped so
//! they never repeat or go backwards within one session. Two sessions
//! submitting for the same sender in the same millisecond can still
//! collide; the node rejects the loser.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Session-scoped source of timestamp nonces.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce based on the current time.
    pub fn next(&self) -> u64 {
        let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.next_at(now_ms)
    }

    /// Next nonce for a given clock reading: `max(now_ms, last + 1)`.
    pub fn next_at(&self, now_ms: u64) -> u64 {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(current.saturating_add(1));
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }

    /// Record an explicitly chosen nonce so later timestamp nonces stay above it.
    pub fn observe(&self, nonce: u64) {
        self.last.fetch_max(nonce, Ordering::AcqRel);
    }
}
