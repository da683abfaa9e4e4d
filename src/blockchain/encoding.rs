// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Canonical transaction encoding.
//!
//! The node recomputes the signed message as
//! `{"from":"<from>","to":"<to>","amount":<amount>,"nonce":<nonce>}`: compact
//! JSON, keys in exactly this order, integral numbers without a decimal
//! point. Any deviation invalidates every signature produced against it, so
//! the layout is written out field by field rather than left to a
//! serializer's key ordering.

use serde_json::Value;

use super::types::TransactionIntent;

/// Serialize an intent to the bytes that get hashed and signed.
pub fn encode(intent: &TransactionIntent) -> Vec<u8> {
    encode_to_string(intent).into_bytes()
}

/// [`encode`] as a string, for logging and display.
pub fn encode_to_string(intent: &TransactionIntent) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("{\"from\":");
    out.push_str(&json_string(intent.from().as_str()));
    out.push_str(",\"to\":");
    out.push_str(&json_string(intent.to().as_str()));
    out.push_str(",\"amount\":");
    out.push_str(&intent.amount().to_json_number());
    out.push_str(",\"nonce\":");
    out.push_str(&intent.nonce().to_string());
    out.push('}');
    out
}

/// Quote and escape a string the way `JSON.stringify` does.
fn json_string(raw: &str) -> String {
    Value::from(raw).to_string()
}
