// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger types and wire shapes.
//!
//! The node emits records with capitalised field names
//! (`Number`, `PrevHash`, `From`, ...). Every record here decodes from both
//! that form and camelCase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

use super::signing::RecoverableSignature;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Largest integer an `f64` represents exactly (2^53).
const MAX_EXACT_F64_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Errors raised while building ledger values from user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

// =============================================================================
// Address
// =============================================================================

/// A syntactically valid account address: `0x` followed by 40 hex digits.
///
/// The text is kept exactly as supplied because it is part of the signed
/// payload; comparisons between addresses are case-insensitive.
#[derive(Debug, Clone, Eq)]
pub struct Address(String);

impl Address {
    /// Validate and wrap an address string.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let trimmed = raw.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| TypeError::InvalidAddress(format!("{trimmed} (missing 0x prefix)")))?;

        if hex.len() != ADDRESS_LENGTH * 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidAddress(format!(
                "{trimmed} (expected 40 hex characters)"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Build the EIP-55 checksummed address for raw address bytes.
    pub fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(alloy::primitives::Address::from(bytes).to_checksum(None))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// Amount
// =============================================================================

/// A non-negative transfer amount.
///
/// Integral values are kept as integers so that they serialize without a
/// fractional part; the node verifier formats amounts with `%d`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    Whole(u64),
    Fractional(f64),
}

impl Amount {
    /// Build an amount from a float, collapsing integral values to `Whole`.
    pub fn from_f64(value: f64) -> Result<Self, TypeError> {
        if !value.is_finite() || value < 0.0 {
            return Err(TypeError::InvalidAmount(value.to_string()));
        }
        if value.fract() == 0.0 && value <= MAX_EXACT_F64_INTEGER {
            Ok(Amount::Whole(value as u64))
        } else {
            Ok(Amount::Fractional(value))
        }
    }

    /// Parse user input such as `10` or `2.5`.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let trimmed = raw.trim();
        if let Ok(whole) = trimmed.parse::<u64>() {
            return Ok(Amount::Whole(whole));
        }
        let value: f64 = trimmed
            .parse()
            .map_err(|_| TypeError::InvalidAmount(trimmed.to_string()))?;
        Self::from_f64(value)
    }

    pub fn is_positive(&self) -> bool {
        match *self {
            Amount::Whole(n) => n > 0,
            Amount::Fractional(v) => v > 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Amount::Whole(n) => n as f64,
            Amount::Fractional(v) => v,
        }
    }

    /// Whether this amount is larger than an integer balance.
    pub fn exceeds(&self, balance: u64) -> bool {
        match *self {
            Amount::Whole(n) => n > balance,
            Amount::Fractional(v) => v > balance as f64,
        }
    }

    /// JSON number text: integers without a decimal point, fractions in
    /// their shortest round-trip form.
    pub fn to_json_number(&self) -> String {
        match *self {
            Amount::Whole(n) => n.to_string(),
            Amount::Fractional(v) => serde_json::Number::from_f64(v)
                .map(|n| n.to_string())
                .unwrap_or_else(|| v.to_string()),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_number())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Amount::Whole(n) => serializer.serialize_u64(n),
            Amount::Fractional(v) => serializer.serialize_f64(v),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let number = serde_json::Number::deserialize(deserializer)?;
        if let Some(whole) = number.as_u64() {
            return Ok(Amount::Whole(whole));
        }
        let value = number
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("amount is not a number"))?;
        Amount::from_f64(value).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// What the user wants to transfer, before signing.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionIntent {
    from: Address,
    to: Address,
    amount: Amount,
    nonce: u64,
}

impl TransactionIntent {
    /// Build an intent; the amount must be strictly positive.
    pub fn new(from: Address, to: Address, amount: Amount, nonce: u64) -> Result<Self, TypeError> {
        if !amount.is_positive() {
            return Err(TypeError::InvalidAmount(format!(
                "{amount} (must be greater than zero)"
            )));
        }
        Ok(Self {
            from,
            to,
            amount,
            nonce,
        })
    }

    pub fn from(&self) -> &Address {
        &self.from
    }

    pub fn to(&self) -> &Address {
        &self.to
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

/// An intent together with its 65-byte recoverable signature.
///
/// Only produced by [`super::signing::sign_intent`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    intent: TransactionIntent,
    signature: RecoverableSignature,
}

impl SignedTransaction {
    pub(crate) fn new(intent: TransactionIntent, signature: RecoverableSignature) -> Self {
        Self { intent, signature }
    }

    pub fn intent(&self) -> &TransactionIntent {
        &self.intent
    }

    pub fn signature(&self) -> &RecoverableSignature {
        &self.signature
    }

    /// The `/submitTx` request body.
    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord {
            from: self.intent.from.to_string(),
            to: self.intent.to.to_string(),
            amount: self.intent.amount,
            nonce: self.intent.nonce,
            signature: self.signature.to_hex(),
        }
    }

    /// Node-side transaction id.
    pub fn id(&self) -> String {
        self.to_record().id()
    }
}

/// A transaction as the node reports it (mempool and block bodies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(alias = "From")]
    pub from: String,
    #[serde(alias = "To")]
    pub to: String,
    #[serde(alias = "Amount")]
    pub amount: Amount,
    #[serde(alias = "Nonce")]
    pub nonce: u64,
    #[serde(alias = "Signature", default)]
    pub signature: String,
}

impl TransactionRecord {
    /// Lowercase hex SHA-256 of `from + to + amount + nonce + signature`,
    /// the identifier the node uses to evict mined transactions.
    pub fn id(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}",
            self.from, self.to, self.amount, self.nonce, self.signature
        );
        alloy::hex::encode(Sha256::digest(preimage.as_bytes()))
    }
}

/// A signed transaction the node has accepted but not yet mined.
pub type MempoolEntry = TransactionRecord;

// =============================================================================
// Blocks
// =============================================================================

/// A committed block. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(alias = "Number")]
    pub number: u64,
    #[serde(alias = "Hash", default)]
    pub hash: String,
    #[serde(alias = "PrevHash", default)]
    pub prev_hash: String,
    #[serde(alias = "Timestamp", default)]
    pub timestamp: i64,
    #[serde(alias = "Nonce", default)]
    pub nonce: u64,
    #[serde(alias = "Transactions", default, deserialize_with = "null_as_empty")]
    pub transactions: Vec<TransactionRecord>,
}

impl Block {
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

/// Decode a JSON `null` sequence as empty.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// RPC responses
// =============================================================================

/// `GET /balance?addr=` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

/// `POST /submitTx` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub status: String,
}

/// `POST /faucet` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetReceipt {
    pub status: String,
    pub address: String,
    pub amount: u64,
    pub balance: u64,
}

/// `POST /addBalance` and `POST /api/resetBalance` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdate {
    #[serde(default)]
    pub success: bool,
    pub new_balance: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR_A: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const ADDR_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn address_parse_accepts_valid_and_rejects_malformed() {
        assert!(Address::parse(ADDR_A).is_ok());
        assert!(Address::parse(&format!("  {ADDR_B} ")).is_ok());
        assert!(Address::parse("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ").is_err());
    }

    #[test]
    fn address_equality_ignores_case_but_keeps_text() {
        let upper = Address::parse(ADDR_A).unwrap();
        let lower = Address::parse(&ADDR_A.to_lowercase()).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), ADDR_A);
    }

    #[test]
    fn amount_parse_collapses_integral_values() {
        assert_eq!(Amount::parse("10").unwrap(), Amount::Whole(10));
        assert_eq!(Amount::parse("10.0").unwrap(), Amount::Whole(10));
        assert_eq!(Amount::parse("2.5").unwrap(), Amount::Fractional(2.5));
        assert!(Amount::parse("-1").is_err());
        assert!(Amount::parse("NaN").is_err());
        assert!(Amount::parse("ten").is_err());
    }

    #[test]
    fn amount_json_number_has_no_fraction_when_integral() {
        assert_eq!(Amount::Whole(10).to_json_number(), "10");
        assert_eq!(Amount::Fractional(0.5).to_json_number(), "0.5");
        assert_eq!(serde_json::to_string(&Amount::Whole(7)).unwrap(), "7");
    }

    #[test]
    fn amount_exceeds_balance() {
        assert!(Amount::Whole(11).exceeds(10));
        assert!(!Amount::Whole(10).exceeds(10));
        assert!(Amount::Fractional(10.5).exceeds(10));
    }

    #[test]
    fn intent_rejects_zero_amount() {
        let from = Address::parse(ADDR_A).unwrap();
        let to = Address::parse(ADDR_B).unwrap();
        let err = TransactionIntent::new(from, to, Amount::Whole(0), 1).unwrap_err();
        assert!(matches!(err, TypeError::InvalidAmount(_)));
    }

    #[test]
    fn block_decodes_go_field_names() {
        let raw = r#"{"Number":3,"PrevHash":"0xp","Timestamp":1700000000,
            "Transactions":null,"Nonce":42,"Hash":"0xh"}"#;
        let block: Block = serde_json::from_str(raw).unwrap();
        assert_eq!(block.number, 3);
        assert_eq!(block.prev_hash, "0xp");
        assert_eq!(block.hash, "0xh");
        assert_eq!(block.nonce, 42);
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn block_decodes_camel_case() {
        let raw = r#"{"number":1,"hash":"h1","prevHash":"h0","timestamp":5,"nonce":0,
            "transactions":[{"from":"a","to":"b","amount":3,"nonce":9,"signature":"0x"}]}"#;
        let block: Block = serde_json::from_str(raw).unwrap();
        assert_eq!(block.tx_count(), 1);
        assert_eq!(block.transactions[0].amount, Amount::Whole(3));
    }

    #[test]
    fn record_id_matches_node_formula() {
        let record = TransactionRecord {
            from: "a".to_string(),
            to: "b".to_string(),
            amount: Amount::Whole(10),
            nonce: 1,
            signature: "sig".to_string(),
        };
        let expected = alloy::hex::encode(Sha256::digest(b"ab101sig"));
        assert_eq!(record.id(), expected);
    }
}
