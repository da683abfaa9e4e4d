// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Digest and signing for transaction intents.
//!
//! The node verifies a submission by hashing the canonical encoding with
//! Keccak-256, recovering the public key from the signature and comparing
//! the derived address with `from`. This module produces signatures that
//! survive exactly that check:
//!
//! - the signature is taken over the **raw** Keccak-256 digest, never over
//!   an `"\x19Ethereum Signed Message:\n"`-prefixed variant
//! - the wire form is `r (32) || s (32) || recovery_id (1)` with the
//!   recovery id normalized to `0` or `1`

use std::fmt;

use alloy::primitives::keccak256;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use super::encoding;
use super::types::{Address, SignedTransaction, TransactionIntent, ADDRESS_LENGTH};

/// Length of the wire signature in bytes.
pub const SIGNATURE_LENGTH: usize = 65;

/// Length of a digest in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Offset added to the recovery id by the Ethereum `v` convention.
const LEGACY_V_OFFSET: u8 = 27;

/// A 32-byte Keccak-256 digest.
pub type Digest = [u8; DIGEST_LENGTH];

/// Errors from key parsing and signing. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid private key: {0}")]
    InvalidKeyFormat(String),

    #[error("Signing failed: {0}")]
    SigningFailure(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
}

/// Hash canonical bytes with Keccak-256.
pub fn digest(bytes: &[u8]) -> Digest {
    keccak256(bytes).0
}

/// Map a raw recovery value to the `{0, 1}` wire convention.
///
/// Signing primitives report either `{0, 1}` or the legacy `{27, 28}`.
pub fn normalize_recovery_id(raw: u8) -> Result<u8, SignerError> {
    match raw {
        0 | 1 => Ok(raw),
        27 | 28 => Ok(raw - LEGACY_V_OFFSET),
        other => Err(SignerError::SigningFailure(format!(
            "unsupported recovery id {other}"
        ))),
    }
}

/// A 65-byte `r || s || recovery_id` signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; SIGNATURE_LENGTH]);

impl RecoverableSignature {
    /// Assemble the wire form from a 64-byte `r || s` and a raw recovery
    /// value in either convention.
    pub fn from_parts(rs: &[u8], raw_recovery_id: u8) -> Result<Self, SignerError> {
        if rs.len() != SIGNATURE_LENGTH - 1 {
            return Err(SignerError::SigningFailure(format!(
                "expected 64 signature bytes, got {}",
                rs.len()
            )));
        }
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..SIGNATURE_LENGTH - 1].copy_from_slice(rs);
        bytes[SIGNATURE_LENGTH - 1] = normalize_recovery_id(raw_recovery_id)?;
        Ok(Self(bytes))
    }

    /// Decode `0x`-prefixed (or bare) hex.
    pub fn from_hex(raw: &str) -> Result<Self, SignerError> {
        let bytes = alloy::hex::decode(raw.trim())
            .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignerError::InvalidSignature(format!(
                "expected {SIGNATURE_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        Self::from_parts(&bytes[..SIGNATURE_LENGTH - 1], bytes[SIGNATURE_LENGTH - 1])
            .map_err(|e| SignerError::InvalidSignature(e.to_string()))
    }

    /// `0x`-prefixed lowercase hex, as sent to the node.
    pub fn to_hex(&self) -> String {
        format!("0x{}", alloy::hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn r(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[32..64]
    }

    pub fn recovery_id(&self) -> u8 {
        self.0[SIGNATURE_LENGTH - 1]
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecoverableSignature")
            .field(&self.to_hex())
            .finish()
    }
}

/// Parse a 32-byte private key from hex, with or without `0x`.
///
/// Rejects zero and values at or above the curve order.
pub fn parse_private_key(raw: &str) -> Result<SigningKey, SignerError> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex.len() != 64 {
        return Err(SignerError::InvalidKeyFormat(format!(
            "expected 64 hex characters, got {}",
            hex.len()
        )));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SignerError::InvalidKeyFormat(
            "key contains non-hex characters".to_string(),
        ));
    }

    let key_bytes =
        alloy::hex::decode(hex).map_err(|e| SignerError::InvalidKeyFormat(e.to_string()))?;
    SigningKey::from_slice(&key_bytes)
        .map_err(|_| SignerError::InvalidKeyFormat("key is not a valid curve scalar".to_string()))
}

/// Derive the account address of a public key.
///
/// Keccak-256 of the uncompressed point without its `0x04` tag; the last 20
/// bytes are the address.
pub fn address_of(verifying_key: &VerifyingKey) -> Address {
    let public_key_uncompressed = verifying_key.to_encoded_point(false);
    let hash = keccak256(&public_key_uncompressed.as_bytes()[1..]);
    let mut address = [0u8; ADDRESS_LENGTH];
    address.copy_from_slice(&hash[12..]);
    Address::from_bytes(address)
}

/// Sign a digest directly (no message prefix).
pub fn sign(digest: &Digest, key: &SigningKey) -> Result<RecoverableSignature, SignerError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| SignerError::SigningFailure(e.to_string()))?;
    RecoverableSignature::from_parts(&signature.to_bytes(), recovery_id.to_byte())
}

/// [`sign`] with a hex-encoded private key.
pub fn sign_with_hex_key(
    digest: &Digest,
    private_key_hex: &str,
) -> Result<RecoverableSignature, SignerError> {
    let key = parse_private_key(private_key_hex)?;
    sign(digest, &key)
}

/// Recover the signer's address from a digest and signature.
pub fn recover_address(
    digest: &Digest,
    signature: &RecoverableSignature,
) -> Result<Address, SignerError> {
    let bytes = signature.as_bytes();
    let sig = Signature::from_slice(&bytes[..SIGNATURE_LENGTH - 1])
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(signature.recovery_id()).ok_or_else(|| {
        SignerError::InvalidSignature(format!("recovery id {}", signature.recovery_id()))
    })?;
    let verifying_key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&verifying_key))
}

/// Encode, hash and sign an intent.
pub fn sign_intent(
    intent: TransactionIntent,
    key: &SigningKey,
) -> Result<SignedTransaction, SignerError> {
    let digest = digest(&encoding::encode(&intent));
    let signature = sign(&digest, key)?;
    Ok(SignedTransaction::new(intent, signature))
}

/// Run the node's acceptance check locally: the signature must recover to
/// the intent's `from` address.
pub fn verify(signed: &SignedTransaction) -> Result<bool, SignerError> {
    let digest = digest(&encoding::encode(signed.intent()));
    let recovered = recover_address(&digest, signed.signature())?;
    Ok(&recovered == signed.intent().from())
}
