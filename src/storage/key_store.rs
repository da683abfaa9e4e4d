// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key material and the session key store.
//!
//! One [`KeyMaterial`] is active per session. Persisting it is delegated to
//! a [`KeyStorage`] backend holding at most one record, overwritten on
//! every save. The private key never leaves this module except as a
//! signature or inside that record.
//!
//! ## Record format
//!
//! ```json
//! { "address": "0x…", "privateKey": "0x…" }
//! ```
//!
//! `address` is authoritative. Records written by older tooling that name
//! the field `publicKey` are accepted when it holds an address, and are
//! rewritten with `address` on the next save. A `publicKey` next to an
//! `address` is ignored.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::blockchain::signing::{address_of, parse_private_key, SignerError};
use crate::blockchain::types::Address;

/// Draws allowed before giving up on a randomness source.
const MAX_KEY_DRAWS: usize = 64;

/// Errors from key generation, import and persistence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid private key: {0}")]
    InvalidKeyFormat(String),

    #[error("Secure randomness unavailable: {0}")]
    Randomness(String),

    #[error("Key storage error: {0}")]
    Storage(String),
}

impl From<SignerError> for KeyError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::InvalidKeyFormat(msg) => KeyError::InvalidKeyFormat(msg),
            other => KeyError::InvalidKeyFormat(other.to_string()),
        }
    }
}

// =============================================================================
// KeyMaterial
// =============================================================================

/// A private key and the address derived from it.
#[derive(Clone)]
pub struct KeyMaterial {
    signing_key: SigningKey,
    address: Address,
}

impl KeyMaterial {
    /// Generate a fresh key from the operating system's secure RNG.
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a key by rejection sampling: draw 32 bytes, keep them only
    /// if they form a scalar in `[1, n-1]`, otherwise draw again. Never
    /// reduces modulo the curve order.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, KeyError> {
        let mut candidate = [0u8; 32];
        for _ in 0..MAX_KEY_DRAWS {
            rng.try_fill_bytes(&mut candidate)
                .map_err(|e| KeyError::Randomness(e.to_string()))?;
            let drawn = SigningKey::from_slice(&candidate);
            candidate.fill(0);
            if let Ok(signing_key) = drawn {
                return Ok(Self::from_signing_key(signing_key));
            }
        }
        Err(KeyError::Randomness(format!(
            "no valid scalar after {MAX_KEY_DRAWS} draws"
        )))
    }

    /// Import a 64-hex-character key, with or without `0x`.
    pub fn from_hex(raw: &str) -> Result<Self, KeyError> {
        Ok(Self::from_signing_key(parse_private_key(raw)?))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Normalized `0x`-prefixed lowercase key hex.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", alloy::hex::encode(self.signing_key.to_bytes()))
    }

    pub fn to_record(&self) -> WalletRecord {
        WalletRecord {
            address: self.address.to_string(),
            private_key: self.private_key_hex(),
        }
    }

    /// Rebuild from a stored record. The address is re-derived from the key.
    pub fn from_record(record: &WalletRecord) -> Result<Self, KeyError> {
        let material = Self::from_hex(&record.private_key)?;
        if !record.address.is_empty()
            && !record.address.eq_ignore_ascii_case(material.address.as_str())
        {
            warn!(
                stored = %record.address,
                derived = %material.address,
                "Stored wallet address does not match its key, using derived address"
            );
        }
        Ok(material)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Persisted wallet record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredWalletRecord")]
pub struct WalletRecord {
    pub address: String,
    pub private_key: String,
}

/// On-disk shape accepted when reading. Either address field may be
/// missing, and both may be present.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredWalletRecord {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    public_key: Option<String>,
    private_key: String,
}

impl From<StoredWalletRecord> for WalletRecord {
    fn from(stored: StoredWalletRecord) -> Self {
        let non_blank = |field: Option<String>| field.filter(|value| !value.trim().is_empty());
        // `publicKey` is only trusted when it holds an address rather than
        // an encoded public key.
        let address = non_blank(stored.address)
            .or_else(|| non_blank(stored.public_key).filter(|pk| Address::parse(pk).is_ok()))
            .unwrap_or_default();
        Self {
            address,
            private_key: stored.private_key,
        }
    }
}

impl fmt::Debug for WalletRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletRecord")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Storage backends
// =============================================================================

/// Where the single wallet record lives.
pub trait KeyStorage: Send + Sync {
    fn load(&self) -> Result<Option<WalletRecord>, KeyError>;
    fn save(&self, record: &WalletRecord) -> Result<(), KeyError>;
}

/// Process-local storage; the record is gone when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryKeyStorage {
    record: Mutex<Option<WalletRecord>>,
}

impl KeyStorage for InMemoryKeyStorage {
    fn load(&self) -> Result<Option<WalletRecord>, KeyError> {
        let record = self
            .record
            .lock()
            .map_err(|_| KeyError::Storage("in-memory store poisoned".to_string()))?;
        Ok(record.clone())
    }

    fn save(&self, record: &WalletRecord) -> Result<(), KeyError> {
        let mut slot = self
            .record
            .lock()
            .map_err(|_| KeyError::Storage("in-memory store poisoned".to_string()))?;
        *slot = Some(record.clone());
        Ok(())
    }
}

/// A JSON file holding one [`WalletRecord`].
#[derive(Debug, Clone)]
pub struct FileKeyStorage {
    path: PathBuf,
}

impl FileKeyStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStorage for FileKeyStorage {
    fn load(&self) -> Result<Option<WalletRecord>, KeyError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KeyError::Storage(format!("{}: {e}", self.path.display()))),
        };
        let record = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| KeyError::Storage(format!("{}: {e}", self.path.display())))?;
        Ok(Some(record))
    }

    /// Atomic write via rename.
    fn save(&self, record: &WalletRecord) -> Result<(), KeyError> {
        let io_err = |e: std::io::Error| KeyError::Storage(format!("{}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let temp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&temp_path).map_err(io_err)?;
            restrict_permissions(&file).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, record)
                .map_err(|e| KeyError::Storage(e.to_string()))?;
            writer.flush().map_err(io_err)?;
        }

        fs::rename(&temp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}

// =============================================================================
// KeyMaterialStore
// =============================================================================

/// Owner of the session's active key. The only writer of that key.
pub struct KeyMaterialStore {
    storage: Box<dyn KeyStorage>,
    active: RwLock<Option<KeyMaterial>>,
}

impl KeyMaterialStore {
    pub fn new(storage: impl KeyStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            active: RwLock::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(InMemoryKeyStorage::default())
    }

    /// Generate a key and make it the active one. Not persisted.
    pub fn generate(&self) -> Result<KeyMaterial, KeyError> {
        let material = KeyMaterial::generate()?;
        info!(address = %material.address(), "Generated new wallet key");
        *self.write_active() = Some(material.clone());
        Ok(material)
    }

    /// Import a hex key and make it the active one. Not persisted.
    pub fn import_from_hex(&self, raw: &str) -> Result<KeyMaterial, KeyError> {
        let material = KeyMaterial::from_hex(raw)?;
        info!(address = %material.address(), "Imported wallet key");
        *self.write_active() = Some(material.clone());
        Ok(material)
    }

    /// Overwrite the stored record with `material`.
    pub fn persist(&self, material: &KeyMaterial) -> Result<(), KeyError> {
        self.storage.save(&material.to_record())
    }

    /// Load the stored record, if any, and make it the active key.
    pub fn load(&self) -> Result<Option<KeyMaterial>, KeyError> {
        let Some(record) = self.storage.load()? else {
            return Ok(None);
        };
        let material = KeyMaterial::from_record(&record)?;
        *self.write_active() = Some(material.clone());
        Ok(Some(material))
    }

    pub fn active(&self) -> Option<KeyMaterial> {
        self.read_active().clone()
    }

    pub fn active_address(&self) -> Option<Address> {
        self.read_active().as_ref().map(|m| m.address().clone())
    }

    fn read_active(&self) -> RwLockReadGuard<'_, Option<KeyMaterial>> {
        self.active.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_active(&self) -> RwLockWriteGuard<'_, Option<KeyMaterial>> {
        self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for KeyMaterialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterialStore")
            .field("active", &self.active_address())
            .finish_non_exhaustive()
    }
}
