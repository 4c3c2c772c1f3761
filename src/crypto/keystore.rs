//! Local identity key management.
//!
//! This module owns the lifecycle of the local X25519 key pair: generation,
//! opaque private-key export/import, persistence through an injected storage
//! backend, and publication of the public half to the key directory. The
//! storage backend is untrusted by default (it may be cleared by the user at
//! any time), so the store regenerates gracefully on absence rather than
//! failing closed. A corrupted private key is reported as data loss: old
//! envelopes encrypted under it can no longer be read.

use crate::relay::KeyDirectory;
use crate::utils::{CryptoError, Result};
use base64::{engine::general_purpose, Engine};
use rand::rngs::OsRng;
use rand_core::RngCore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use x25519_dalek::{PublicKey, StaticSecret};

/// Length of a raw X25519 key in bytes
pub const KEY_LENGTH: usize = 32;

/// Local asymmetric key pair
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.fingerprint())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyGeneration` on entropy/platform failure.
    /// This is fatal; there is no retry.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::KeyGeneration {
                reason: e.to_string(),
            })?;

        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Get the public key
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Get the secret key
    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Export the public key as a portable string
    pub fn export_public(&self) -> String {
        export_public_key(&self.public)
    }

    /// Export the private key as an opaque portable string.
    ///
    /// The format is only meaningful to [`KeyPair::import_private`].
    pub fn export_private(&self) -> String {
        general_purpose::STANDARD.encode(self.secret.to_bytes())
    }

    /// Restore a key pair from an opaque private export
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyFormat` on malformed or corrupted input.
    /// Callers must treat this as "no usable identity" and regenerate,
    /// never fabricate a key.
    pub fn import_private(export: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(export.trim())
            .map_err(|e| CryptoError::KeyFormat {
                reason: format!("private key is not valid base64: {e}"),
            })?;

        let bytes: [u8; KEY_LENGTH] = bytes.try_into().map_err(|v: Vec<u8>| {
            CryptoError::KeyFormat {
                reason: format!("private key has length {}, expected {}", v.len(), KEY_LENGTH),
            }
        })?;

        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Short hex fingerprint of the public key for logging
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.public.as_bytes()[..4])
    }
}

/// Export a public key as a portable string
pub fn export_public_key(key: &PublicKey) -> String {
    general_purpose::STANDARD.encode(key.as_bytes())
}

/// Import a public key from its portable string form
///
/// # Errors
///
/// Returns `CryptoError::KeyFormat` on malformed input
pub fn import_public_key(export: &str) -> Result<PublicKey> {
    let bytes = general_purpose::STANDARD
        .decode(export.trim())
        .map_err(|e| CryptoError::KeyFormat {
            reason: format!("public key is not valid base64: {e}"),
        })?;

    let bytes: [u8; KEY_LENGTH] = bytes.try_into().map_err(|v: Vec<u8>| {
        CryptoError::KeyFormat {
            reason: format!("public key has length {}, expected {}", v.len(), KEY_LENGTH),
        }
    })?;

    Ok(PublicKey::from(bytes))
}

/// Local persistent storage for the private key export.
///
/// Treated as untrusted: it may be cleared or corrupted outside the
/// application's control.
pub trait PrivateKeyStorage: Send + Sync {
    /// Retrieve the stored private export for an identity, if any
    fn get(&self, identity_id: Uuid) -> Result<Option<String>>;

    /// Store the private export for an identity
    fn set(&self, identity_id: Uuid, export: &str) -> Result<()>;
}

/// In-memory private key storage for tests
#[derive(Default)]
pub struct MemoryKeyStorage {
    entries: std::sync::Mutex<HashMap<Uuid, String>>,
}

impl MemoryKeyStorage {
    /// Create an empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrivateKeyStorage for MemoryKeyStorage {
    fn get(&self, identity_id: Uuid) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| crate::utils::CoreError::unexpected("key storage lock poisoned"))?;
        Ok(entries.get(&identity_id).cloned())
    }

    fn set(&self, identity_id: Uuid, export: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| crate::utils::CoreError::unexpected("key storage lock poisoned"))?;
        entries.insert(identity_id, export.to_string());
        Ok(())
    }
}

/// File-backed private key storage (one file per identity under a keys
/// directory)
pub struct FileKeyStorage {
    keys_dir: PathBuf,
}

impl FileKeyStorage {
    /// Create storage rooted at the given keys directory
    pub fn new(keys_dir: PathBuf) -> Self {
        Self { keys_dir }
    }

    fn path_for(&self, identity_id: Uuid) -> PathBuf {
        self.keys_dir.join(format!("{identity_id}.key"))
    }
}

impl PrivateKeyStorage for FileKeyStorage {
    fn get(&self, identity_id: Uuid) -> Result<Option<String>> {
        let path = self.path_for(identity_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&self, identity_id: Uuid, export: &str) -> Result<()> {
        std::fs::create_dir_all(&self.keys_dir)?;
        std::fs::write(self.path_for(identity_id), export)?;
        Ok(())
    }
}

/// Result of probing local storage for an identity's key material
#[derive(Debug)]
pub enum KeyStatus {
    /// A usable key pair was loaded
    Ready(KeyPair),
    /// No key material is stored for this identity
    Absent,
    /// Stored key material exists but cannot be imported
    Corrupt { reason: String },
}

/// How `ensure_identity` obtained the local key pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// Existing key material was loaded
    Loaded,
    /// No key material existed; a fresh pair was generated
    Generated,
    /// Stored key material was corrupt; a fresh pair was generated and
    /// content encrypted under the old key is lost
    RegeneratedAfterCorruption,
}

/// Key store service: explicit, injected lifecycle for the local identity
/// key pair plus remote public key retrieval
pub struct KeyStore {
    identity_id: Uuid,
    storage: Box<dyn PrivateKeyStorage>,
    directory: Arc<dyn KeyDirectory>,
}

impl KeyStore {
    /// Create a key store for one identity over injected storage and
    /// directory backends
    pub fn new(
        identity_id: Uuid,
        storage: Box<dyn PrivateKeyStorage>,
        directory: Arc<dyn KeyDirectory>,
    ) -> Self {
        Self {
            identity_id,
            storage,
            directory,
        }
    }

    /// The identity this store manages keys for
    pub fn identity_id(&self) -> Uuid {
        self.identity_id
    }

    /// Probe local storage for this identity's key material
    pub async fn init(&self) -> Result<KeyStatus> {
        match self.storage.get(self.identity_id)? {
            None => Ok(KeyStatus::Absent),
            Some(export) => match KeyPair::import_private(&export) {
                Ok(pair) => Ok(KeyStatus::Ready(pair)),
                Err(err) => Ok(KeyStatus::Corrupt {
                    reason: err.to_string(),
                }),
            },
        }
    }

    /// Load the local key pair, generating and publishing a fresh one if
    /// storage is empty or corrupt.
    ///
    /// A `RegeneratedAfterCorruption` outcome means previously received
    /// envelopes are permanently unreadable; callers must surface this to
    /// the user rather than hide it.
    pub async fn ensure_identity(&self) -> Result<(KeyPair, IdentityOutcome)> {
        match self.init().await? {
            KeyStatus::Ready(pair) => {
                log::debug!(
                    "loaded identity key for {} (fingerprint {})",
                    self.identity_id,
                    pair.fingerprint()
                );
                Ok((pair, IdentityOutcome::Loaded))
            }
            KeyStatus::Absent => {
                let pair = self.generate_and_publish().await?;
                log::info!(
                    "generated new identity key for {} (fingerprint {})",
                    self.identity_id,
                    pair.fingerprint()
                );
                Ok((pair, IdentityOutcome::Generated))
            }
            KeyStatus::Corrupt { reason } => {
                log::warn!(
                    "stored key for {} is corrupt ({reason}); regenerating. \
                     Previously received messages are unreadable",
                    self.identity_id
                );
                let pair = self.generate_and_publish().await?;
                Ok((pair, IdentityOutcome::RegeneratedAfterCorruption))
            }
        }
    }

    async fn generate_and_publish(&self) -> Result<KeyPair> {
        let pair = KeyPair::generate()?;
        self.storage.set(self.identity_id, &pair.export_private())?;
        self.directory
            .publish_public_key(self.identity_id, pair.export_public())?;
        Ok(pair)
    }

    /// Look up one remote public key; `None` if the directory has no entry
    pub fn remote_public_key(&self, user_id: Uuid) -> Result<Option<PublicKey>> {
        match self.directory.get_public_key(user_id)? {
            None => Ok(None),
            Some(export) => Ok(Some(import_public_key(&export)?)),
        }
    }

    /// Resolve public keys for a full recipient set.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RecipientKeyMissing` for the first recipient
    /// without a directory entry. Callers wanting to exclude rather than
    /// abort can resolve recipients individually instead.
    pub fn recipient_keys(&self, recipient_ids: &[Uuid]) -> Result<HashMap<Uuid, PublicKey>> {
        let mut keys = HashMap::with_capacity(recipient_ids.len());
        for &id in recipient_ids {
            match self.remote_public_key(id)? {
                Some(key) => {
                    keys.insert(id, key);
                }
                None => {
                    return Err(CryptoError::RecipientKeyMissing { recipient_id: id }.into());
                }
            }
        }
        Ok(keys)
    }
}
