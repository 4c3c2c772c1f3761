//! Hybrid encryption for multi-recipient message content.
//!
//! Bulk content is encrypted exactly once under a fresh 256-bit
//! ChaCha20-Poly1305 key with a random nonce; that content key is then
//! wrapped once per recipient inside a [`SealedBox`]. The sender is always
//! included in the recipient set so it can re-read its own messages. The
//! resulting envelope is immutable and shares a single `iv`/`ciphertext`
//! pair across all wrapped-key entries.

use crate::crypto::sealed::{SealedBox, NONCE_SIZE};
use crate::utils::{CryptoError, Result};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use x25519_dalek::PublicKey;

use super::KeyPair;

/// Size of the ephemeral symmetric content key in bytes (256 bits).
///
/// Nonce and key sizes are fixed constants for the lifetime of this protocol;
/// the envelope carries no version field, so changing them would break every
/// stored message.
pub const CONTENT_KEY_SIZE: usize = 32;

/// A multi-recipient encrypted envelope.
///
/// Invariant: every intended recipient, including the sender, has exactly
/// one `wrapped_keys` entry, and all entries unwrap to the same content key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Random AEAD nonce, unique per envelope
    #[serde(with = "serde_bytes")]
    pub iv: [u8; NONCE_SIZE],
    /// Authenticated ciphertext of the content
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
    /// Per-recipient wrapped content keys
    pub wrapped_keys: HashMap<Uuid, SealedBox>,
}

impl EncryptedEnvelope {
    /// Serialize the envelope to compact bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Into::into)
    }

    /// Deserialize an envelope from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(Into::into)
    }

    /// Serialize the envelope to a JSON packet (the wire form handed to the
    /// message store)
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// Deserialize an envelope from a JSON packet
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }

    /// The set of identities able to decrypt this envelope
    pub fn recipients(&self) -> impl Iterator<Item = &Uuid> {
        self.wrapped_keys.keys()
    }
}

/// Encrypt plaintext for a set of recipients.
///
/// The caller resolves recipient public keys first (see
/// [`crate::crypto::KeyStore::recipient_keys`], which reports
/// `RecipientKeyMissing`); the sender's own id and key must be part of the
/// map so the sender can later re-read the message.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the recipient set is empty or the
/// AEAD operation fails, and wrap errors from the sealed-box layer.
pub async fn encrypt_for_recipients(
    plaintext: &[u8],
    recipient_keys: &HashMap<Uuid, PublicKey>,
) -> Result<EncryptedEnvelope> {
    if recipient_keys.is_empty() {
        return Err(CryptoError::Encryption {
            reason: "recipient set is empty".to_string(),
        }
        .into());
    }

    // Fresh single-use content key; never persisted, dropped after wrapping
    let mut content_key = [0u8; CONTENT_KEY_SIZE];
    OsRng
        .try_fill_bytes(&mut content_key)
        .map_err(|e| CryptoError::KeyGeneration {
            reason: e.to_string(),
        })?;

    let cipher = ChaCha20Poly1305::new(&content_key.into());
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encryption {
            reason: "content encryption failed".to_string(),
        })?;

    let mut wrapped_keys = HashMap::with_capacity(recipient_keys.len());
    for (&recipient_id, public_key) in recipient_keys {
        let wrapped = SealedBox::seal(&content_key, public_key)?;
        wrapped_keys.insert(recipient_id, wrapped);
    }

    content_key.fill(0);

    let mut iv = [0u8; NONCE_SIZE];
    iv.copy_from_slice(&nonce);

    Ok(EncryptedEnvelope {
        iv,
        ciphertext,
        wrapped_keys,
    })
}

/// Decrypt an envelope as the given identity.
///
/// # Errors
///
/// - `CryptoError::NotARecipient` if the envelope has no wrapped key for
///   `my_id`
/// - `CryptoError::TamperedOrCorrupt` if unwrapping or content
///   authentication fails; partially decrypted data is never returned
pub async fn decrypt(
    envelope: &EncryptedEnvelope,
    my_id: Uuid,
    my_keys: &KeyPair,
) -> Result<Vec<u8>> {
    let wrapped = envelope
        .wrapped_keys
        .get(&my_id)
        .ok_or(CryptoError::NotARecipient { recipient_id: my_id })?;

    let content_key = wrapped.open(my_keys.secret())?;
    let content_key: [u8; CONTENT_KEY_SIZE] =
        content_key
            .try_into()
            .map_err(|_| CryptoError::TamperedOrCorrupt)?;

    let cipher = ChaCha20Poly1305::new(&content_key.into());
    let nonce = Nonce::from_slice(&envelope.iv);

    cipher
        .decrypt(nonce, envelope.ciphertext.as_slice())
        .map_err(|_| CryptoError::TamperedOrCorrupt.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CoreError;

    fn participant() -> (Uuid, KeyPair) {
        (Uuid::new_v4(), KeyPair::generate().unwrap())
    }

    #[tokio::test]
    async fn test_round_trip_single_recipient() {
        let (alice_id, alice) = participant();
        let mut recipients = HashMap::new();
        recipients.insert(alice_id, *alice.public());

        let envelope = encrypt_for_recipients(b"hello", &recipients).await.unwrap();
        let plaintext = decrypt(&envelope, alice_id, &alice).await.unwrap();

        assert_eq!(plaintext, b"hello");
    }

    #[tokio::test]
    async fn test_round_trip_every_recipient() {
        let participants: Vec<_> = (0..4).map(|_| participant()).collect();
        let recipients: HashMap<_, _> = participants
            .iter()
            .map(|(id, pair)| (*id, *pair.public()))
            .collect();

        let envelope = encrypt_for_recipients(b"broadcast", &recipients)
            .await
            .unwrap();
        assert_eq!(envelope.wrapped_keys.len(), participants.len());

        for (id, pair) in &participants {
            let plaintext = decrypt(&envelope, *id, pair).await.unwrap();
            assert_eq!(plaintext, b"broadcast");
        }
    }

    #[tokio::test]
    async fn test_independent_wrapping_shares_content() {
        // Two recipients, one iv/ciphertext pair: both unwrap entries must
        // independently yield the identical plaintext
        let (alice_id, alice) = participant();
        let (bob_id, bob) = participant();
        let mut recipients = HashMap::new();
        recipients.insert(alice_id, *alice.public());
        recipients.insert(bob_id, *bob.public());

        let envelope = encrypt_for_recipients(b"shared content", &recipients)
            .await
            .unwrap();

        let from_alice = decrypt(&envelope, alice_id, &alice).await.unwrap();
        let from_bob = decrypt(&envelope, bob_id, &bob).await.unwrap();
        assert_eq!(from_alice, from_bob);
        assert_ne!(
            envelope.wrapped_keys[&alice_id],
            envelope.wrapped_keys[&bob_id]
        );
    }

    #[tokio::test]
    async fn test_not_a_recipient() {
        let (alice_id, alice) = participant();
        let (eve_id, eve) = participant();
        let mut recipients = HashMap::new();
        recipients.insert(alice_id, *alice.public());

        let envelope = encrypt_for_recipients(b"secret", &recipients).await.unwrap();
        let err = decrypt(&envelope, eve_id, &eve).await.unwrap_err();

        assert!(matches!(
            err,
            CoreError::Crypto(CryptoError::NotARecipient { recipient_id }) if recipient_id == eve_id
        ));
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_detected() {
        let (alice_id, alice) = participant();
        let mut recipients = HashMap::new();
        recipients.insert(alice_id, *alice.public());

        let envelope = encrypt_for_recipients(b"integrity matters", &recipients)
            .await
            .unwrap();

        for bit in [0usize, 3, 7] {
            let mut tampered = envelope.clone();
            tampered.ciphertext[0] ^= 1 << bit;
            let err = decrypt(&tampered, alice_id, &alice).await.unwrap_err();
            assert!(matches!(
                err,
                CoreError::Crypto(CryptoError::TamperedOrCorrupt)
            ));
        }
    }

    #[tokio::test]
    async fn test_tampered_wrapped_key_detected() {
        let (alice_id, alice) = participant();
        let mut recipients = HashMap::new();
        recipients.insert(alice_id, *alice.public());

        let envelope = encrypt_for_recipients(b"wrapped", &recipients).await.unwrap();

        let mut tampered = envelope.clone();
        if let Some(wrapped) = tampered.wrapped_keys.get_mut(&alice_id) {
            wrapped.ciphertext[0] ^= 0x80;
        }

        let err = decrypt(&tampered, alice_id, &alice).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Crypto(CryptoError::TamperedOrCorrupt)
        ));
    }

    #[tokio::test]
    async fn test_nonce_unique_per_envelope() {
        let (alice_id, alice) = participant();
        let mut recipients = HashMap::new();
        recipients.insert(alice_id, *alice.public());

        let a = encrypt_for_recipients(b"same", &recipients).await.unwrap();
        let b = encrypt_for_recipients(b"same", &recipients).await.unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[tokio::test]
    async fn test_empty_recipient_set_rejected() {
        let recipients = HashMap::new();
        assert!(encrypt_for_recipients(b"nobody", &recipients).await.is_err());
    }

    #[tokio::test]
    async fn test_envelope_wire_round_trip() {
        let (alice_id, alice) = participant();
        let mut recipients = HashMap::new();
        recipients.insert(alice_id, *alice.public());

        let envelope = encrypt_for_recipients(b"wire", &recipients).await.unwrap();

        let bytes = envelope.to_bytes().unwrap();
        let from_bytes = EncryptedEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(envelope, from_bytes);

        let json = envelope.to_json().unwrap();
        let from_json = EncryptedEnvelope::from_json(&json).unwrap();
        assert_eq!(
            decrypt(&from_json, alice_id, &alice).await.unwrap(),
            b"wire"
        );
    }
}
