//! Sealed-box asymmetric encryption for small payloads.
//!
//! A sealed box encrypts a short payload to a recipient's X25519 public key:
//! an ephemeral key pair performs a Diffie-Hellman exchange with the
//! recipient's key, HKDF-SHA256 derives a one-shot symmetric key, and
//! ChaCha20-Poly1305 authenticates the payload. Only the holder of the
//! recipient's secret key can open the box. This is the primitive behind
//! per-recipient content-key wrapping and encrypted signaling; bulk content
//! never passes through it.

use crate::utils::{CryptoError, Result};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

/// Size of the derived symmetric key
const SEAL_KEY_SIZE: usize = 32;

/// Size of the ChaCha20-Poly1305 nonce
pub(crate) const NONCE_SIZE: usize = 12;

/// HKDF info string binding derived keys to this construction
const SEAL_INFO: &[u8] = b"peerlink-sealed-box-v1";

/// An asymmetrically encrypted small payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedBox {
    /// Ephemeral X25519 public key used for this box
    #[serde(with = "serde_bytes")]
    pub ephemeral_public: [u8; 32],
    /// AEAD nonce
    #[serde(with = "serde_bytes")]
    pub nonce: [u8; NONCE_SIZE],
    /// Authenticated ciphertext
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Encrypt a small payload to a recipient's public key
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Wrap` if the AEAD operation fails
    pub fn seal(payload: &[u8], recipient: &PublicKey) -> Result<Self> {
        let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral_secret);

        let shared = ephemeral_secret.diffie_hellman(recipient);
        let key = derive_seal_key(shared.as_bytes(), &ephemeral_public, recipient)?;

        let cipher = ChaCha20Poly1305::new(&key.into());
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, payload)
            .map_err(|_| CryptoError::Wrap {
                reason: "sealed box encryption failed".to_string(),
            })?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(&nonce);

        Ok(Self {
            ephemeral_public: ephemeral_public.to_bytes(),
            nonce: nonce_bytes,
            ciphertext,
        })
    }

    /// Decrypt the payload with the recipient's secret key
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::TamperedOrCorrupt` if authentication fails
    pub fn open(&self, recipient_secret: &StaticSecret) -> Result<Vec<u8>> {
        let ephemeral_public = PublicKey::from(self.ephemeral_public);
        let recipient_public = PublicKey::from(recipient_secret);

        let shared = recipient_secret.diffie_hellman(&ephemeral_public);
        let key = derive_seal_key(shared.as_bytes(), &ephemeral_public, &recipient_public)?;

        let cipher = ChaCha20Poly1305::new(&key.into());
        let nonce = Nonce::from_slice(&self.nonce);

        cipher
            .decrypt(nonce, self.ciphertext.as_slice())
            .map_err(|_| CryptoError::TamperedOrCorrupt.into())
    }
}

/// Derive the one-shot symmetric key, binding it to both public keys so a
/// box for one recipient cannot be replayed against another
fn derive_seal_key(
    shared_secret: &[u8],
    ephemeral_public: &PublicKey,
    recipient_public: &PublicKey,
) -> Result<[u8; SEAL_KEY_SIZE]> {
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(ephemeral_public.as_bytes());
    salt.extend_from_slice(recipient_public.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut key = [0u8; SEAL_KEY_SIZE];
    hkdf.expand(SEAL_INFO, &mut key)
        .map_err(|_| CryptoError::KeyDerivation {
            reason: "HKDF expansion failed".to_string(),
        })?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (StaticSecret, PublicKey) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        (secret, public)
    }

    #[test]
    fn test_seal_open_round_trip() {
        let (secret, public) = keypair();
        let payload = b"32 bytes of ephemeral content key";

        let sealed = SealedBox::seal(payload, &public).unwrap();
        let opened = sealed.open(&secret).unwrap();

        assert_eq!(opened, payload);
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let (_alice_secret, alice_public) = keypair();
        let (eve_secret, _eve_public) = keypair();

        let sealed = SealedBox::seal(b"secret", &alice_public).unwrap();
        let result = sealed.open(&eve_secret);

        assert!(matches!(
            result,
            Err(crate::utils::CoreError::Crypto(CryptoError::TamperedOrCorrupt))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (secret, public) = keypair();

        let mut sealed = SealedBox::seal(b"secret", &public).unwrap();
        sealed.ciphertext[0] ^= 0x01;

        assert!(sealed.open(&secret).is_err());
    }

    #[test]
    fn test_boxes_are_randomized() {
        let (_, public) = keypair();

        let a = SealedBox::seal(b"same payload", &public).unwrap();
        let b = SealedBox::seal(b"same payload", &public).unwrap();

        // Fresh ephemeral key and nonce per box
        assert_ne!(a.ephemeral_public, b.ephemeral_public);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_serde_round_trip() {
        let (secret, public) = keypair();
        let sealed = SealedBox::seal(b"payload", &public).unwrap();

        let bytes = bincode::serialize(&sealed).unwrap();
        let restored: SealedBox = bincode::deserialize(&bytes).unwrap();

        assert_eq!(restored.open(&secret).unwrap(), b"payload");
    }
}
