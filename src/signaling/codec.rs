//! Encryption codec for ephemeral signaling payloads.
//!
//! Session descriptions, network candidates and termination notices travel
//! through an untrusted relay, encrypted for exactly one recipient. These
//! payloads are small, so they pass directly through the sealed-box
//! asymmetric primitive with no extra symmetric layer.
//!
//! When the recipient's public key is unavailable the codec can degrade to
//! plaintext signaling. This is a documented confidentiality downgrade the
//! caller must log and may disable via `signaling.allow_plaintext_fallback`,
//! in which case encoding fails instead.

use crate::crypto::{KeyPair, SealedBox};
use crate::utils::{Result, SignalError};
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use x25519_dalek::PublicKey;

/// One network path proposal (address/port/protocol) surfaced by the
/// underlying connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateInit {
    /// The candidate description line
    pub candidate: String,
    /// Media stream identification tag, if any
    pub sdp_mid: Option<String>,
    /// Media description index, if any
    pub sdp_mline_index: Option<u32>,
}

/// Decrypted signaling payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum SignalPayload {
    /// Initiator's session description
    Offer {
        /// Local session description of the initiator
        sdp: String,
    },
    /// Responder's session description
    Answer {
        /// Local session description of the responder
        sdp: String,
    },
    /// One network candidate
    Candidate {
        /// The proposed network path
        candidate: CandidateInit,
    },
    /// Session termination notice
    Terminate,
}

/// Closed set of signal kinds, visible outside the encrypted payload for
/// relay routing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalKind {
    /// Carries an offer description
    Offer,
    /// Carries an answer description
    Answer,
    /// Carries a network candidate
    Candidate,
    /// Terminates the session
    Terminate,
}

impl SignalPayload {
    /// The kind tag matching this payload
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Offer { .. } => SignalKind::Offer,
            Self::Answer { .. } => SignalKind::Answer,
            Self::Candidate { .. } => SignalKind::Candidate,
            Self::Terminate => SignalKind::Terminate,
        }
    }
}

/// One signaling message in flight through the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// The negotiation session this signal belongs to
    pub session_id: Uuid,
    /// Payload kind, for routing without decryption
    pub kind: SignalKind,
    /// Opaque (usually encrypted) payload string
    pub payload: String,
    /// Sending identity
    pub sender_id: Uuid,
    /// Receiving identity
    pub recipient_id: Uuid,
}

/// Wire form of the opaque payload string: either a sealed box or, in the
/// degraded mode, the plaintext payload itself
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SignalWire {
    Encrypted {
        /// Base64 of the bincode-serialized sealed box
        encrypted: String,
    },
    Plain(SignalPayload),
}

/// Result of encoding a signal payload
#[derive(Debug, Clone)]
pub struct EncodedSignal {
    /// The opaque string to put on the relay
    pub opaque: String,
    /// True when the payload was NOT encrypted (plaintext fallback).
    /// Callers must treat this as a confidentiality downgrade.
    pub downgraded: bool,
}

/// Codec for one signaling peer pair
pub struct SignalingCodec {
    allow_plaintext_fallback: bool,
}

impl SignalingCodec {
    /// Create a codec; `allow_plaintext_fallback` mirrors
    /// `signaling.allow_plaintext_fallback` in the configuration
    pub fn new(allow_plaintext_fallback: bool) -> Self {
        Self {
            allow_plaintext_fallback,
        }
    }

    /// Encrypt a signaling payload for one recipient.
    ///
    /// With no recipient key and fallback enabled, returns the serialized
    /// plaintext flagged `downgraded`; with fallback disabled, refuses.
    ///
    /// # Errors
    ///
    /// Returns `SignalError::EncryptionUnavailable` when no key is known
    /// and the plaintext fallback is disabled
    pub async fn encrypt_signal(
        &self,
        payload: &SignalPayload,
        recipient_id: Uuid,
        recipient_key: Option<&PublicKey>,
    ) -> Result<EncodedSignal> {
        match recipient_key {
            Some(key) => {
                let serialized = serde_json::to_vec(payload)?;
                let sealed = SealedBox::seal(&serialized, key)?;
                let encrypted = general_purpose::STANDARD.encode(bincode::serialize(&sealed)?);
                let opaque = serde_json::to_string(&SignalWire::Encrypted { encrypted })?;
                Ok(EncodedSignal {
                    opaque,
                    downgraded: false,
                })
            }
            None if self.allow_plaintext_fallback => {
                log::warn!(
                    "no public key for {recipient_id}; falling back to plaintext signaling"
                );
                let opaque = serde_json::to_string(&SignalWire::Plain(payload.clone()))?;
                Ok(EncodedSignal {
                    opaque,
                    downgraded: true,
                })
            }
            None => Err(SignalError::EncryptionUnavailable { recipient_id }.into()),
        }
    }

    /// Decrypt (or parse, for plaintext fallback messages) an opaque
    /// signaling string.
    ///
    /// # Errors
    ///
    /// Returns `SignalError::Decode` on any malformed input. Callers drop
    /// the message and log; a bad signal never tears down the session.
    pub async fn decrypt_signal(&self, opaque: &str, my_keys: &KeyPair) -> Result<SignalPayload> {
        let wire: SignalWire =
            serde_json::from_str(opaque).map_err(|e| SignalError::Decode {
                reason: format!("not a signal payload: {e}"),
            })?;

        match wire {
            SignalWire::Plain(payload) => Ok(payload),
            SignalWire::Encrypted { encrypted } => {
                let sealed_bytes = general_purpose::STANDARD.decode(encrypted).map_err(|e| {
                    SignalError::Decode {
                        reason: format!("invalid base64: {e}"),
                    }
                })?;
                let sealed: SealedBox =
                    bincode::deserialize(&sealed_bytes).map_err(|e| SignalError::Decode {
                        reason: format!("invalid sealed box: {e}"),
                    })?;
                let serialized = sealed.open(my_keys.secret()).map_err(|e| {
                    SignalError::Decode {
                        reason: format!("sealed box open failed: {e}"),
                    }
                })?;
                serde_json::from_slice(&serialized).map_err(|e| {
                    SignalError::Decode {
                        reason: format!("decrypted payload is malformed: {e}"),
                    }
                    .into()
                })
            }
        }
    }
}
