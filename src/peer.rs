//! High-level peer facade.
//!
//! A [`Peer`] binds one local identity to the injected backends (key
//! directory, message store, signal relay) and exposes the end-to-end
//! operations: encrypted messaging to recipient sets, and negotiation
//! sessions toward other peers. It is the composition root; the modules
//! underneath stay backend-agnostic.

use crate::crypto::{self, IdentityOutcome, KeyPair, KeyStore, PrivateKeyStorage};
use crate::relay::{KeyDirectory, MessageRecord, MessageStore, SignalRelay};
use crate::signaling::{
    NegotiationEngine, PeerConnection, Role, SignalEnvelope, SignalingCodec,
};
use crate::utils::{CoreConfig, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A message fetched from the store and decrypted locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Store record id
    pub id: Uuid,
    /// Sending identity
    pub sender_id: Uuid,
    /// Decrypted payload
    pub plaintext: Vec<u8>,
    /// Store append timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One local identity wired to its backends
pub struct Peer {
    identity_id: Uuid,
    keys: KeyPair,
    key_store: KeyStore,
    message_store: Arc<dyn MessageStore>,
    signal_relay: Arc<dyn SignalRelay>,
    config: CoreConfig,
}

impl Peer {
    /// Bring up a peer: load or establish the local identity key pair,
    /// publishing the public half to the directory.
    ///
    /// The outcome tells the caller whether the identity was loaded fresh,
    /// generated, or regenerated after corruption (the last meaning old
    /// messages are unreadable and should be surfaced as data loss).
    pub async fn connect(
        identity_id: Uuid,
        key_storage: Box<dyn PrivateKeyStorage>,
        key_directory: Arc<dyn KeyDirectory>,
        message_store: Arc<dyn MessageStore>,
        signal_relay: Arc<dyn SignalRelay>,
        config: CoreConfig,
    ) -> Result<(Self, IdentityOutcome)> {
        let key_store = KeyStore::new(identity_id, key_storage, key_directory);
        let (keys, outcome) = key_store.ensure_identity().await?;

        log::info!(
            "peer {identity_id} ready (key fingerprint {}, outcome {outcome:?})",
            keys.fingerprint()
        );

        Ok((
            Self {
                identity_id,
                keys,
                key_store,
                message_store,
                signal_relay,
                config,
            },
            outcome,
        ))
    }

    /// This peer's identity
    pub fn identity_id(&self) -> Uuid {
        self.identity_id
    }

    /// This peer's local key pair
    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Encrypt a message for a recipient set and append it to the store,
    /// one record per recipient.
    ///
    /// The sender is always part of the recipient set, so its own history
    /// stays readable.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RecipientKeyMissing` if any recipient has no
    /// published key; nothing is appended in that case
    pub async fn send_message(&self, recipients: &[Uuid], plaintext: &[u8]) -> Result<()> {
        let mut recipient_set: Vec<Uuid> = recipients.to_vec();
        if !recipient_set.contains(&self.identity_id) {
            recipient_set.push(self.identity_id);
        }

        let keys = self.key_store.recipient_keys(&recipient_set)?;
        let envelope = crypto::encrypt_for_recipients(plaintext, &keys).await?;

        let created_at = chrono::Utc::now();
        for &recipient_id in &recipient_set {
            self.message_store.append(MessageRecord {
                id: Uuid::new_v4(),
                sender_id: self.identity_id,
                recipient_id,
                envelope: envelope.clone(),
                created_at,
            })?;
        }

        log::debug!(
            "message appended for {} recipients ({} bytes plaintext)",
            recipient_set.len(),
            plaintext.len()
        );
        Ok(())
    }

    /// Fetch and decrypt all messages addressed to this peer.
    ///
    /// Records that fail decryption (tampered, or encrypted under a key we
    /// no longer hold) are logged and skipped; one bad record never hides
    /// the rest.
    pub async fn fetch_messages(&self) -> Result<Vec<DecryptedMessage>> {
        let records = self.message_store.fetch(self.identity_id)?;
        let mut messages = Vec::with_capacity(records.len());

        for record in records {
            match crypto::decrypt(&record.envelope, self.identity_id, &self.keys).await {
                Ok(plaintext) => messages.push(DecryptedMessage {
                    id: record.id,
                    sender_id: record.sender_id,
                    plaintext,
                    created_at: record.created_at,
                }),
                Err(err) => {
                    log::warn!("skipping undecryptable message {}: {err}", record.id);
                }
            }
        }

        Ok(messages)
    }

    /// Open a negotiation session toward a remote peer over the given
    /// connection. The remote's public key is looked up in the directory;
    /// if absent, signaling degrades per the configured fallback policy.
    pub fn open_session<C: PeerConnection>(
        &self,
        session_id: Uuid,
        remote_id: Uuid,
        role: Role,
        connection: C,
    ) -> Result<NegotiationEngine<C>> {
        let remote_public = self.key_store.remote_public_key(remote_id)?;
        if remote_public.is_none() {
            log::warn!("no published key for {remote_id}; signaling may degrade to plaintext");
        }

        Ok(NegotiationEngine::new(
            session_id,
            role,
            self.identity_id,
            remote_id,
            self.keys.clone(),
            remote_public,
            SignalingCodec::new(self.config.signaling.allow_plaintext_fallback),
            connection,
        ))
    }

    /// Publish an outbound signal through the relay
    pub fn publish_signal(&self, signal: SignalEnvelope) -> Result<()> {
        self.signal_relay.publish(signal)
    }

    /// Subscribe to inbound signals addressed to this peer
    pub fn signals(&self) -> mpsc::UnboundedReceiver<SignalEnvelope> {
        self.signal_relay.subscribe(self.identity_id)
    }
}
