//! External transport collaborators.
//!
//! The core never talks to a concrete backend. It consumes three abstract
//! services: a key directory (publish/lookup of public keys), a durable
//! message store (append-only envelope delivery), and a signal relay
//! (publish/subscribe for negotiation signals). Any durable store plus
//! pub/sub bus satisfies these contracts. The relay offers at-least-once
//! delivery with no ordering guarantee across distinct signal rows from the
//! same sender, which is why the negotiation engine buffers early candidates.

mod memory;

pub use memory::{InMemoryKeyDirectory, InMemoryMessageStore, InMemorySignalRelay};

use crate::crypto::EncryptedEnvelope;
use crate::signaling::SignalEnvelope;
use crate::utils::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A stored message: one encrypted envelope addressed to one recipient row.
///
/// Multi-recipient sends append one record per recipient, all carrying the
/// same envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique record id
    pub id: Uuid,
    /// Sending identity
    pub sender_id: Uuid,
    /// Receiving identity (the row owner)
    pub recipient_id: Uuid,
    /// The opaque encrypted payload
    pub envelope: EncryptedEnvelope,
    /// Append timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Public key directory. Read-heavy; eventually consistent at best.
pub trait KeyDirectory: Send + Sync {
    /// Look up a user's published public key (portable string form)
    fn get_public_key(&self, user_id: Uuid) -> Result<Option<String>>;

    /// Publish (or replace) a user's public key
    fn publish_public_key(&self, user_id: Uuid, public_key: String) -> Result<()>;
}

/// Durable message store; envelopes are appended by senders and consumed
/// later by recipients
pub trait MessageStore: Send + Sync {
    /// Append one envelope record
    fn append(&self, record: MessageRecord) -> Result<()>;

    /// Fetch all records addressed to a recipient, in append order
    fn fetch(&self, recipient_id: Uuid) -> Result<Vec<MessageRecord>>;
}

/// Pub/sub relay for signaling envelopes. At-least-once delivery; no
/// ordering guarantee across distinct rows.
pub trait SignalRelay: Send + Sync {
    /// Publish a signal towards its recipient
    fn publish(&self, signal: SignalEnvelope) -> Result<()>;

    /// Subscribe to all signals addressed to a recipient
    fn subscribe(&self, recipient_id: Uuid) -> mpsc::UnboundedReceiver<SignalEnvelope>;
}
