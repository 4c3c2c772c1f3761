//! In-memory collaborator implementations for tests and local development.

use super::{KeyDirectory, MessageRecord, MessageStore, SignalRelay};
use crate::signaling::SignalEnvelope;
use crate::utils::{CoreError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-memory key directory
#[derive(Default)]
pub struct InMemoryKeyDirectory {
    keys: Mutex<HashMap<Uuid, String>>,
}

impl InMemoryKeyDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyDirectory for InMemoryKeyDirectory {
    fn get_public_key(&self, user_id: Uuid) -> Result<Option<String>> {
        let keys = self
            .keys
            .lock()
            .map_err(|_| CoreError::unexpected("key directory lock poisoned"))?;
        Ok(keys.get(&user_id).cloned())
    }

    fn publish_public_key(&self, user_id: Uuid, public_key: String) -> Result<()> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| CoreError::unexpected("key directory lock poisoned"))?;
        keys.insert(user_id, public_key);
        Ok(())
    }
}

/// In-memory append-only message store
#[derive(Default)]
pub struct InMemoryMessageStore {
    records: Mutex<Vec<MessageRecord>>,
}

impl InMemoryMessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn append(&self, record: MessageRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| CoreError::unexpected("message store lock poisoned"))?;
        records.push(record);
        Ok(())
    }

    fn fetch(&self, recipient_id: Uuid) -> Result<Vec<MessageRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| CoreError::unexpected("message store lock poisoned"))?;
        Ok(records
            .iter()
            .filter(|r| r.recipient_id == recipient_id)
            .cloned()
            .collect())
    }
}

/// In-memory signal relay built on unbounded channels.
///
/// Delivery is in-order here, but the trait contract deliberately promises
/// less; consumers must not rely on cross-row ordering.
#[derive(Default)]
pub struct InMemorySignalRelay {
    subscribers: Mutex<HashMap<Uuid, Vec<mpsc::UnboundedSender<SignalEnvelope>>>>,
}

impl InMemorySignalRelay {
    /// Create a relay with no subscribers
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalRelay for InMemorySignalRelay {
    fn publish(&self, signal: SignalEnvelope) -> Result<()> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| CoreError::unexpected("signal relay lock poisoned"))?;

        if let Some(senders) = subscribers.get_mut(&signal.recipient_id) {
            // Drop disconnected subscribers as we go
            senders.retain(|tx| tx.send(signal.clone()).is_ok());
        } else {
            log::debug!(
                "no subscriber for signal to {}; dropping",
                signal.recipient_id
            );
        }
        Ok(())
    }

    fn subscribe(&self, recipient_id: Uuid) -> mpsc::UnboundedReceiver<SignalEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.entry(recipient_id).or_default().push(tx);
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{SignalEnvelope, SignalKind};

    fn signal(sender: Uuid, recipient: Uuid) -> SignalEnvelope {
        SignalEnvelope {
            session_id: Uuid::new_v4(),
            kind: SignalKind::Terminate,
            payload: "{}".to_string(),
            sender_id: sender,
            recipient_id: recipient,
        }
    }

    #[test]
    fn test_directory_publish_lookup() {
        let directory = InMemoryKeyDirectory::new();
        let user = Uuid::new_v4();

        assert!(directory.get_public_key(user).unwrap().is_none());
        directory.publish_public_key(user, "key".to_string()).unwrap();
        assert_eq!(directory.get_public_key(user).unwrap().unwrap(), "key");
    }

    #[tokio::test]
    async fn test_relay_routes_by_recipient() {
        let relay = InMemorySignalRelay::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut bob_rx = relay.subscribe(bob);

        relay.publish(signal(alice, bob)).unwrap();
        relay.publish(signal(bob, alice)).unwrap(); // no subscriber, dropped

        let received = bob_rx.recv().await.unwrap();
        assert_eq!(received.recipient_id, bob);
        assert!(bob_rx.try_recv().is_err());
    }
}
