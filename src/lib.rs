//! # PeerLink
//!
//! A peer-to-peer secure communication core: hybrid multi-recipient
//! end-to-end encryption, encrypted connection signaling, and chunked
//! binary transfer over established data channels.
//!
//! ## Features
//!
//! - **Hybrid Encryption**: One symmetric content key per message, wrapped
//!   individually for every recipient with X25519 sealed boxes
//! - **Encrypted Signaling**: Offer/answer/candidate exchange sealed for
//!   exactly one recipient, with a configurable plaintext fallback
//! - **Negotiation Engine**: Session state machine that tolerates the
//!   relay's lack of ordering by buffering early candidates
//! - **Chunked Transfer**: Fixed-size chunking with buffer-level
//!   backpressure over any data channel
//! - **Backend Agnostic**: Key directory, message store, and signal relay
//!   are injected traits; in-memory implementations ship for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerlink::{Peer, CoreConfig};
//! use peerlink::crypto::MemoryKeyStorage;
//! use peerlink::relay::{InMemoryKeyDirectory, InMemoryMessageStore, InMemorySignalRelay};
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(InMemoryKeyDirectory::new());
//!     let store = Arc::new(InMemoryMessageStore::new());
//!     let relay = Arc::new(InMemorySignalRelay::new());
//!
//!     let (peer, _) = Peer::connect(
//!         Uuid::new_v4(),
//!         Box::new(MemoryKeyStorage::new()),
//!         directory,
//!         store,
//!         relay,
//!         CoreConfig::default(),
//!     )
//!     .await?;
//!
//!     println!("peer {} ready", peer.identity_id());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`crypto`]: Key management, sealed boxes, hybrid envelopes
//! - [`signaling`]: Signal encryption codec and the negotiation engine
//! - [`transfer`]: Chunked sending/receiving over data channels
//! - [`relay`]: Abstract backend traits plus in-memory implementations
//! - [`peer`]: The high-level facade tying the modules together
//! - [`utils`]: Configuration and error handling

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod peer;
pub mod relay;
pub mod signaling;
pub mod transfer;
pub mod utils;

// Re-export commonly used types for convenience
pub use crypto::{EncryptedEnvelope, KeyPair, KeyStore};
pub use peer::{DecryptedMessage, Peer};
pub use signaling::{NegotiationEngine, NegotiationPhase, Role, SignalEnvelope};
pub use transfer::{ChunkedSender, TransferReceiver};
pub use utils::{CoreConfig, CoreError, Result};
