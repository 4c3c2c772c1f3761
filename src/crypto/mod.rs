//! Cryptographic primitives: identity keys, sealed boxes, and hybrid
//! multi-recipient encryption.

pub mod hybrid;
pub mod keystore;
pub mod sealed;

pub use hybrid::{decrypt, encrypt_for_recipients, EncryptedEnvelope, CONTENT_KEY_SIZE};
pub use keystore::{
    export_public_key, import_public_key, FileKeyStorage, IdentityOutcome, KeyPair, KeyStatus,
    KeyStore, MemoryKeyStorage, PrivateKeyStorage, KEY_LENGTH,
};
pub use sealed::SealedBox;
