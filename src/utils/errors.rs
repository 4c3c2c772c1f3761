//! Error types and handling for the secure communication core.
//!
//! This module provides a unified error handling system across all components
//! of the core, implementing proper error propagation and typed, caller-visible
//! failure modes. Cryptographic and structural errors are never swallowed into
//! generic fallback strings.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for the communication core
pub type Result<T> = std::result::Result<T, CoreError>;

/// Comprehensive error type for all core operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Cryptographic operation errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Signaling encode/decode errors
    #[error("Signaling error: {0}")]
    Signal(#[from] SignalError),

    /// Connection negotiation errors
    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Chunked binary transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Configuration and I/O errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Base64 encoding/decoding errors
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// UTF-8 conversion errors
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Generic error for unexpected conditions
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Cryptographic operation errors
#[derive(Error, Debug, Clone)]
pub enum CryptoError {
    /// Local private key export is malformed or corrupted. Recoverable by
    /// regenerating an identity, but envelopes encrypted under the old key
    /// become unreadable (data loss, reported to the caller).
    #[error("Invalid key format: {reason}")]
    KeyFormat { reason: String },

    /// Key generation failure (entropy/platform failure, fatal)
    #[error("Key generation failed: {reason}")]
    KeyGeneration { reason: String },

    /// No known public key for an intended recipient. Whether to abort the
    /// whole send or exclude the recipient is the caller's policy.
    #[error("No public key known for recipient {recipient_id}")]
    RecipientKeyMissing { recipient_id: Uuid },

    /// The envelope carries no wrapped key for the caller's identity
    #[error("Identity {recipient_id} is not a recipient of this envelope")]
    NotARecipient { recipient_id: Uuid },

    /// Authentication failure on decrypt; the message is dropped and
    /// reported, never partially shown
    #[error("Envelope is tampered or corrupt")]
    TamperedOrCorrupt,

    /// Content key wrapping failure
    #[error("Key wrapping failed: {reason}")]
    Wrap { reason: String },

    /// Key derivation failure
    #[error("Key derivation failed: {reason}")]
    KeyDerivation { reason: String },

    /// Encryption operation failure
    #[error("Encryption failed: {reason}")]
    Encryption { reason: String },
}

/// Signaling encode/decode errors
#[derive(Error, Debug, Clone)]
pub enum SignalError {
    /// Malformed signaling payload; the caller drops the message and logs,
    /// the session continues
    #[error("Signal decode failed: {reason}")]
    Decode { reason: String },

    /// The recipient has no public key and the plaintext fallback is
    /// disabled by configuration
    #[error("Signal encryption unavailable for recipient {recipient_id}")]
    EncryptionUnavailable { recipient_id: Uuid },
}

/// Connection negotiation errors
#[derive(Error, Debug, Clone)]
pub enum NegotiationError {
    /// Terminal transport failure, surfaced exactly once; retrying requires
    /// a brand-new session
    #[error("Negotiation failed: {reason}")]
    Failed { reason: String },

    /// Operation attempted in a state that does not permit it
    #[error("Invalid negotiation state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    /// The session has been closed; further signals are discarded
    #[error("Session {session_id} is closed")]
    SessionClosed { session_id: Uuid },
}

/// Chunked binary transfer errors
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    /// Receiver-side integrity failure; the partial object is discarded,
    /// never delivered
    #[error("Transfer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The data channel closed mid-transfer
    #[error("Data channel closed during transfer")]
    ChannelClosed,

    /// A chunk or completion message arrived with no active session
    #[error("No active transfer session")]
    NoActiveSession,
}

/// Configuration and setup errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing error
    #[error("Configuration parse error: {reason}")]
    ParseError { reason: String },

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Directory creation failure
    #[error("Failed to create directory: {path}")]
    DirectoryCreation { path: String },
}

impl CoreError {
    /// Creates a new unexpected error with a custom message
    pub fn unexpected<S: Into<String>>(msg: S) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Returns true if this error indicates a security-relevant failure
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::Crypto(CryptoError::TamperedOrCorrupt)
                | Self::Crypto(CryptoError::NotARecipient { .. })
        )
    }

    /// Returns true if this error invalidates previously received content
    /// (old envelopes can no longer be decrypted)
    pub fn is_data_loss(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::KeyFormat { .. }))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
