//! Utility modules: configuration and error handling.

pub mod config;
pub mod errors;

pub use config::{CoreConfig, LoggingConfig, SignalingConfig, StorageConfig, TransferConfig, DEFAULT_CONFIG_FILE};
pub use errors::{
    ConfigError, CoreError, CryptoError, NegotiationError, Result, SignalError, TransferError,
};
