//! Configuration management for the secure communication core.
//!
//! This module provides TOML-based configuration with support for multiple
//! configuration sources (default, file-based, environment variables) and
//! validation of configuration parameters.

use crate::utils::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "peerlink.toml";

/// Environment variable prefix for configuration
pub const ENV_PREFIX: &str = "PEERLINK";

/// Complete configuration for the communication core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Storage configuration
    pub storage: StorageConfig,
    /// Signaling behavior
    pub signaling: SignalingConfig,
    /// Chunked transfer tuning
    pub transfer: TransferConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Storage and persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for data storage
    pub data_dir: PathBuf,
    /// Directory for storing key material
    pub keys_dir: PathBuf,
}

/// Signaling behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Allow falling back to plaintext signaling when the recipient's public
    /// key is unavailable. This is a documented confidentiality downgrade;
    /// disabling it makes the codec refuse to signal instead.
    pub allow_plaintext_fallback: bool,
}

/// Chunked transfer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Size of each binary chunk in bytes
    pub chunk_size: usize,
    /// Outstanding-buffered-bytes threshold above which the sender suspends
    pub high_water_mark: usize,
    /// Poll interval in milliseconds while waiting for the channel to drain
    pub drain_poll_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            signaling: SignalingConfig::default(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("peerlink");

        Self {
            keys_dir: data_dir.join("keys"),
            data_dir,
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            allow_plaintext_fallback: true,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::transfer::CHUNK_SIZE,
            high_water_mark: crate::transfer::HIGH_WATER_MARK,
            drain_poll_ms: crate::transfer::DRAIN_POLL_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with multiple sources (default, file, environment)
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_file {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        } else {
            let default_locations = [
                PathBuf::from(DEFAULT_CONFIG_FILE),
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("peerlink")
                    .join(DEFAULT_CONFIG_FILE),
            ];

            for location in &default_locations {
                if location.exists() {
                    config = Self::from_file(location)?;
                    break;
                }
            }
        }

        config = config.merge_from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Merge configuration from environment variables
    fn merge_from_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("PEERLINK_LOGGING_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(data_dir) = std::env::var("PEERLINK_STORAGE_DATA_DIR") {
            let data_dir = PathBuf::from(data_dir);
            self.storage.keys_dir = data_dir.join("keys");
            self.storage.data_dir = data_dir;
        }

        if let Ok(fallback) = std::env::var("PEERLINK_SIGNALING_ALLOW_PLAINTEXT_FALLBACK") {
            self.signaling.allow_plaintext_fallback =
                fallback.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "PEERLINK_SIGNALING_ALLOW_PLAINTEXT_FALLBACK".to_string(),
                    value: fallback,
                })?;
        }

        Ok(self)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transfer.chunk_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.transfer.high_water_mark < self.transfer.chunk_size {
            return Err(ConfigError::InvalidValue {
                field: "transfer.high_water_mark".to_string(),
                value: self.transfer.high_water_mark.to_string(),
            }
            .into());
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".to_string(),
                    value: self.logging.level.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        let dirs_to_create = [&self.storage.data_dir, &self.storage.keys_dir];

        for dir in &dirs_to_create {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|_| ConfigError::DirectoryCreation {
                    path: dir.display().to_string(),
                })?;
            }
        }

        Ok(())
    }

    /// Get the configuration as a pretty-printed TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| {
                ConfigError::ParseError {
                    reason: e.to_string(),
                }
                .into()
            })
    }
}
