//! Chunked binary transfer over an established data channel.
//!
//! Data channels carry two traffic classes: JSON control commands (transfer
//! framing and playback synchronization) and raw binary chunks. Payloads
//! larger than one chunk are split at [`CHUNK_SIZE`] and streamed with
//! backpressure: the sender polls the channel's buffered amount and pauses
//! while it sits above [`HIGH_WATER_MARK`], so a fast producer never
//! overruns the channel buffer.
//!
//! The receiver runs one transfer at a time. A new transfer announcement
//! replaces any in-progress session; a completed transfer whose byte count
//! disagrees with the announcement is discarded rather than surfaced.

mod channel;
mod receiver;
mod sender;

pub use channel::{ChannelMessage, DataChannel, InMemoryDataChannel};
pub use receiver::{ReceivedPayload, ReceiveEvent, TransferReceiver};
pub use sender::{ChunkedSender, TransferProgress};

use serde::{Deserialize, Serialize};

/// Chunk size for binary payloads, in bytes
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Sender pauses while the channel buffer exceeds this many bytes
pub const HIGH_WATER_MARK: usize = 1024 * 1024;

/// Interval between buffer drain polls, in milliseconds
pub const DRAIN_POLL_MS: u64 = 50;

/// Control command carried as JSON text on the data channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelCommand {
    /// Announces an incoming chunked transfer
    TransferStart {
        /// Display name of the payload
        file_name: String,
        /// MIME type of the payload
        file_type: String,
        /// Total payload size in bytes
        total_size: u64,
        /// Number of chunks that will follow
        chunk_count: u32,
    },
    /// All chunks of the current transfer have been sent
    TransferComplete,
    /// Resume shared playback at a position
    Play {
        /// Playback position in seconds
        position_secs: f64,
    },
    /// Pause shared playback at a position
    Pause {
        /// Playback position in seconds
        position_secs: f64,
    },
    /// Jump shared playback to a position
    Seek {
        /// Playback position in seconds
        position_secs: f64,
    },
}

impl ChannelCommand {
    /// Serialize for the channel's text lane
    pub fn to_json(&self) -> crate::utils::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a command from the channel's text lane
    pub fn from_json(raw: &str) -> crate::utils::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json_round_trip() {
        let commands = [
            ChannelCommand::TransferStart {
                file_name: "photo.png".to_string(),
                file_type: "image/png".to_string(),
                total_size: 40_000,
                chunk_count: 3,
            },
            ChannelCommand::TransferComplete,
            ChannelCommand::Play { position_secs: 12.5 },
            ChannelCommand::Seek { position_secs: 0.0 },
        ];

        for command in commands {
            let json = command.to_json().unwrap();
            assert_eq!(ChannelCommand::from_json(&json).unwrap(), command);
        }
    }

    #[test]
    fn test_command_wire_shape() {
        let json = ChannelCommand::Pause { position_secs: 3.0 }.to_json().unwrap();
        assert!(json.contains("\"kind\":\"pause\""));
    }
}
