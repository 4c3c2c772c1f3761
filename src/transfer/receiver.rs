//! Receiving side of chunked transfer.

use super::ChannelCommand;
use crate::utils::{Result, TransferError};

/// A fully reassembled transfer payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPayload {
    /// Display name announced by the sender
    pub file_name: String,
    /// MIME type announced by the sender
    pub file_type: String,
    /// Reassembled payload bytes
    pub data: Vec<u8>,
}

/// What one inbound channel message amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveEvent {
    /// A transfer was announced
    Started {
        /// Display name of the incoming payload
        file_name: String,
        /// Announced total size in bytes
        total_size: u64,
    },
    /// A chunk was accepted
    Progress {
        /// Bytes accumulated so far
        received_bytes: u64,
        /// Announced total size in bytes
        total_bytes: u64,
        /// Chunks accumulated so far
        chunks_received: u32,
        /// Announced chunk count
        chunk_count: u32,
    },
    /// A transfer finished and its byte count matched the announcement
    Completed(ReceivedPayload),
    /// A playback synchronization command arrived
    Playback(ChannelCommand),
}

struct ActiveTransfer {
    file_name: String,
    file_type: String,
    total_size: u64,
    chunk_count: u32,
    chunks: Vec<Vec<u8>>,
    received_bytes: u64,
}

/// Reassembles chunked transfers from a data channel.
///
/// At most one transfer is in flight: a new announcement replaces whatever
/// was accumulating, without error.
#[derive(Default)]
pub struct TransferReceiver {
    active: Option<ActiveTransfer>,
}

impl TransferReceiver {
    /// Create a receiver with no transfer in flight
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transfer is currently accumulating
    pub fn is_receiving(&self) -> bool {
        self.active.is_some()
    }

    /// Process one text message from the channel.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::SizeMismatch` when a completed transfer's
    /// byte count disagrees with the announcement; the partial payload is
    /// discarded. Returns `TransferError::NoActiveSession` for a completion
    /// with nothing in flight, and a serialization error for text that is
    /// not a channel command.
    pub fn handle_text(&mut self, raw: &str) -> Result<ReceiveEvent> {
        match ChannelCommand::from_json(raw)? {
            ChannelCommand::TransferStart {
                file_name,
                file_type,
                total_size,
                chunk_count,
            } => {
                if let Some(previous) = self.active.take() {
                    log::warn!(
                        "new transfer '{file_name}' replaces in-progress '{}' \
                         ({} of {} bytes received)",
                        previous.file_name,
                        previous.received_bytes,
                        previous.total_size
                    );
                }
                let event = ReceiveEvent::Started {
                    file_name: file_name.clone(),
                    total_size,
                };
                self.active = Some(ActiveTransfer {
                    file_name,
                    file_type,
                    total_size,
                    chunk_count,
                    chunks: Vec::with_capacity(chunk_count as usize),
                    received_bytes: 0,
                });
                Ok(event)
            }
            ChannelCommand::TransferComplete => {
                let transfer = self
                    .active
                    .take()
                    .ok_or(TransferError::NoActiveSession)?;
                if transfer.received_bytes != transfer.total_size {
                    log::warn!(
                        "discarding transfer '{}': received {} bytes, announced {}",
                        transfer.file_name,
                        transfer.received_bytes,
                        transfer.total_size
                    );
                    return Err(TransferError::SizeMismatch {
                        expected: transfer.total_size,
                        actual: transfer.received_bytes,
                    }
                    .into());
                }
                Ok(ReceiveEvent::Completed(ReceivedPayload {
                    file_name: transfer.file_name,
                    file_type: transfer.file_type,
                    data: transfer.chunks.concat(),
                }))
            }
            playback @ (ChannelCommand::Play { .. }
            | ChannelCommand::Pause { .. }
            | ChannelCommand::Seek { .. }) => Ok(ReceiveEvent::Playback(playback)),
        }
    }

    /// Accumulate one binary chunk.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::NoActiveSession` for a chunk with no
    /// announced transfer in flight
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> Result<ReceiveEvent> {
        let transfer = self
            .active
            .as_mut()
            .ok_or(TransferError::NoActiveSession)?;
        transfer.received_bytes += chunk.len() as u64;
        transfer.chunks.push(chunk.to_vec());
        Ok(ReceiveEvent::Progress {
            received_bytes: transfer.received_bytes,
            total_bytes: transfer.total_size,
            chunks_received: transfer.chunks.len() as u32,
            chunk_count: transfer.chunk_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::channel::{ChannelMessage, InMemoryDataChannel};
    use crate::transfer::ChunkedSender;
    use crate::utils::{CoreError, TransferConfig};

    fn feed(receiver: &mut TransferReceiver, messages: Vec<ChannelMessage>) -> Vec<ReceiveEvent> {
        let mut events = Vec::new();
        for message in messages {
            let event = match message {
                ChannelMessage::Text(json) => receiver.handle_text(&json),
                ChannelMessage::Binary(chunk) => receiver.handle_chunk(&chunk),
            };
            events.push(event.unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_sender_to_receiver_round_trip() {
        let channel = InMemoryDataChannel::new();
        let sender = ChunkedSender::new(TransferConfig {
            chunk_size: 16 * 1024,
            high_water_mark: 1024 * 1024,
            drain_poll_ms: 1,
        });
        let data: Vec<u8> = (0..50_000).map(|i| (i % 253) as u8).collect();

        sender
            .send(&channel, "clip.mp4", "video/mp4", &data)
            .await
            .unwrap();

        let mut receiver = TransferReceiver::new();
        let events = feed(&mut receiver, channel.take_sent());

        // 50000 bytes at 16 KiB per chunk: every announced chunk arrived
        let last_progress = events
            .iter()
            .filter_map(|e| match e {
                ReceiveEvent::Progress {
                    chunks_received,
                    chunk_count,
                    ..
                } => Some((*chunks_received, *chunk_count)),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last_progress, (4, 4));

        match events.last().unwrap() {
            ReceiveEvent::Completed(payload) => {
                assert_eq!(payload.file_name, "clip.mp4");
                assert_eq!(payload.file_type, "video/mp4");
                assert_eq!(payload.data, data);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(!receiver.is_receiving());
    }

    #[test]
    fn test_size_mismatch_discards_payload() {
        let mut receiver = TransferReceiver::new();

        let start = ChannelCommand::TransferStart {
            file_name: "f".to_string(),
            file_type: "t".to_string(),
            total_size: 100,
            chunk_count: 1,
        };
        receiver.handle_text(&start.to_json().unwrap()).unwrap();
        receiver.handle_chunk(&[0u8; 60]).unwrap();

        let err = receiver
            .handle_text(&ChannelCommand::TransferComplete.to_json().unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transfer(TransferError::SizeMismatch {
                expected: 100,
                actual: 60,
            })
        ));
        assert!(!receiver.is_receiving(), "partial payload discarded");
    }

    #[test]
    fn test_new_start_replaces_in_progress_transfer() {
        let mut receiver = TransferReceiver::new();

        let first = ChannelCommand::TransferStart {
            file_name: "first".to_string(),
            file_type: "t".to_string(),
            total_size: 1000,
            chunk_count: 1,
        };
        receiver.handle_text(&first.to_json().unwrap()).unwrap();
        receiver.handle_chunk(&[1u8; 500]).unwrap();

        let second = ChannelCommand::TransferStart {
            file_name: "second".to_string(),
            file_type: "t".to_string(),
            total_size: 3,
            chunk_count: 1,
        };
        receiver.handle_text(&second.to_json().unwrap()).unwrap();
        receiver.handle_chunk(&[7, 8, 9]).unwrap();

        let event = receiver
            .handle_text(&ChannelCommand::TransferComplete.to_json().unwrap())
            .unwrap();
        match event {
            ReceiveEvent::Completed(payload) => {
                assert_eq!(payload.file_name, "second");
                assert_eq!(payload.data, vec![7, 8, 9]);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_chunk_without_session_is_rejected() {
        let mut receiver = TransferReceiver::new();
        let err = receiver.handle_chunk(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transfer(TransferError::NoActiveSession)
        ));
    }

    #[test]
    fn test_completion_without_session_is_rejected() {
        let mut receiver = TransferReceiver::new();
        let err = receiver
            .handle_text(&ChannelCommand::TransferComplete.to_json().unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transfer(TransferError::NoActiveSession)
        ));
    }

    #[test]
    fn test_playback_commands_pass_through_mid_transfer() {
        let mut receiver = TransferReceiver::new();

        let start = ChannelCommand::TransferStart {
            file_name: "f".to_string(),
            file_type: "t".to_string(),
            total_size: 10,
            chunk_count: 1,
        };
        receiver.handle_text(&start.to_json().unwrap()).unwrap();

        let event = receiver
            .handle_text(&ChannelCommand::Seek { position_secs: 42.0 }.to_json().unwrap())
            .unwrap();
        assert_eq!(
            event,
            ReceiveEvent::Playback(ChannelCommand::Seek { position_secs: 42.0 })
        );
        assert!(receiver.is_receiving(), "playback traffic does not disturb the transfer");
    }

    #[test]
    fn test_malformed_text_is_an_error() {
        let mut receiver = TransferReceiver::new();
        assert!(receiver.handle_text("not a command").is_err());
    }
}
