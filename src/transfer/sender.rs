//! Sending side of chunked transfer.

use super::channel::DataChannel;
use super::ChannelCommand;
use crate::utils::{Result, TransferConfig, TransferError};
use std::time::Duration;

/// Progress snapshot passed to the sender's progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes handed to the channel so far
    pub sent_bytes: u64,
    /// Total payload size
    pub total_bytes: u64,
    /// Index of the chunk just sent (0-based)
    pub chunk_index: u32,
    /// Total number of chunks
    pub chunk_count: u32,
}

/// Streams binary payloads over a data channel in fixed-size chunks with
/// buffer-level backpressure
pub struct ChunkedSender {
    config: TransferConfig,
}

impl ChunkedSender {
    /// Create a sender with the given transfer tuning
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// Send a payload, ignoring progress
    pub async fn send<C: DataChannel + ?Sized>(
        &self,
        channel: &C,
        file_name: &str,
        file_type: &str,
        payload: &[u8],
    ) -> Result<()> {
        self.send_with_progress(channel, file_name, file_type, payload, |_| {})
            .await
    }

    /// Send a payload, reporting progress after each chunk.
    ///
    /// Frames the payload as a `TransferStart` announcement, `chunk_count`
    /// binary chunks in order, then `TransferComplete`. Before each chunk
    /// the sender waits for the channel buffer to drain below the high
    /// water mark, polling at the configured interval.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::ChannelClosed` if the channel closes at any
    /// point, including while waiting for drain. The transfer cannot be
    /// resumed.
    pub async fn send_with_progress<C, F>(
        &self,
        channel: &C,
        file_name: &str,
        file_type: &str,
        payload: &[u8],
        mut on_progress: F,
    ) -> Result<()>
    where
        C: DataChannel + ?Sized,
        F: FnMut(TransferProgress),
    {
        let chunk_size = self.config.chunk_size.max(1);
        let total_bytes = payload.len() as u64;
        let chunk_count = payload.len().div_ceil(chunk_size) as u32;

        let start = ChannelCommand::TransferStart {
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            total_size: total_bytes,
            chunk_count,
        };
        channel.send_text(&start.to_json()?)?;
        log::debug!("transfer start: {file_name} ({total_bytes} bytes, {chunk_count} chunks)");

        let mut sent_bytes = 0u64;
        for (index, chunk) in payload.chunks(chunk_size).enumerate() {
            self.wait_for_drain(channel).await?;
            channel.send_binary(chunk)?;

            sent_bytes += chunk.len() as u64;
            on_progress(TransferProgress {
                sent_bytes,
                total_bytes,
                chunk_index: index as u32,
                chunk_count,
            });
        }

        channel.send_text(&ChannelCommand::TransferComplete.to_json()?)?;
        log::debug!("transfer complete: {file_name}");
        Ok(())
    }

    async fn wait_for_drain<C: DataChannel + ?Sized>(&self, channel: &C) -> Result<()> {
        while channel.buffered_amount() > self.config.high_water_mark {
            if !channel.is_open() {
                return Err(TransferError::ChannelClosed.into());
            }
            tokio::time::sleep(Duration::from_millis(self.config.drain_poll_ms)).await;
        }
        if !channel.is_open() {
            return Err(TransferError::ChannelClosed.into());
        }
        Ok(())
    }
}

impl Default for ChunkedSender {
    fn default() -> Self {
        Self::new(TransferConfig::default())
    }
}
