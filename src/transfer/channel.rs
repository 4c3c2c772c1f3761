//! Data channel abstraction.

use crate::utils::{Result, TransferError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An established bidirectional data channel.
///
/// Sends are non-blocking: the channel buffers internally and exposes the
/// buffered byte count so senders can implement their own backpressure.
pub trait DataChannel: Send + Sync {
    /// Send a text (control) message
    fn send_text(&self, text: &str) -> Result<()>;

    /// Send a binary chunk
    fn send_binary(&self, chunk: &[u8]) -> Result<()>;

    /// Bytes queued in the channel's send buffer, not yet on the wire
    fn buffered_amount(&self) -> usize;

    /// Whether the channel can still accept sends
    fn is_open(&self) -> bool;
}

/// Message as it appears on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// A control command in JSON form
    Text(String),
    /// A binary chunk
    Binary(Vec<u8>),
}

/// In-memory channel for tests and the local demo.
///
/// The buffered amount is driven externally with [`set_buffered_amount`],
/// standing in for a real transport draining its queue.
///
/// [`set_buffered_amount`]: InMemoryDataChannel::set_buffered_amount
pub struct InMemoryDataChannel {
    sent: Mutex<VecDeque<ChannelMessage>>,
    buffered: Arc<AtomicUsize>,
    open: AtomicBool,
}

impl Default for InMemoryDataChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDataChannel {
    /// Create an open channel with an empty buffer
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(VecDeque::new()),
            buffered: Arc::new(AtomicUsize::new(0)),
            open: AtomicBool::new(true),
        }
    }

    /// Drain all messages sent so far
    pub fn take_sent(&self) -> Vec<ChannelMessage> {
        match self.sent.lock() {
            Ok(mut sent) => sent.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Simulate the transport's send buffer level
    pub fn set_buffered_amount(&self, amount: usize) {
        self.buffered.store(amount, Ordering::SeqCst);
    }

    /// Close the channel; subsequent sends fail
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn push(&self, message: ChannelMessage) -> Result<()> {
        if !self.is_open() {
            return Err(TransferError::ChannelClosed.into());
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| crate::utils::CoreError::unexpected("channel lock poisoned"))?;
        sent.push_back(message);
        Ok(())
    }
}

impl DataChannel for InMemoryDataChannel {
    fn send_text(&self, text: &str) -> Result<()> {
        self.push(ChannelMessage::Text(text.to_string()))
    }

    fn send_binary(&self, chunk: &[u8]) -> Result<()> {
        self.push(ChannelMessage::Binary(chunk.to_vec()))
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CoreError;

    #[test]
    fn test_closed_channel_rejects_sends() {
        let channel = InMemoryDataChannel::new();
        channel.send_text("ok").unwrap();

        channel.close();
        let err = channel.send_binary(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transfer(TransferError::ChannelClosed)
        ));

        assert_eq!(channel.take_sent().len(), 1);
    }

    #[test]
    fn test_buffered_amount_reflects_setting() {
        let channel = InMemoryDataChannel::new();
        assert_eq!(channel.buffered_amount(), 0);
        channel.set_buffered_amount(4096);
        assert_eq!(channel.buffered_amount(), 4096);
    }
}
