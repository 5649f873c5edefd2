//! Downstream output channel abstraction.
//!
//! Released items are handed to an [`ItemSink`] one at a time; each
//! delivery completes before the next is attempted, so sink
//! back-pressure stalls the transform instead of reordering items.
//! [`ChannelSink`] is the standard implementation over a bounded tokio
//! mpsc channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StreamError;

/// Abstract downstream output channel for released items.
#[async_trait]
pub trait ItemSink<T: Send>: Send {
    /// Deliver one item downstream.
    ///
    /// Completes only once the item has been accepted. A rejection is
    /// fatal to the transform (no retry is attempted).
    async fn deliver(&mut self, item: T) -> Result<(), StreamError>;

    /// Close the channel. Called exactly once, after the final release.
    async fn close(&mut self);
}

/// [`ItemSink`] backed by a bounded tokio mpsc channel.
///
/// `deliver` awaits channel capacity, which is where upstream
/// back-pressure comes from. Dropping the sender on `close` is the
/// end-of-stream signal the receiver observes as `None`.
pub struct ChannelSink<T> {
    tx: Option<mpsc::Sender<T>>,
}

impl<T> ChannelSink<T> {
    /// Wrap an mpsc sender as a sink.
    #[must_use]
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl<T: Send + 'static> ItemSink<T> for ChannelSink<T> {
    async fn deliver(&mut self, item: T) -> Result<(), StreamError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(StreamError::Downstream("sink already closed".to_string()));
        };
        tx.send(item)
            .await
            .map_err(|_| StreamError::Downstream("receiver dropped".to_string()))
    }

    async fn close(&mut self) {
        // Dropping the sender closes the channel.
        self.tx.take();
    }
}
