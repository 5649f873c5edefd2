//! Checkpoint-gated release buffer.
//!
//! [`CheckpointBuffer`] is the synchronous core of the crate: an ordered
//! queue plus the release state machine. Items are appended one at a time
//! and held until one of three conditions empties the queue in a single
//! atomic swap:
//!
//! 1. The appended item matches the checkpoint predicate — the whole
//!    queue (checkpoint item last) is released.
//! 2. The append pushes the queue past `max_queued` — forced overflow
//!    release, independent of checkpoint status.
//! 3. The owner calls [`take_all`](CheckpointBuffer::take_all) (manual
//!    flush or terminal drain).
//!
//! [`reset`](CheckpointBuffer::reset) is the only path that discards
//! items without releasing them.
//!
//! The buffer owns its queue exclusively and performs no I/O. The async
//! transform in [`crate::transform`] drives it and hands released batches
//! to the output sink.

use std::collections::VecDeque;
use std::mem;

/// Default overflow threshold: the queue is force-released when an
/// append brings it past this many items.
pub const DEFAULT_MAX_QUEUED: usize = 10;

/// Outcome of [`CheckpointBuffer::push`].
///
/// A release variant hands the entire queue back to the caller; the
/// buffer is empty afterwards. There is no partial release.
#[derive(Debug, PartialEq)]
pub enum PushAction<T> {
    /// Item buffered; nothing released. Carries the queue depth after
    /// the append.
    Buffered(usize),

    /// The appended item matched the predicate. The full queue is
    /// handed back in FIFO order, checkpoint item last.
    ReleaseCheckpoint(Vec<T>),

    /// The append pushed the queue past `max_queued`. The full queue is
    /// handed back in FIFO order, no checkpoint involved.
    ReleaseOverflow(Vec<T>),
}

/// Ordered queue released in full when a checkpoint item arrives.
///
/// The predicate is evaluated against each item as it is appended, so a
/// checkpoint release always includes the triggering item as its last
/// element. Between releases the queue only grows; it is emptied as a
/// whole by a release or discarded as a whole by [`reset`](Self::reset).
pub struct CheckpointBuffer<T> {
    /// Caller-supplied checkpoint predicate.
    is_checkpoint: Box<dyn Fn(&T) -> bool + Send>,
    /// Overflow threshold.
    max_queued: usize,
    /// Buffered items, insertion order.
    queue: VecDeque<T>,
}

impl<T> CheckpointBuffer<T> {
    /// Create a buffer with the default overflow threshold
    /// ([`DEFAULT_MAX_QUEUED`]).
    #[must_use]
    pub fn new(is_checkpoint: impl Fn(&T) -> bool + Send + 'static) -> Self {
        Self::with_max_queued(is_checkpoint, DEFAULT_MAX_QUEUED)
    }

    /// Create a buffer with a custom overflow threshold.
    ///
    /// # Panics
    ///
    /// Panics if `max_queued` is 0. The fallible construction path is
    /// [`CheckpointConfig`](crate::config::CheckpointConfig).
    #[must_use]
    pub fn with_max_queued(
        is_checkpoint: impl Fn(&T) -> bool + Send + 'static,
        max_queued: usize,
    ) -> Self {
        assert!(max_queued > 0, "max_queued must be > 0");

        Self {
            is_checkpoint: Box::new(is_checkpoint),
            max_queued,
            queue: VecDeque::new(),
        }
    }

    /// Append an item, then evaluate the checkpoint predicate against it.
    ///
    /// The item is in the queue before the predicate runs, so even a
    /// panicking predicate leaves the queue releasable with the item
    /// included.
    pub fn push(&mut self, item: T) -> PushAction<T> {
        self.queue.push_back(item);
        let newest = self.queue.back().expect("queue non-empty after push");

        if (self.is_checkpoint)(newest) {
            PushAction::ReleaseCheckpoint(self.take_all())
        } else if self.queue.len() > self.max_queued {
            PushAction::ReleaseOverflow(self.take_all())
        } else {
            PushAction::Buffered(self.queue.len())
        }
    }

    /// Swap the queue out and return its contents in FIFO order.
    ///
    /// Used for manual flush and terminal drain. Returns an empty vec on
    /// an empty queue.
    pub fn take_all(&mut self) -> Vec<T> {
        Vec::from(mem::take(&mut self.queue))
    }

    /// Discard the queue contents without releasing them.
    ///
    /// Returns the number of items discarded. This is the only path
    /// that loses buffered data.
    pub fn reset(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The configured overflow threshold.
    #[must_use]
    pub fn max_queued(&self) -> usize {
        self.max_queued
    }

    /// Read-only view of the buffered items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.queue.iter()
    }
}
