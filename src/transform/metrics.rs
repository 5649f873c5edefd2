//! Lock-free transform metrics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Transform counters using atomics (no locks on the data path).
///
/// The depth gauge is the sanctioned way to observe the queue length
/// from outside the transform task; it is safe to read at any time and
/// never touches the queue itself.
#[derive(Debug, Default)]
pub struct BufferMetrics {
    /// Current queue depth.
    depth: AtomicUsize,
    /// Total items released downstream.
    released: AtomicU64,
    /// Checkpoint-triggered releases.
    checkpoints: AtomicU64,
    /// Overflow-triggered releases.
    overflows: AtomicU64,
    /// Manual flushes.
    flushes: AtomicU64,
    /// Items discarded by reset.
    discarded: AtomicU64,
}

impl BufferMetrics {
    /// Current queue depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub(crate) fn set_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Relaxed);
    }

    pub(crate) fn record_released(&self, items: u64) {
        self.released.fetch_add(items, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reset(&self, discarded: u64) {
        self.discarded.fetch_add(discarded, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            depth: self.depth.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of transform metrics.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    /// Current queue depth.
    pub depth: usize,
    /// Total items released downstream.
    pub released: u64,
    /// Checkpoint-triggered releases.
    pub checkpoints: u64,
    /// Overflow-triggered releases.
    pub overflows: u64,
    /// Manual flushes.
    pub flushes: u64,
    /// Items discarded by reset.
    pub discarded: u64,
}
