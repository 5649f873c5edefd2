//! Async checkpoint transform task.
//!
//! The transform runs in its own tokio task with exclusive ownership of
//! the buffer and the output sink (no `Arc<Mutex>`). Callers interact
//! through a cheaply cloneable handle; commands are serialized on one
//! bounded channel, so no ingest can interleave with an in-flight
//! release.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  Command  ┌────────────────┐  deliver  ┌────────────┐
//! │   Handle    │──────────▶│ Transform task │──────────▶│  ItemSink  │
//! │ (cloneable) │  channel  │ buffer + state │  (FIFO)   │ downstream │
//! └─────────────┘           └───────┬────────┘           └────────────┘
//!                                   │ StreamEvent
//!                                   ▼
//!                          notification channel
//! ```
//!
//! Lifecycle: `Open` (accepting commands) → `Draining` (releasing the
//! queue as part of termination) → `Closed` (exactly one terminal event
//! emitted, no further state change).

pub mod event;
pub mod metrics;
pub mod task;

pub use event::StreamEvent;
pub use metrics::{BufferMetrics, MetricsSnapshot};
pub use task::CheckpointStreamHandle;
