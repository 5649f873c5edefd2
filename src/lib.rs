//! # checkpoint-stream
//!
//! A stream transform that buffers incoming items until a caller-supplied
//! predicate identifies a checkpoint item, then releases the entire
//! buffered sequence (checkpoint item included) downstream in original
//! order. Lets a pipeline defer forwarding until a known-safe commit
//! point, with memory bounded by a maximum queue depth.
//!
//! ## Release conditions
//!
//! The queue is always emptied as a whole — there is no partial release:
//!
//! - **Checkpoint**: the newest item matches the predicate; a
//!   [`StreamEvent::Checkpoint`] notification fires after the release.
//! - **Overflow**: the queue length exceeds `max_queued` (default 10);
//!   no notification.
//! - **Flush**: explicit [`CheckpointStreamHandle::flush`], acknowledged
//!   after downstream acceptance; no notification.
//! - **Drain**: end-of-input or failure; buffered items always reach the
//!   sink before the single terminal event, so no data is silently lost
//!   on error. [`CheckpointStreamHandle::reset`] is the one sanctioned
//!   way to discard buffered items.
//!
//! ## Modules
//!
//! - [`buffer`]: the synchronous queue/release state machine
//! - [`config`]: construction forms and validation
//! - [`sink`]: the downstream output channel seam
//! - [`transform`]: the async task, handle, events, and metrics
//! - [`error`]: the crate error type
//!
//! ## Example
//!
//! ```rust,ignore
//! let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(64);
//! let config = CheckpointConfig::builder()
//!     .is_checkpoint(|record: &Record| record.is_commit_marker())
//!     .max_queued(32)
//!     .build()?;
//! let (handle, mut events) =
//!     CheckpointStreamHandle::spawn(config, Box::new(ChannelSink::new(out_tx)));
//!
//! handle.ingest(record).await?;
//! // ... out_rx receives nothing until a commit marker arrives ...
//! handle.finish().await;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod sink;
pub mod transform;

pub use buffer::{CheckpointBuffer, PushAction, DEFAULT_MAX_QUEUED};
pub use config::{CheckpointConfig, CheckpointConfigBuilder};
pub use error::StreamError;
pub use sink::{ChannelSink, ItemSink};
pub use transform::{BufferMetrics, CheckpointStreamHandle, MetricsSnapshot, StreamEvent};
