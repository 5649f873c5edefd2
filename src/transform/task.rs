//! The transform task and its handle.
//!
//! One tokio task owns the [`CheckpointBuffer`] and the output sink
//! exclusively and processes commands sequentially from a bounded
//! channel:
//!
//! - `Ingest` — append an item, releasing on checkpoint or overflow
//! - `Flush` — force a full release, ack after downstream acceptance
//! - `Reset` — discard the queue silently
//! - `Finish` — end-of-input: drain, close the sink, emit `Finished`
//! - `Abort` — external failure: drain, close the sink, emit `Failed`
//!
//! Serializing commands on one channel is what makes a release atomic
//! with respect to ingestion: an item sent during a release queues
//! behind it and can neither jump ahead nor be lost.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::buffer::{CheckpointBuffer, PushAction};
use crate::config::CheckpointConfig;
use crate::error::StreamError;
use crate::sink::ItemSink;

use super::event::StreamEvent;
use super::metrics::{BufferMetrics, MetricsSnapshot};

/// How long `finish`/`abort` wait for the task to drain and exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Commands sent to the transform task.
enum Command<T> {
    /// Append one item from upstream.
    Ingest(T),
    /// Force a full release; ack fires after downstream acceptance.
    Flush {
        ack: oneshot::Sender<Result<(), StreamError>>,
    },
    /// Discard the queue without releasing it.
    Reset,
    /// Normal end-of-input.
    Finish,
    /// External failure signal; drained, then surfaced unchanged.
    Abort {
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Lifecycle of the transform task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Accepting ingest/flush/reset.
    Open,
    /// Releasing queued items as part of termination.
    Draining,
    /// Terminal; exactly one terminal event has been emitted.
    Closed,
}

/// Why the command loop ended.
enum Outcome {
    Finished,
    Failed(StreamError),
}

/// Handle for driving a checkpoint transform task.
///
/// Cheaply cloneable; all clones feed the same command channel, so
/// commands from any clone are processed in send order. Once the task
/// is terminal, every command fails fast with [`StreamError::Closed`].
pub struct CheckpointStreamHandle<T> {
    /// Command channel sender.
    tx: mpsc::Sender<Command<T>>,
    /// Shared counters (lock-free reads).
    metrics: Arc<BufferMetrics>,
    /// Background task join handle (taken by the first terminal call).
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl<T> Clone for CheckpointStreamHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            metrics: Arc::clone(&self.metrics),
            task: Arc::clone(&self.task),
        }
    }
}

impl<T: Clone + Send + 'static> CheckpointStreamHandle<T> {
    /// Spawns a transform task and returns its handle plus the
    /// notification channel receiver.
    #[must_use]
    pub fn spawn(
        config: CheckpointConfig<T>,
        sink: Box<dyn ItemSink<T>>,
    ) -> (Self, mpsc::Receiver<StreamEvent<T>>) {
        let CheckpointConfig {
            is_checkpoint,
            max_queued,
            channel_capacity,
            event_capacity,
        } = config;

        let buffer = CheckpointBuffer::with_max_queued(is_checkpoint, max_queued);
        let (tx, rx) = mpsc::channel(channel_capacity);
        let (event_tx, event_rx) = mpsc::channel(event_capacity);
        let metrics = Arc::new(BufferMetrics::default());
        let task_metrics = Arc::clone(&metrics);

        let join = tokio::spawn(run_transform_task(buffer, sink, rx, event_tx, task_metrics));

        (
            Self {
                tx,
                metrics,
                task: Arc::new(tokio::sync::Mutex::new(Some(join))),
            },
            event_rx,
        )
    }

    /// Sends one item into the transform.
    ///
    /// Applies back-pressure via the bounded command channel; a release
    /// in flight stalls this call rather than interleaving with it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the transform is terminal.
    pub async fn ingest(&self, item: T) -> Result<(), StreamError> {
        self.tx
            .send(Command::Ingest(item))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Forces a full release of the queue, checkpoint or not.
    ///
    /// Resolves only after every released item has been accepted by the
    /// sink. Idempotent on an empty queue. No checkpoint notification
    /// is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the transform is terminal, or
    /// [`StreamError::Downstream`] if the sink rejected the release.
    pub async fn flush(&self) -> Result<(), StreamError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush { ack: ack_tx })
            .await
            .map_err(|_| StreamError::Closed)?;
        ack_rx.await.map_err(|_| StreamError::Closed)?
    }

    /// Discards the queue contents without releasing them.
    ///
    /// The only sanctioned way to lose buffered data. Processed in
    /// order with other commands; no acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the transform is terminal.
    pub async fn reset(&self) -> Result<(), StreamError> {
        self.tx
            .send(Command::Reset)
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Signals normal end-of-input and waits for the task to drain the
    /// queue, close the sink, and emit `Finished`.
    ///
    /// A no-op if the transform is already terminal.
    pub async fn finish(&self) {
        let _ = self.tx.send(Command::Finish).await;
        self.join_task().await;
    }

    /// Signals an external failure and waits for the task to drain the
    /// queue, close the sink, and emit `Failed` carrying `error`.
    ///
    /// A no-op if the transform is already terminal.
    pub async fn abort(&self, error: impl Into<Box<dyn std::error::Error + Send + Sync>>) {
        let _ = self
            .tx
            .send(Command::Abort {
                error: error.into(),
            })
            .await;
        self.join_task().await;
    }

    /// Current queue depth (lock-free read, safe at any time).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.metrics.depth()
    }

    /// Snapshot of the transform counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether the transform has reached its terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn join_task(&self) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.take() {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
        }
    }
}

/// Main loop for a transform task.
///
/// Owns the buffer and sink exclusively. Whatever ends the loop, the
/// remaining queue is drained downstream before the single terminal
/// event is emitted.
async fn run_transform_task<T: Clone + Send + 'static>(
    mut buffer: CheckpointBuffer<T>,
    mut sink: Box<dyn ItemSink<T>>,
    mut rx: mpsc::Receiver<Command<T>>,
    events: mpsc::Sender<StreamEvent<T>>,
    metrics: Arc<BufferMetrics>,
) {
    let mut state = Lifecycle::Open;
    tracing::debug!(
        state = ?state,
        max_queued = buffer.max_queued(),
        "Checkpoint transform started"
    );

    let outcome = loop {
        let Some(cmd) = rx.recv().await else {
            // Every handle dropped — treat as end-of-input.
            tracing::debug!("Command channel closed");
            break Outcome::Finished;
        };

        match cmd {
            Command::Ingest(item) => {
                // The predicate is caller code; a panic inside it is a
                // fatal failure, not a transform crash. The item is
                // already queued when the predicate runs, so the drain
                // below releases it.
                let action = match catch_unwind(AssertUnwindSafe(|| buffer.push(item))) {
                    Ok(action) => action,
                    Err(payload) => {
                        break Outcome::Failed(StreamError::Predicate(panic_message(payload)));
                    }
                };

                match action {
                    PushAction::Buffered(depth) => metrics.set_depth(depth),
                    PushAction::ReleaseCheckpoint(items) => {
                        let trigger = items.last().cloned();
                        if let Err(e) = release(&mut *sink, items, &metrics).await {
                            break Outcome::Failed(e);
                        }
                        metrics.record_checkpoint();
                        if let Some(item) = trigger {
                            let _ = events.send(StreamEvent::Checkpoint { item }).await;
                        }
                    }
                    PushAction::ReleaseOverflow(items) => {
                        tracing::debug!(released = items.len(), "Overflow release");
                        if let Err(e) = release(&mut *sink, items, &metrics).await {
                            break Outcome::Failed(e);
                        }
                        metrics.record_overflow();
                    }
                }
            }

            Command::Flush { ack } => {
                let items = buffer.take_all();
                match release(&mut *sink, items, &metrics).await {
                    Ok(()) => {
                        metrics.record_flush();
                        let _ = ack.send(Ok(()));
                    }
                    Err(e) => {
                        let ack_err = match &e {
                            StreamError::Downstream(msg) => {
                                StreamError::Downstream(msg.clone())
                            }
                            other => StreamError::Downstream(other.to_string()),
                        };
                        let _ = ack.send(Err(ack_err));
                        break Outcome::Failed(e);
                    }
                }
            }

            Command::Reset => {
                let discarded = buffer.reset();
                metrics.record_reset(discarded as u64);
                metrics.set_depth(0);
                tracing::debug!(discarded, "Buffer reset");
            }

            Command::Finish => break Outcome::Finished,

            Command::Abort { error } => {
                break Outcome::Failed(StreamError::Aborted { source: error });
            }
        }
    };

    // Drain: whatever ended the loop, buffered items go downstream
    // before the terminal signal.
    state = Lifecycle::Draining;
    let remaining = buffer.take_all();
    if !remaining.is_empty() {
        tracing::debug!(state = ?state, remaining = remaining.len(), "Draining buffered items");
    }
    let outcome = match outcome {
        Outcome::Finished => match release(&mut *sink, remaining, &metrics).await {
            Ok(()) => Outcome::Finished,
            // A failed drain turns normal completion into the failure.
            Err(e) => Outcome::Failed(e),
        },
        Outcome::Failed(error) => {
            if let Err(e) = release(&mut *sink, remaining, &metrics).await {
                tracing::warn!(error = %e, "Drain delivery failed during failure propagation");
            }
            Outcome::Failed(error)
        }
    };

    sink.close().await;

    match outcome {
        Outcome::Finished => {
            let _ = events.send(StreamEvent::Finished).await;
        }
        Outcome::Failed(error) => {
            tracing::debug!(error = %error, "Checkpoint transform failed");
            let _ = events.send(StreamEvent::Failed { error }).await;
        }
    }

    state = Lifecycle::Closed;
    tracing::debug!(state = ?state, "Checkpoint transform closed");
}

/// Hand a released batch to the sink, one item at a time, FIFO.
///
/// Each delivery completes before the next is attempted, so sink
/// back-pressure stalls the transform rather than reordering items.
/// Stops at the first rejection; the caller treats that as fatal.
async fn release<T: Send>(
    sink: &mut dyn ItemSink<T>,
    items: Vec<T>,
    metrics: &BufferMetrics,
) -> Result<(), StreamError> {
    metrics.set_depth(0);
    let total = items.len();
    let mut delivered = 0usize;
    for item in items {
        if let Err(e) = sink.deliver(item).await {
            tracing::warn!(
                error = %e,
                delivered,
                undelivered = total - delivered,
                "Sink rejected release"
            );
            return Err(e);
        }
        delivered += 1;
        metrics.record_released(1);
    }
    Ok(())
}

/// Best-effort extraction of a panic payload message.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
