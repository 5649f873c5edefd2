//! Notifications emitted by the transform.

use crate::error::StreamError;

/// An event delivered on the transform's notification channel.
///
/// At most one `Checkpoint` event fires per release, synchronously with
/// respect to that release (the released items are already accepted
/// downstream when the event is observable). Exactly one terminal event
/// (`Finished` or `Failed`) is emitted per transform instance.
#[derive(Debug)]
pub enum StreamEvent<T> {
    /// A checkpoint-triggered release completed. Carries the item the
    /// predicate matched. Never emitted for overflow, flush, or drain
    /// releases.
    Checkpoint {
        /// The triggering item.
        item: T,
    },

    /// Normal end-of-input: remaining items were drained downstream and
    /// the sink is closed.
    Finished,

    /// Terminal failure: the queue was drained downstream (as far as
    /// the sink allowed) before this error surfaced.
    Failed {
        /// The fatal error.
        error: StreamError,
    },
}
