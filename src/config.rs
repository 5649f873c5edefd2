//! Transform configuration.
//!
//! Two construction forms are supported: [`CheckpointConfig::new`] takes
//! the checkpoint predicate directly and applies defaults everywhere
//! else, while [`CheckpointConfig::builder`] exposes every knob and
//! validates on `build()`.

use crate::buffer::DEFAULT_MAX_QUEUED;
use crate::error::StreamError;

/// Default capacity for the command channel feeding the transform task.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default capacity for the notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Boxed checkpoint predicate.
pub type CheckpointPredicate<T> = Box<dyn Fn(&T) -> bool + Send>;

/// Configuration for a checkpoint stream transform.
///
/// Immutable for the lifetime of one transform instance.
pub struct CheckpointConfig<T> {
    /// Checkpoint predicate; a `true` result releases the queue.
    pub(crate) is_checkpoint: CheckpointPredicate<T>,

    /// Overflow threshold triggering forced release.
    pub(crate) max_queued: usize,

    /// Command channel capacity (ingest/flush/reset back-pressure bound).
    pub(crate) channel_capacity: usize,

    /// Notification channel capacity.
    pub(crate) event_capacity: usize,
}

impl<T> CheckpointConfig<T> {
    /// Flat construction form: predicate only, defaults for everything
    /// else.
    #[must_use]
    pub fn new(is_checkpoint: impl Fn(&T) -> bool + Send + 'static) -> Self {
        Self {
            is_checkpoint: Box::new(is_checkpoint),
            max_queued: DEFAULT_MAX_QUEUED,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> CheckpointConfigBuilder<T> {
        CheckpointConfigBuilder::default()
    }

    /// The configured overflow threshold.
    #[must_use]
    pub fn max_queued(&self) -> usize {
        self.max_queued
    }
}

impl<T> std::fmt::Debug for CheckpointConfig<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointConfig")
            .field("max_queued", &self.max_queued)
            .field("channel_capacity", &self.channel_capacity)
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CheckpointConfig`].
pub struct CheckpointConfigBuilder<T> {
    is_checkpoint: Option<CheckpointPredicate<T>>,
    max_queued: Option<usize>,
    channel_capacity: Option<usize>,
    event_capacity: Option<usize>,
}

impl<T> Default for CheckpointConfigBuilder<T> {
    fn default() -> Self {
        Self {
            is_checkpoint: None,
            max_queued: None,
            channel_capacity: None,
            event_capacity: None,
        }
    }
}

impl<T> CheckpointConfigBuilder<T> {
    /// Sets the checkpoint predicate (required).
    #[must_use]
    pub fn is_checkpoint(mut self, predicate: impl Fn(&T) -> bool + Send + 'static) -> Self {
        self.is_checkpoint = Some(Box::new(predicate));
        self
    }

    /// Sets the overflow threshold (must be positive).
    #[must_use]
    pub fn max_queued(mut self, max_queued: usize) -> Self {
        self.max_queued = Some(max_queued);
        self
    }

    /// Sets the command channel capacity.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// Sets the notification channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] if the predicate is missing or
    /// `max_queued` is 0.
    pub fn build(self) -> Result<CheckpointConfig<T>, StreamError> {
        let Some(is_checkpoint) = self.is_checkpoint else {
            return Err(StreamError::Config(
                "is_checkpoint predicate is required".to_string(),
            ));
        };

        let max_queued = self.max_queued.unwrap_or(DEFAULT_MAX_QUEUED);
        if max_queued == 0 {
            return Err(StreamError::Config(
                "max_queued must be > 0".to_string(),
            ));
        }

        let channel_capacity = self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let event_capacity = self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY);
        if channel_capacity == 0 || event_capacity == 0 {
            return Err(StreamError::Config(
                "channel capacities must be > 0".to_string(),
            ));
        }

        Ok(CheckpointConfig {
            is_checkpoint,
            max_queued,
            channel_capacity,
            event_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_form_applies_defaults() {
        let config = CheckpointConfig::new(|item: &u32| *item == 0);
        assert_eq!(config.max_queued, DEFAULT_MAX_QUEUED);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_builder_form() {
        let config = CheckpointConfig::builder()
            .is_checkpoint(|item: &u32| *item == 0)
            .max_queued(5)
            .channel_capacity(8)
            .build()
            .unwrap();
        assert_eq!(config.max_queued, 5);
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_builder_rejects_missing_predicate() {
        let result = CheckpointConfigBuilder::<u32>::default().build();
        assert!(matches!(result, Err(StreamError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_zero_max_queued() {
        let result = CheckpointConfig::builder()
            .is_checkpoint(|_: &u32| false)
            .max_queued(0)
            .build();
        assert!(matches!(result, Err(StreamError::Config(_))));
    }
}
