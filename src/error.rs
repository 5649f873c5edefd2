//! Error types for the checkpoint stream transform.

/// Errors from checkpoint stream operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Invalid configuration value
    Config(String),

    /// Transform is already terminal; the command was not accepted
    Closed,

    /// Output channel rejected a released item
    Downstream(String),

    /// Checkpoint predicate panicked while evaluating an item
    Predicate(String),

    /// Externally supplied failure signal, surfaced unchanged after drain
    Aborted {
        /// The caller's original error object.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Config error: {msg}"),
            Self::Closed => write!(f, "Stream is closed"),
            Self::Downstream(msg) => write!(f, "Downstream error: {msg}"),
            Self::Predicate(msg) => {
                write!(f, "Checkpoint predicate panicked: {msg}")
            }
            Self::Aborted { source } => write!(f, "Stream aborted: {source}"),
        }
    }
}
