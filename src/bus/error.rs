//! Message bus errors.

use thiserror::Error;

/// Boxed error returned by handlers, hooks and step executors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced to publishers.
///
/// Handler failures are never returned here; they are isolated, logged and
/// counted in the bus metrics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The message failed validation and was not enqueued.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The bus has been closed and accepts no further messages.
    #[error("message bus is closed")]
    Closed,
}
