//! Error types for the messaging module.

use crate::modules::tracing::TracingError;
use thiserror::Error;

/// Errors raised by the in-process transport and by decorator setup.
///
/// Failures of a wrapped producer or handler are never converted into this
/// type; they pass through the decorator unchanged.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The receiving side of a channel is gone.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// A message could not be dispatched to its handler.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Invalid messaging configuration.
    #[error("messaging config error: {0}")]
    Config(String),

    /// Tracer setup failed.
    #[error(transparent)]
    Tracing(#[from] TracingError),
}

/// Result type for messaging operations.
pub type MessagingResult<T> = Result<T, MessagingError>;
