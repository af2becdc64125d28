//! Tracing error types

use thiserror::Error;

/// Tracing error types
#[derive(Debug, Error)]
pub enum TracingError {
    /// Configuration error
    #[error("tracing config error: {0}")]
    Config(String),

    /// Invalid trace ID
    #[error("invalid trace ID: {0}")]
    InvalidTraceId(String),

    /// Invalid span ID
    #[error("invalid span ID: {0}")]
    InvalidSpanId(String),

    /// Propagation error
    #[error("propagation error: {0}")]
    Propagation(String),

    /// Export error
    #[error("export error: {0}")]
    Export(String),

    /// Span already ended
    #[error("span already ended: {0}")]
    SpanAlreadyEnded(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for tracing operations
pub type TracingResult<T> = Result<T, TracingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TracingError::Config("invalid ratio".to_string());
        assert!(err.to_string().contains("config error"));

        let err = TracingError::SpanAlreadyEnded("00000000000000ab".to_string());
        assert_eq!(err.to_string(), "span already ended: 00000000000000ab");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let err: TracingError = io_err.into();
        assert!(matches!(err, TracingError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: TracingError = json_err.into();
        assert!(matches!(err, TracingError::Serialization(_)));
    }
}
