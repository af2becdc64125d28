//! Message type.

use crate::modules::tracing::Metadata;
use bytes::Bytes;

/// A message as seen by producers and handlers.
///
/// `metadata` is the only channel trace context travels through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Opaque payload.
    pub payload: Bytes,

    /// Headers / properties.
    pub metadata: Metadata,

    /// Exchange, queue or topic the message is sent to or received from.
    pub destination: Option<String>,
}

impl Message {
    /// Create a message with empty metadata and no destination.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            metadata: Metadata::new(),
            destination: None,
        }
    }

    /// Set the destination.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Add a metadata entry.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata entry.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Destination, if set.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let msg = Message::new("hello")
            .with_destination("orders")
            .with_header("content-type", "text/plain");

        assert_eq!(msg.payload, Bytes::from_static(b"hello"));
        assert_eq!(msg.destination(), Some("orders"));
        assert_eq!(msg.header("content-type"), Some("text/plain"));
        assert_eq!(msg.header("missing"), None);
    }
}
