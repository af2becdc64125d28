//! Producer and handler contracts of a messaging client.

use super::message::Message;
use std::fmt;
use std::future::Future;

/// Sending side of a messaging client.
pub trait MessageProducer: Send + Sync {
    /// Value produced by a successful send.
    type Output: Send;

    /// Failure of a send.
    type Error: fmt::Display + Send;

    /// Send one message.
    fn send(&self, message: Message)
        -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Receiving side of a messaging client: invoked once per delivered message.
pub trait MessageHandler: Send + Sync {
    /// Value produced by successful handling.
    type Output: Send;

    /// Failure of the handler.
    type Error: fmt::Display + Send;

    /// Handle one message.
    fn handle(&self, message: Message)
        -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Producer backed by a closure, see [`producer_fn`].
#[derive(Clone, Copy)]
pub struct FnProducer<F> {
    f: F,
}

/// Handler backed by a closure, see [`handler_fn`].
#[derive(Clone, Copy)]
pub struct FnHandler<F> {
    f: F,
}

/// Turn `Fn(Message) -> Future<Output = Result<T, E>>` into a producer.
///
/// Synchronous sends can return [`std::future::ready`].
pub fn producer_fn<F>(f: F) -> FnProducer<F> {
    FnProducer { f }
}

/// Turn `Fn(Message) -> Future<Output = Result<T, E>>` into a handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F> {
    FnHandler { f }
}

impl<F, Fut, T, E> MessageProducer for FnProducer<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: fmt::Display + Send,
{
    type Output = T;
    type Error = E;

    fn send(&self, message: Message) -> impl Future<Output = Result<T, E>> + Send {
        (self.f)(message)
    }
}

impl<F, Fut, T, E> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: fmt::Display + Send,
{
    type Output = T;
    type Error = E;

    fn handle(&self, message: Message) -> impl Future<Output = Result<T, E>> + Send {
        (self.f)(message)
    }
}

impl<F> fmt::Debug for FnProducer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProducer").finish_non_exhaustive()
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;

    #[tokio::test]
    async fn test_producer_fn() {
        let producer = producer_fn(|msg: Message| ready(Ok::<_, String>(msg.payload.len())));
        assert_eq!(producer.send(Message::new("abc")).await, Ok(3));
    }

    #[tokio::test]
    async fn test_handler_fn_error() {
        let handler = handler_fn(|_msg: Message| async { Err::<(), _>("boom".to_string()) });
        assert_eq!(handler.handle(Message::new("x")).await, Err("boom".to_string()));
    }
}
