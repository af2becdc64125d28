//! In-process transport: a channel-backed producer and a dispatcher that
//! delivers received messages to a handler.

use super::client::{MessageHandler, MessageProducer};
use super::error::MessagingError;
use super::message::Message;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default number of handler invocations in flight at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Producer that sends into a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelProducer {
    tx: mpsc::Sender<Message>,
}

impl ChannelProducer {
    /// Create a producer and the receiver its messages arrive on
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl MessageProducer for ChannelProducer {
    type Output = ();
    type Error = MessagingError;

    fn send(&self, message: Message) -> impl Future<Output = Result<(), MessagingError>> + Send {
        async move {
            let destination = message.destination.clone().unwrap_or_default();
            self.tx
                .send(message)
                .await
                .map_err(|_| MessagingError::ChannelClosed(destination))
        }
    }
}

/// Outcome counts of a dispatcher run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages handled successfully
    pub delivered: u64,
    /// Messages whose handler returned an error
    pub failed: u64,
    /// Messages whose handler panicked
    pub panicked: u64,
}

/// Pulls messages off a channel and runs the handler for each on its own
/// task, at most `max_concurrency` at a time.
pub struct Dispatcher<H> {
    handler: Arc<H>,
    max_concurrency: usize,
}

impl<H> Dispatcher<H>
where
    H: MessageHandler + 'static,
    H::Output: 'static,
    H::Error: 'static,
{
    /// Create a dispatcher for `handler`
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Limit concurrent handler invocations (at least 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Run until every sender is dropped and all in-flight handlers finish.
    /// Handler failures and panics are logged and counted.
    pub async fn run(self, mut rx: mpsc::Receiver<Message>) -> DispatchStats {
        let mut stats = DispatchStats::default();
        let mut in_flight = JoinSet::new();

        while let Some(message) = rx.recv().await {
            while in_flight.len() >= self.max_concurrency {
                if let Some(joined) = in_flight.join_next().await {
                    record(&mut stats, joined);
                }
            }

            let handler = Arc::clone(&self.handler);
            in_flight.spawn(async move {
                handler
                    .handle(message)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            });
        }

        debug!(in_flight = in_flight.len(), "channel closed, draining handlers");
        while let Some(joined) = in_flight.join_next().await {
            record(&mut stats, joined);
        }

        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            panicked = stats.panicked,
            "dispatcher stopped"
        );
        stats
    }
}

fn record(stats: &mut DispatchStats, joined: Result<Result<(), String>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => stats.delivered += 1,
        Ok(Err(e)) => {
            stats.failed += 1;
            warn!(error = %e, "message handler failed");
        },
        Err(e) if e.is_panic() => {
            stats.panicked += 1;
            warn!("message handler panicked");
        },
        Err(e) => {
            let e = MessagingError::Dispatch(e.to_string());
            warn!(error = %e, "message handler task did not complete");
        },
    }
}

impl<H> std::fmt::Debug for Dispatcher<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::messaging::client::handler_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_channel_producer() {
        let (producer, mut rx) = ChannelProducer::channel(4);
        producer
            .send(Message::new("hello").with_destination("orders"))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.destination(), Some("orders"));
    }

    #[tokio::test]
    async fn test_channel_producer_closed() {
        let (producer, rx) = ChannelProducer::channel(4);
        drop(rx);

        let err = producer
            .send(Message::new("x").with_destination("orders"))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::ChannelClosed(ref d) if d == "orders"));
    }

    #[tokio::test]
    async fn test_dispatcher_counts_outcomes() {
        let (producer, rx) = ChannelProducer::channel(16);
        let handler = handler_fn(|msg: Message| async move {
            match msg.payload.as_ref() {
                b"fail" => Err("rejected".to_string()),
                b"panic" => panic!("handler panic"),
                _ => Ok(()),
            }
        });

        for payload in ["ok", "fail", "ok", "panic"] {
            producer.send(Message::new(payload)).await.unwrap();
        }
        drop(producer);

        let stats = Dispatcher::new(handler).run(rx).await;
        assert_eq!(
            stats,
            DispatchStats {
                delivered: 2,
                failed: 1,
                panicked: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_dispatcher_respects_concurrency_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handler = {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handler_fn(move |_msg: Message| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            })
        };

        let (producer, rx) = ChannelProducer::channel(32);
        for _ in 0..20 {
            producer.send(Message::new("x")).await.unwrap();
        }
        drop(producer);

        let stats = Dispatcher::new(handler).with_max_concurrency(3).run(rx).await;
        assert_eq!(stats.delivered, 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
