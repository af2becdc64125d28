//! Trace-propagating decorators for producers and handlers

use super::client::{MessageHandler, MessageProducer};
use super::config::MessagingConfig;
use super::error::MessagingResult;
use super::message::Message;
use crate::modules::tracing::scope;
use crate::modules::tracing::{Span, SpanKind, TraceContext, Tracer, TracingConfig};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// Tag naming the remote (broker) service
pub const SERVICE_TAG: &str = "service";

/// Tag naming the message destination
pub const DESTINATION_TAG: &str = "messaging.destination";

/// Tag set on spans whose operation was dropped before completing
pub const CANCELLED_TAG: &str = "cancelled";

/// Factory for decorated producers and handlers
#[derive(Debug, Clone)]
pub struct MessagingTracing {
    tracer: Arc<Tracer>,
    config: MessagingConfig,
}

impl MessagingTracing {
    /// Create from a tracer and a decorator configuration
    pub fn new(tracer: Arc<Tracer>, config: MessagingConfig) -> Self {
        Self { tracer, config }
    }

    /// Validate both configurations and build the tracer
    pub fn from_config(tracing: &TracingConfig, messaging: MessagingConfig) -> MessagingResult<Self> {
        messaging.validate()?;
        let tracer = Tracer::from_config(tracing)?;
        Ok(Self::new(Arc::new(tracer), messaging))
    }

    /// The tracer spans are created with
    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    /// Decorator configuration
    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// Wrap a producer. Returns it unchanged when decoration is disabled.
    pub fn decorate_producer<P: MessageProducer>(&self, producer: P) -> Decorated<P> {
        self.decorate(producer)
    }

    /// Wrap a handler. Returns it unchanged when decoration is disabled.
    pub fn decorate_consumer<H: MessageHandler>(&self, handler: H) -> Decorated<H> {
        self.decorate(handler)
    }

    fn decorate<T>(&self, inner: T) -> Decorated<T> {
        if !self.config.enabled {
            return Decorated::Plain(inner);
        }

        Decorated::Traced(Traced {
            inner,
            tracer: Arc::clone(&self.tracer),
            remote_service_name: self.config.remote_service_name.clone(),
        })
    }
}

/// Result of decoration: the untouched value, or a traced wrapper
pub enum Decorated<T> {
    /// Decoration disabled
    Plain(T),

    /// Decoration enabled
    Traced(Traced<T>),
}

impl<T> Decorated<T> {
    /// Whether spans are recorded
    pub fn is_traced(&self) -> bool {
        matches!(self, Self::Traced(_))
    }

    /// The wrapped value
    pub fn inner(&self) -> &T {
        match self {
            Self::Plain(inner) => inner,
            Self::Traced(traced) => &traced.inner,
        }
    }

    /// Unwrap, returning the original value
    pub fn into_inner(self) -> T {
        match self {
            Self::Plain(inner) => inner,
            Self::Traced(traced) => traced.inner,
        }
    }
}

impl<T> fmt::Debug for Decorated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Decorated::Plain"),
            Self::Traced(traced) => f
                .debug_struct("Decorated::Traced")
                .field("remote_service_name", &traced.remote_service_name)
                .finish_non_exhaustive(),
        }
    }
}

impl<P: MessageProducer> MessageProducer for Decorated<P> {
    type Output = P::Output;
    type Error = P::Error;

    /// Send as a child of the ambient context, or as a new trace when there
    /// is none.
    fn send(&self, message: Message) -> impl Future<Output = Result<P::Output, P::Error>> + Send {
        let parent = scope::current();
        async move {
            match self {
                Self::Plain(inner) => inner.send(message).await,
                Self::Traced(traced) => traced.send_in(parent.as_ref(), message).await,
            }
        }
    }
}

impl<H: MessageHandler> MessageHandler for Decorated<H> {
    type Output = H::Output;
    type Error = H::Error;

    fn handle(&self, message: Message) -> impl Future<Output = Result<H::Output, H::Error>> + Send {
        async move {
            match self {
                Self::Plain(inner) => inner.handle(message).await,
                Self::Traced(traced) => traced.handle_traced(message).await,
            }
        }
    }
}

/// A producer or handler with tracing attached
pub struct Traced<T> {
    inner: T,
    tracer: Arc<Tracer>,
    remote_service_name: String,
}

impl<T> Traced<T> {
    fn open_span(&self, parent: Option<&TraceContext>, message: &Message, kind: SpanKind) -> Span {
        let destination = message.destination();
        let verb = match kind {
            SpanKind::Producer => "send",
            SpanKind::Consumer => "receive",
        };
        let name = format!(
            "{} {}",
            destination.unwrap_or(self.remote_service_name.as_str()),
            verb
        );

        let span = self
            .tracer
            .new_child_span(parent, name, kind)
            .with_tag(SERVICE_TAG, self.remote_service_name.as_str());

        match destination {
            Some(destination) => span.with_tag(DESTINATION_TAG, destination),
            None => span,
        }
    }
}

impl<P: MessageProducer> Traced<P> {
    /// Send with an explicit parent context instead of the ambient one.
    ///
    /// The span is opened and the context injected before the returned
    /// future is first polled.
    pub fn send_in<'a>(
        &'a self,
        parent: Option<&TraceContext>,
        mut message: Message,
    ) -> impl Future<Output = Result<P::Output, P::Error>> + Send + 'a {
        let span = self.open_span(parent, &message, SpanKind::Producer);
        self.tracer.inject(Some(span.context()), &mut message.metadata);
        let guard = SpanGuard::start(Arc::clone(&self.tracer), span);

        Instrumented::new(self.inner.send(message), guard)
    }
}

impl<H: MessageHandler> Traced<H> {
    fn handle_traced(
        &self,
        message: Message,
    ) -> impl Future<Output = Result<H::Output, H::Error>> + Send + '_ {
        let parent = self.tracer.extract(&message.metadata);
        let span = self.open_span(parent.as_ref(), &message, SpanKind::Consumer);
        let context = span.context().clone();
        let guard = SpanGuard::start(Arc::clone(&self.tracer), span);

        // The handler may read the ambient context while building its future
        let handling = scope::sync_scope(Some(context.clone()), || self.inner.handle(message));

        Instrumented::new(scope::scope(Some(context), handling), guard)
    }
}

/// Owns an open span until the operation settles. Dropping it early closes
/// the span as cancelled (or panicked) and reports it.
struct SpanGuard {
    tracer: Arc<Tracer>,
    span: Option<Span>,
}

impl SpanGuard {
    fn start(tracer: Arc<Tracer>, mut span: Span) -> Self {
        if let Err(e) = span.start() {
            debug!(error = %e, "span could not be started");
        }
        Self {
            tracer,
            span: Some(span),
        }
    }

    fn finish<T, E: fmt::Display>(&mut self, result: &Result<T, E>) {
        let Some(mut span) = self.span.take() else {
            return;
        };

        let closed = match result {
            Ok(_) => span.end_ok(),
            Err(e) => span.end_error(e.to_string()),
        };
        if let Err(e) = closed {
            debug!(error = %e, "span closed twice");
        }

        self.tracer.report(span);
    }

    fn close_early(&mut self, reason: &str) {
        let Some(mut span) = self.span.take() else {
            return;
        };

        debug!(span = span.name(), span_id = %span.context().span_id, reason, "span closed early");

        let _ = span.end_error(reason);
        self.tracer.report(span);
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.close_early("panicked");
            return;
        }

        if let Some(span) = self.span.as_mut() {
            let _ = span.set_tag(CANCELLED_TAG, "true");
        }
        self.close_early("cancelled");
    }
}

/// Drives the wrapped operation and settles its span. A panic while polling
/// closes the span as `panicked` before unwinding further.
struct Instrumented<F> {
    inner: Pin<Box<F>>,
    guard: SpanGuard,
}

impl<F> Instrumented<F> {
    fn new(inner: F, guard: SpanGuard) -> Self {
        Self {
            inner: Box::pin(inner),
            guard,
        }
    }
}

impl<F, T, E> Future for Instrumented<F>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match panic::catch_unwind(AssertUnwindSafe(|| this.inner.as_mut().poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(result)) => {
                this.guard.finish(&result);
                Poll::Ready(result)
            },
            Err(payload) => {
                this.guard.close_early("panicked");
                panic::resume_unwind(payload)
            },
        }
    }
}
