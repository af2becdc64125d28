//! Span exporters and reporters
//!
//! A [`SpanReporter`] is the fire-and-forget sink the tracer hands finished
//! spans to. Reporters never surface errors: failures are logged and counted.
//! Reporters batch spans and pass them to a [`SpanExporter`].

use super::config::{BatchConfig, ExporterConfig, ExporterType, ReportMode};
use super::error::{TracingError, TracingResult};
use super::span::{Span, SpanKind, StatusCode, TraceId, ERROR_TAG};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Trait for span exporters
pub trait SpanExporter: Send + Sync {
    /// Export a batch of spans
    fn export(&self, spans: &[Span]) -> TracingResult<()>;

    /// Shutdown the exporter
    fn shutdown(&self) -> TracingResult<()>;

    /// Force flush any buffered spans
    fn force_flush(&self) -> TracingResult<()>;
}

/// Counters kept by a reporter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStats {
    /// Spans discarded because the queue was full or closed
    pub dropped: u64,
    /// Export calls that returned an error
    pub export_failures: u64,
}

#[derive(Debug, Default)]
struct ReportCounters {
    dropped: AtomicU64,
    export_failures: AtomicU64,
}

impl ReportCounters {
    fn snapshot(&self) -> ReportStats {
        ReportStats {
            dropped: self.dropped.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
        }
    }
}

/// Fire-and-forget sink for finished spans
pub trait SpanReporter: Send + Sync {
    /// Hand over a finished span. Must not block meaningfully or fail.
    fn report(&self, span: Span);

    /// Push buffered spans to the exporter, best effort
    fn flush(&self) {}

    /// Reporter counters
    fn stats(&self) -> ReportStats {
        ReportStats::default()
    }
}

/// No-op exporter (does nothing)
#[derive(Debug, Default)]
pub struct NoopExporter;

impl NoopExporter {
    /// Create a new no-op exporter
    pub fn new() -> Self {
        Self
    }
}

impl SpanExporter for NoopExporter {
    fn export(&self, _spans: &[Span]) -> TracingResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> TracingResult<()> {
        Ok(())
    }

    fn force_flush(&self) -> TracingResult<()> {
        Ok(())
    }
}

/// Console exporter: one Zipkin v2 JSON document per span on stdout
#[derive(Debug)]
pub struct ConsoleExporter {
    service_name: String,
    pretty: bool,
}

impl ConsoleExporter {
    /// Create a new console exporter
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            pretty: false,
        }
    }

    /// Create a pretty-printing console exporter
    pub fn pretty(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            pretty: true,
        }
    }

    fn render(&self, span: &Span) -> TracingResult<String> {
        let zipkin = ZipkinSpan::from_span(span, &self.service_name);
        let json = if self.pretty {
            serde_json::to_string_pretty(&zipkin)?
        } else {
            serde_json::to_string(&zipkin)?
        };
        Ok(json)
    }
}

impl SpanExporter for ConsoleExporter {
    fn export(&self, spans: &[Span]) -> TracingResult<()> {
        let mut out = std::io::stdout().lock();
        for span in spans {
            writeln!(out, "{}", self.render(span)?)?;
        }
        Ok(())
    }

    fn shutdown(&self) -> TracingResult<()> {
        self.force_flush()
    }

    fn force_flush(&self) -> TracingResult<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// In-memory exporter, also usable directly as a reporter in tests
#[derive(Debug)]
pub struct InMemoryExporter {
    spans: Mutex<Vec<Span>>,
    max_spans: usize,
}

impl Default for InMemoryExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExporter {
    /// Create a new in-memory exporter
    pub fn new() -> Self {
        Self::with_max_spans(10_000)
    }

    /// Create with a maximum span limit
    pub fn with_max_spans(max_spans: usize) -> Self {
        Self {
            spans: Mutex::new(Vec::new()),
            max_spans,
        }
    }

    /// Get all exported spans
    pub fn get_spans(&self) -> Vec<Span> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Get span count
    pub fn span_count(&self) -> usize {
        self.spans.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Clear all spans
    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }

    /// Find spans by name
    pub fn find_by_name(&self, name: &str) -> Vec<Span> {
        self.filter(|s| s.name() == name)
    }

    /// Find spans by kind
    pub fn find_by_kind(&self, kind: SpanKind) -> Vec<Span> {
        self.filter(|s| s.kind() == kind)
    }

    /// Find spans belonging to a trace
    pub fn find_by_trace(&self, trace_id: TraceId) -> Vec<Span> {
        self.filter(|s| s.context().trace_id == trace_id)
    }

    fn filter(&self, predicate: impl Fn(&Span) -> bool) -> Vec<Span> {
        self.spans
            .lock()
            .map(|spans| spans.iter().filter(|s| predicate(s)).cloned().collect())
            .unwrap_or_default()
    }

    fn store(&self, spans: impl IntoIterator<Item = Span>) -> TracingResult<()> {
        let mut stored = self
            .spans
            .lock()
            .map_err(|_| TracingError::Export("lock poisoned".to_string()))?;

        for span in spans {
            if stored.len() < self.max_spans {
                stored.push(span);
            }
        }

        Ok(())
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&self, spans: &[Span]) -> TracingResult<()> {
        self.store(spans.iter().cloned())
    }

    fn shutdown(&self) -> TracingResult<()> {
        Ok(())
    }

    fn force_flush(&self) -> TracingResult<()> {
        Ok(())
    }
}

impl SpanReporter for InMemoryExporter {
    fn report(&self, span: Span) {
        if let Err(e) = self.store(std::iter::once(span)) {
            warn!(error = %e, "failed to store span");
        }
    }
}

/// Zipkin v2 span format
#[derive(Debug, Clone, Serialize)]
pub struct ZipkinSpan {
    /// Trace ID (hex)
    #[serde(rename = "traceId")]
    pub trace_id: String,

    /// Span ID (hex)
    pub id: String,

    /// Parent ID (hex)
    #[serde(rename = "parentId", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Name
    pub name: String,

    /// Kind
    pub kind: SpanKind,

    /// Timestamp (microseconds)
    pub timestamp: i64,

    /// Duration (microseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    /// Debug flag
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,

    /// Local endpoint
    #[serde(rename = "localEndpoint")]
    pub local_endpoint: ZipkinEndpoint,

    /// Tags
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Zipkin endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ZipkinEndpoint {
    /// Service name
    #[serde(rename = "serviceName")]
    pub service_name: String,
}

impl ZipkinSpan {
    /// Create from span with service name
    pub fn from_span(span: &Span, service_name: &str) -> Self {
        let context = span.context();

        let mut tags = span.tags().clone();
        if span.status().code == StatusCode::Error && !tags.contains_key(ERROR_TAG) {
            let message = span.status().message.clone().unwrap_or_default();
            tags.insert(ERROR_TAG.to_string(), message);
        }

        Self {
            trace_id: context.trace_id.to_hex(),
            id: context.span_id.to_hex(),
            parent_id: context.parent_span_id.map(|id| id.to_hex()),
            name: span.name().to_string(),
            kind: span.kind(),
            timestamp: span.start_time().timestamp_micros(),
            duration: span
                .duration()
                .and_then(|d| d.num_microseconds())
                .map(|us| us.max(1)),
            debug: context.is_debug(),
            local_endpoint: ZipkinEndpoint {
                service_name: service_name.to_string(),
            },
            tags,
        }
    }
}

/// Synchronous batch processor: queues spans and exports from the calling
/// thread once a batch fills up.
pub struct BatchSpanProcessor {
    exporter: Arc<dyn SpanExporter>,
    pending: Mutex<VecDeque<Span>>,
    max_batch_size: usize,
    max_queue_size: usize,
    counters: ReportCounters,
}

impl BatchSpanProcessor {
    /// Create a new batch processor
    pub fn new(
        exporter: Arc<dyn SpanExporter>,
        max_batch_size: usize,
        max_queue_size: usize,
    ) -> Self {
        Self {
            exporter,
            pending: Mutex::new(VecDeque::new()),
            max_batch_size: max_batch_size.max(1),
            max_queue_size: max_queue_size.max(1),
            counters: ReportCounters::default(),
        }
    }

    /// Create from batch configuration
    pub fn from_config(exporter: Arc<dyn SpanExporter>, config: &BatchConfig) -> Self {
        Self::new(exporter, config.max_batch_size, config.max_queue_size)
    }

    /// Add a span to the queue
    pub fn on_end(&self, span: Span) -> TracingResult<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| TracingError::Export("lock poisoned".to_string()))?;

        // Drop oldest if queue is full
        while pending.len() >= self.max_queue_size {
            pending.pop_front();
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }

        pending.push_back(span);

        if pending.len() >= self.max_batch_size {
            let batch: Vec<Span> = pending.drain(..self.max_batch_size).collect();
            drop(pending);
            self.export(&batch)?;
        }

        Ok(())
    }

    /// Flush all pending spans
    pub fn flush(&self) -> TracingResult<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| TracingError::Export("lock poisoned".to_string()))?;

        if !pending.is_empty() {
            let batch: Vec<Span> = pending.drain(..).collect();
            drop(pending);
            self.export(&batch)?;
        }

        self.exporter.force_flush()
    }

    /// Shutdown the processor
    pub fn shutdown(&self) -> TracingResult<()> {
        self.flush()?;
        self.exporter.shutdown()
    }

    /// Get pending span count
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn export(&self, batch: &[Span]) -> TracingResult<()> {
        let result = self.exporter.export(batch);
        if result.is_err() {
            self.counters.export_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl SpanReporter for BatchSpanProcessor {
    fn report(&self, span: Span) {
        if let Err(e) = self.on_end(span) {
            warn!(error = %e, "failed to report span");
        }
    }

    fn flush(&self) {
        if let Err(e) = BatchSpanProcessor::flush(self) {
            warn!(error = %e, "failed to flush spans");
        }
    }

    fn stats(&self) -> ReportStats {
        self.counters.snapshot()
    }
}

impl std::fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("max_batch_size", &self.max_batch_size)
            .field("max_queue_size", &self.max_queue_size)
            .field("pending", &self.pending_count())
            .finish()
    }
}

enum Command {
    Report(Span),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Asynchronous reporter: spans go onto a bounded channel without waiting,
/// a background task batches them by size or by `scheduled_delay`.
#[derive(Debug)]
pub struct ChannelReporter {
    tx: mpsc::Sender<Command>,
    counters: Arc<ReportCounters>,
}

impl ChannelReporter {
    /// Spawn the batching task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TracingError::Config`] when called outside a runtime or
    /// with a zero `scheduled_delay`.
    pub fn start(exporter: Arc<dyn SpanExporter>, config: &BatchConfig) -> TracingResult<Self> {
        if config.scheduled_delay.is_zero() {
            return Err(TracingError::Config(
                "batch.scheduled_delay must be greater than 0 for async reporting".to_string(),
            ));
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            TracingError::Config("async reporting requires a running tokio runtime".to_string())
        })?;

        let (tx, rx) = mpsc::channel(config.max_queue_size.max(1));
        let counters = Arc::new(ReportCounters::default());

        handle.spawn(run_batch_loop(
            exporter,
            rx,
            Arc::clone(&counters),
            config.max_batch_size.max(1),
            config.scheduled_delay,
        ));

        Ok(Self { tx, counters })
    }

    /// Export everything queued so far and wait for it
    pub async fn force_flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Export everything queued, shut the exporter down and stop the task.
    /// Spans reported afterwards are dropped.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl SpanReporter for ChannelReporter {
    fn report(&self, span: Span) {
        match self.tx.try_send(Command::Report(span)) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("span queue full, dropping span");
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("span reporter stopped, dropping span");
            },
        }
    }

    fn flush(&self) {
        let (done_tx, _done_rx) = oneshot::channel();
        let _ = self.tx.try_send(Command::Flush(done_tx));
    }

    fn stats(&self) -> ReportStats {
        self.counters.snapshot()
    }
}

async fn run_batch_loop(
    exporter: Arc<dyn SpanExporter>,
    mut rx: mpsc::Receiver<Command>,
    counters: Arc<ReportCounters>,
    max_batch_size: usize,
    scheduled_delay: Duration,
) {
    let mut batch = Vec::with_capacity(max_batch_size);
    let mut ticker = tokio::time::interval(scheduled_delay);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Report(span)) => {
                    batch.push(span);
                    if batch.len() >= max_batch_size {
                        export_batch(exporter.as_ref(), &mut batch, &counters);
                    }
                },
                Some(Command::Flush(done)) => {
                    export_batch(exporter.as_ref(), &mut batch, &counters);
                    if let Err(e) = exporter.force_flush() {
                        warn!(error = %e, "failed to flush exporter");
                    }
                    let _ = done.send(());
                },
                Some(Command::Shutdown(done)) => {
                    export_batch(exporter.as_ref(), &mut batch, &counters);
                    if let Err(e) = exporter.shutdown() {
                        warn!(error = %e, "failed to shut down exporter");
                    }
                    let _ = done.send(());
                    break;
                },
                None => {
                    export_batch(exporter.as_ref(), &mut batch, &counters);
                    break;
                },
            },
            _ = ticker.tick() => export_batch(exporter.as_ref(), &mut batch, &counters),
        }
    }

    debug!("span reporter stopped");
}

fn export_batch(exporter: &dyn SpanExporter, batch: &mut Vec<Span>, counters: &ReportCounters) {
    if batch.is_empty() {
        return;
    }

    let spans = std::mem::take(batch);
    if let Err(e) = exporter.export(&spans) {
        counters.export_failures.fetch_add(1, Ordering::Relaxed);
        warn!(error = %e, count = spans.len(), "failed to export spans");
    }
}

/// Create an exporter from configuration
pub fn create_exporter(config: &ExporterConfig, service_name: &str) -> Arc<dyn SpanExporter> {
    match config.exporter_type {
        ExporterType::None => Arc::new(NoopExporter::new()),
        ExporterType::Console if config.pretty => Arc::new(ConsoleExporter::pretty(service_name)),
        ExporterType::Console => Arc::new(ConsoleExporter::new(service_name)),
        ExporterType::Memory => Arc::new(InMemoryExporter::new()),
    }
}

/// Create a reporter in front of `exporter` according to the batch mode
pub fn create_reporter(
    exporter: Arc<dyn SpanExporter>,
    config: &BatchConfig,
) -> TracingResult<Arc<dyn SpanReporter>> {
    let reporter: Arc<dyn SpanReporter> = match config.mode {
        ReportMode::Sync => Arc::new(BatchSpanProcessor::from_config(exporter, config)),
        ReportMode::Async => Arc::new(ChannelReporter::start(exporter, config)?),
    };
    Ok(reporter)
}
