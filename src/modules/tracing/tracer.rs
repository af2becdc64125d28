//! Tracer: span creation, propagation and reporting

use super::config::{BatchConfig, PropagationFormat, TracingConfig};
use super::context::TraceContext;
use super::error::TracingResult;
use super::exporter::{
    create_exporter, create_reporter, BatchSpanProcessor, NoopExporter, SpanReporter,
};
use super::id::{IdGenerator, RandomIdGenerator};
use super::propagation::{create_propagator, Metadata, Propagator};
use super::sampler::{
    create_sampler, AlwaysOffSampler, AlwaysOnSampler, Sampler, SamplingParameters,
};
use super::span::{Span, SpanKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Creates spans, moves contexts in and out of message metadata and hands
/// finished spans to the reporter.
pub struct Tracer {
    /// Local service name
    service_name: String,

    /// Root sampler
    sampler: Arc<dyn Sampler>,

    /// Propagator
    propagator: Arc<dyn Propagator>,

    /// Id source
    id_generator: Arc<dyn IdGenerator>,

    /// Finished span sink
    reporter: Arc<dyn SpanReporter>,

    /// Statistics
    spans_started: AtomicU64,
    spans_reported: AtomicU64,
    spans_unsampled: AtomicU64,
}

impl Tracer {
    /// Start building a tracer
    pub fn builder(service_name: impl Into<String>) -> TracerBuilder {
        TracerBuilder::new(service_name)
    }

    /// Build a tracer from configuration.
    ///
    /// With `enabled = false` every root is unsampled: contexts still
    /// propagate, nothing is reported.
    pub fn from_config(config: &TracingConfig) -> TracingResult<Self> {
        config.validate()?;

        let sampler: Arc<dyn Sampler> = if config.enabled {
            Arc::from(create_sampler(&config.sampling))
        } else {
            Arc::new(AlwaysOffSampler::new())
        };

        let exporter = create_exporter(&config.exporter, &config.service_name);
        let reporter = create_reporter(exporter, &config.batch)?;

        debug!(
            service = %config.service_name,
            sampler = sampler.description(),
            "tracer configured"
        );

        Ok(Self::builder(config.service_name.clone())
            .sampler(sampler)
            .propagator(Arc::from(create_propagator(config.propagation)))
            .reporter(reporter)
            .build())
    }

    /// Get service name
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Get the propagator
    pub fn propagator(&self) -> &dyn Propagator {
        self.propagator.as_ref()
    }

    /// Write `context` into `metadata`.
    ///
    /// An absent or invalid context leaves `metadata` untouched. For a valid
    /// one, stale reserved keys are removed first, so forwarded or malformed
    /// values never leak downstream. An unsampled context without baggage
    /// then writes nothing.
    pub fn inject(&self, context: Option<&TraceContext>, metadata: &mut Metadata) {
        let Some(context) = context.filter(|c| c.is_valid()) else {
            return;
        };

        metadata.retain(|key, _| !self.propagator.is_reserved(key));
        if !context.is_sampled() && context.baggage.is_empty() {
            return;
        }

        self.propagator.inject(context, metadata);
    }

    /// Read a context from `metadata`; `None` when absent or malformed
    pub fn extract(&self, metadata: &Metadata) -> Option<TraceContext> {
        self.propagator.extract(metadata)
    }

    /// Create a span in the `Created` state.
    ///
    /// A valid parent yields a child in the same trace that inherits the
    /// parent's flags and baggage. Otherwise a new trace is started and the
    /// root sampler decides.
    pub fn new_child_span(
        &self,
        parent: Option<&TraceContext>,
        name: impl Into<String>,
        kind: SpanKind,
    ) -> Span {
        let name = name.into();
        self.spans_started.fetch_add(1, Ordering::Relaxed);

        let context = match parent.filter(|p| p.is_valid()) {
            Some(parent) => parent.child(self.id_generator.new_span_id()),
            None => {
                let trace_id = self.id_generator.new_trace_id();
                let decision = self.sampler.should_sample(&SamplingParameters {
                    trace_id,
                    name: &name,
                    kind,
                });
                TraceContext::new(trace_id, self.id_generator.new_span_id())
                    .with_sampled(decision.is_sampled())
            },
        };

        Span::new(context, name, kind)
    }

    /// Hand a finished span to the reporter. Unsampled spans are dropped.
    pub fn report(&self, span: Span) {
        if span.is_sampled() {
            self.spans_reported.fetch_add(1, Ordering::Relaxed);
            self.reporter.report(span);
        } else {
            self.spans_unsampled.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Flush the reporter, best effort
    pub fn flush(&self) {
        self.reporter.flush();
    }

    /// Get statistics
    pub fn stats(&self) -> TracerStats {
        let report = self.reporter.stats();
        TracerStats {
            spans_started: self.spans_started.load(Ordering::Relaxed),
            spans_reported: self.spans_reported.load(Ordering::Relaxed),
            spans_unsampled: self.spans_unsampled.load(Ordering::Relaxed),
            spans_dropped: report.dropped,
            export_failures: report.export_failures,
        }
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("service_name", &self.service_name)
            .field("sampler", &self.sampler.description())
            .field("id_generator", &self.id_generator)
            .finish()
    }
}

/// Tracer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracerStats {
    /// Spans created
    pub spans_started: u64,
    /// Spans handed to the reporter
    pub spans_reported: u64,
    /// Finished spans not reported because they were unsampled
    pub spans_unsampled: u64,
    /// Spans the reporter discarded
    pub spans_dropped: u64,
    /// Failed export calls
    pub export_failures: u64,
}

/// Builder for [`Tracer`]
pub struct TracerBuilder {
    service_name: String,
    sampler: Option<Arc<dyn Sampler>>,
    propagator: Option<Arc<dyn Propagator>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    reporter: Option<Arc<dyn SpanReporter>>,
}

impl TracerBuilder {
    /// Create a builder; defaults are always-on sampling, B3 multi-header
    /// propagation, random ids and a reporter that discards spans.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            sampler: None,
            propagator: None,
            id_generator: None,
            reporter: None,
        }
    }

    /// Set the root sampler
    pub fn sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Set the propagator
    pub fn propagator(mut self, propagator: Arc<dyn Propagator>) -> Self {
        self.propagator = Some(propagator);
        self
    }

    /// Set the id generator
    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Set the reporter
    pub fn reporter(mut self, reporter: Arc<dyn SpanReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Build the tracer
    pub fn build(self) -> Tracer {
        let reporter = self.reporter.unwrap_or_else(|| {
            Arc::new(BatchSpanProcessor::from_config(
                Arc::new(NoopExporter::new()),
                &BatchConfig::default(),
            ))
        });

        Tracer {
            service_name: self.service_name,
            sampler: self.sampler.unwrap_or_else(|| Arc::new(AlwaysOnSampler::new())),
            propagator: self
                .propagator
                .unwrap_or_else(|| Arc::from(create_propagator(PropagationFormat::B3Multi))),
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(RandomIdGenerator::new())),
            reporter,
            spans_started: AtomicU64::new(0),
            spans_reported: AtomicU64::new(0),
            spans_unsampled: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tracing::config::SamplingStrategy;
    use crate::modules::tracing::context::Baggage;
    use crate::modules::tracing::exporter::InMemoryExporter;
    use crate::modules::tracing::id::SequentialIdGenerator;
    use crate::modules::tracing::span::{SpanId, TraceId};

    fn create_test_tracer() -> (Tracer, Arc<InMemoryExporter>) {
        let exporter = Arc::new(InMemoryExporter::new());
        let tracer = Tracer::builder("test-service")
            .id_generator(Arc::new(SequentialIdGenerator::new()))
            .reporter(exporter.clone())
            .build();
        (tracer, exporter)
    }

    fn finish(mut span: Span) -> Span {
        span.start().unwrap();
        span.end_ok().unwrap();
        span
    }

    #[test]
    fn test_root_span() {
        let (tracer, _) = create_test_tracer();
        let span = tracer.new_child_span(None, "orders send", SpanKind::Producer);

        assert_eq!(span.context().trace_id, TraceId::new(0, 1));
        assert_eq!(span.context().span_id, SpanId::new(2));
        assert_eq!(span.context().parent_span_id, None);
        assert!(span.is_sampled());
        assert_eq!(span.kind(), SpanKind::Producer);
    }

    #[test]
    fn test_child_span_inherits() {
        let (tracer, _) = create_test_tracer();
        let parent = TraceContext::new(TraceId::new(0, 0xabc123), SpanId::new(0xdef456))
            .with_sampled(false)
            .with_baggage([("tenant", "acme")].into_iter().collect());

        let span = tracer.new_child_span(Some(&parent), "orders receive", SpanKind::Consumer);
        let ctx = span.context();

        assert_eq!(ctx.trace_id, parent.trace_id);
        assert_eq!(ctx.parent_span_id, Some(parent.span_id));
        assert_ne!(ctx.span_id, parent.span_id);
        assert!(!ctx.is_sampled());
        assert_eq!(ctx.baggage.get("tenant"), Some("acme"));
    }

    #[test]
    fn test_invalid_parent_starts_new_trace() {
        let (tracer, _) = create_test_tracer();
        let parent = TraceContext::new(TraceId::invalid(), SpanId::new(5));
        let span = tracer.new_child_span(Some(&parent), "x", SpanKind::Producer);

        assert!(span.context().trace_id.is_valid());
        assert_eq!(span.context().parent_span_id, None);
    }

    #[test]
    fn test_inject_extract() {
        let (tracer, _) = create_test_tracer();
        let span = tracer.new_child_span(None, "orders send", SpanKind::Producer);

        let mut metadata = Metadata::new();
        metadata.insert("content-type".to_string(), "application/json".to_string());
        tracer.inject(Some(span.context()), &mut metadata);

        assert_eq!(
            metadata.get("X-B3-TraceId").map(String::as_str),
            Some("00000000000000000000000000000001")
        );
        assert_eq!(metadata.get("content-type").map(String::as_str), Some("application/json"));

        let extracted = tracer.extract(&metadata).unwrap();
        assert_eq!(&extracted, span.context());
    }

    #[test]
    fn test_inject_replaces_stale_keys() {
        let (tracer, _) = create_test_tracer();
        let mut metadata = Metadata::new();
        metadata.insert("x-b3-traceid".to_string(), "not-hex".to_string());
        metadata.insert("baggage-old".to_string(), "stale".to_string());
        metadata.insert("X-B3-ParentSpanId".to_string(), "0000000000000009".to_string());

        let root = tracer.new_child_span(None, "x", SpanKind::Producer);
        tracer.inject(Some(root.context()), &mut metadata);

        assert!(!metadata.contains_key("x-b3-traceid"));
        assert!(!metadata.contains_key("baggage-old"));
        assert!(!metadata.contains_key("X-B3-ParentSpanId"));
        assert_eq!(&tracer.extract(&metadata).unwrap(), root.context());
    }

    #[test]
    fn test_inject_is_idempotent() {
        let (tracer, _) = create_test_tracer();
        let span = tracer.new_child_span(None, "x", SpanKind::Producer);

        let mut once = Metadata::new();
        tracer.inject(Some(span.context()), &mut once);
        let mut twice = once.clone();
        tracer.inject(Some(span.context()), &mut twice);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_inject_noop_cases() {
        let (tracer, _) = create_test_tracer();
        let mut metadata = Metadata::new();

        tracer.inject(None, &mut metadata);
        assert!(metadata.is_empty());

        let invalid = TraceContext::new(TraceId::invalid(), SpanId::invalid());
        tracer.inject(Some(&invalid), &mut metadata);
        assert!(metadata.is_empty());

        let unsampled = TraceContext::new(TraceId::new(0, 1), SpanId::new(1)).with_sampled(false);
        tracer.inject(Some(&unsampled), &mut metadata);
        assert!(metadata.is_empty());

        let mut baggage = Baggage::new();
        baggage.set("tenant", "acme");
        let with_baggage = unsampled.with_baggage(baggage);
        tracer.inject(Some(&with_baggage), &mut metadata);
        assert_eq!(metadata.get("X-B3-Sampled").map(String::as_str), Some("0"));
        assert_eq!(metadata.get("baggage-tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_unsampled_inject_clears_forwarded_keys() {
        let (tracer, _) = create_test_tracer();
        let mut metadata = Metadata::new();
        metadata.insert("X-B3-TraceId".to_string(), "abc123".to_string());
        metadata.insert("x-b3-spanid".to_string(), "def456".to_string());
        metadata.insert("baggage-tenant".to_string(), "old".to_string());
        metadata.insert("content-type".to_string(), "text/plain".to_string());

        let unsampled = TraceContext::new(TraceId::new(0, 9), SpanId::new(9)).with_sampled(false);
        tracer.inject(Some(&unsampled), &mut metadata);

        assert_eq!(metadata.len(), 1);
        assert!(tracer.extract(&metadata).is_none());

        // Invalid contexts still leave metadata alone
        metadata.insert("X-B3-TraceId".to_string(), "abc123".to_string());
        let invalid = TraceContext::new(TraceId::invalid(), SpanId::invalid());
        tracer.inject(Some(&invalid), &mut metadata);
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_report_sampled_only() {
        let exporter = Arc::new(InMemoryExporter::new());
        let tracer = Tracer::builder("test-service")
            .sampler(Arc::new(AlwaysOffSampler::new()))
            .reporter(exporter.clone())
            .build();

        let span = tracer.new_child_span(None, "x", SpanKind::Producer);
        assert!(!span.is_sampled());
        tracer.report(finish(span));

        assert_eq!(exporter.span_count(), 0);
        let stats = tracer.stats();
        assert_eq!(stats.spans_started, 1);
        assert_eq!(stats.spans_unsampled, 1);
        assert_eq!(stats.spans_reported, 0);
    }

    #[test]
    fn test_tracer_stats() {
        let (tracer, exporter) = create_test_tracer();

        for i in 0..3 {
            let span = tracer.new_child_span(None, format!("span-{i}"), SpanKind::Producer);
            tracer.report(finish(span));
        }

        let stats = tracer.stats();
        assert_eq!(stats.spans_started, 3);
        assert_eq!(stats.spans_reported, 3);
        assert_eq!(exporter.span_count(), 3);
    }

    #[test]
    fn test_from_config() {
        let mut config = TracingConfig::default();
        config.service_name = "checkout".to_string();
        let tracer = Tracer::from_config(&config).unwrap();
        assert_eq!(tracer.service_name(), "checkout");
        assert!(tracer.new_child_span(None, "x", SpanKind::Producer).is_sampled());

        config.enabled = false;
        let tracer = Tracer::from_config(&config).unwrap();
        assert!(!tracer.new_child_span(None, "x", SpanKind::Producer).is_sampled());

        config.sampling.strategy = SamplingStrategy::Ratio;
        config.sampling.ratio = 2.0;
        assert!(Tracer::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_w3c() {
        let config = TracingConfig {
            propagation: PropagationFormat::W3C,
            ..Default::default()
        };
        let tracer = Tracer::from_config(&config).unwrap();
        let span = tracer.new_child_span(None, "x", SpanKind::Producer);

        let mut metadata = Metadata::new();
        tracer.inject(Some(span.context()), &mut metadata);
        assert!(metadata.contains_key("traceparent"));
        assert!(tracer.propagator().is_reserved("TraceParent"));
    }
}
