//! Trace context propagation through message metadata

use super::config::PropagationFormat;
use super::context::{Baggage, TraceContext, TraceFlags};
use super::error::{TracingError, TracingResult};
use super::span::{SpanId, TraceId};
use std::collections::HashMap;
use tracing::debug;

/// Message metadata: the only channel trace context travels through.
pub type Metadata = HashMap<String, String>;

/// Prefix of per-key baggage entries
pub const BAGGAGE_PREFIX: &str = "baggage-";

/// Trait for extracting trace context from carriers
pub trait Extractor {
    /// Get a value by key
    fn get(&self, key: &str) -> Option<&str>;

    /// Get all keys
    fn keys(&self) -> Vec<&str>;
}

/// Trait for injecting trace context into carriers
pub trait Injector {
    /// Set a value
    fn set(&mut self, key: &str, value: String);
}

impl Extractor for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(|s| s.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        HashMap::keys(self).map(|s| s.as_str()).collect()
    }
}

impl Injector for HashMap<String, String> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

/// Exact lookup first, then an ASCII case-insensitive scan.
fn get_ignore_case<'a>(carrier: &'a dyn Extractor, key: &str) -> Option<&'a str> {
    carrier.get(key).or_else(|| {
        carrier
            .keys()
            .into_iter()
            .find(|k| k.eq_ignore_ascii_case(key))
            .and_then(|k| carrier.get(k))
    })
}

/// Whether `key` is a `baggage-<name>` entry
pub fn is_baggage_key(key: &str) -> bool {
    key.len() > BAGGAGE_PREFIX.len()
        && key
            .get(..BAGGAGE_PREFIX.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(BAGGAGE_PREFIX))
}

fn extract_prefixed_baggage(carrier: &dyn Extractor) -> Baggage {
    let mut baggage = Baggage::new();
    for key in carrier.keys() {
        if !is_baggage_key(key) {
            continue;
        }
        if let (Some(name), Some(value)) = (key.get(BAGGAGE_PREFIX.len()..), carrier.get(key)) {
            baggage.set(name, value);
        }
    }
    baggage
}

fn inject_prefixed_baggage(baggage: &Baggage, carrier: &mut dyn Injector) {
    for (key, value) in baggage.iter() {
        carrier.set(&format!("{BAGGAGE_PREFIX}{key}"), value.to_string());
    }
}

/// Parse a trace id, logging and discarding malformed values
fn parse_trace_id(raw: &str) -> Option<TraceId> {
    TraceId::from_hex(raw)
        .map_err(|e| debug!(error = %e, "ignoring malformed trace id"))
        .ok()
}

fn parse_span_id(raw: &str) -> Option<SpanId> {
    SpanId::from_hex(raw)
        .map_err(|e| debug!(error = %e, "ignoring malformed span id"))
        .ok()
}

/// Trait for context propagators
pub trait Propagator: Send + Sync {
    /// Extract trace context from carrier. Absent or malformed context yields
    /// `None`, never an error.
    fn extract(&self, carrier: &dyn Extractor) -> Option<TraceContext>;

    /// Inject trace context into carrier
    fn inject(&self, context: &TraceContext, carrier: &mut dyn Injector);

    /// Get the propagation fields
    fn fields(&self) -> Vec<&'static str>;

    /// Whether `key` belongs to this propagator's namespace
    fn is_reserved(&self, key: &str) -> bool {
        self.fields().iter().any(|f| f.eq_ignore_ascii_case(key))
    }
}

/// B3 Multi-Header propagator, spelled the way Brave's messaging
/// instrumentation writes it. Baggage travels as `baggage-<key>` entries.
#[derive(Debug, Default)]
pub struct B3MultiPropagator;

impl B3MultiPropagator {
    /// Header name for trace ID
    pub const TRACE_ID: &'static str = "X-B3-TraceId";
    /// Header name for span ID
    pub const SPAN_ID: &'static str = "X-B3-SpanId";
    /// Header name for parent span ID
    pub const PARENT_SPAN_ID: &'static str = "X-B3-ParentSpanId";
    /// Header name for sampled flag
    pub const SAMPLED: &'static str = "X-B3-Sampled";
    /// Header name for debug flags
    pub const FLAGS: &'static str = "X-B3-Flags";

    /// Create a new propagator
    pub fn new() -> Self {
        Self
    }
}

impl Propagator for B3MultiPropagator {
    fn extract(&self, carrier: &dyn Extractor) -> Option<TraceContext> {
        let raw_trace_id = get_ignore_case(carrier, Self::TRACE_ID)?;
        let Some(raw_span_id) = get_ignore_case(carrier, Self::SPAN_ID) else {
            debug!(trace_id = %raw_trace_id, "B3 trace id without span id, ignoring context");
            return None;
        };

        let trace_id = parse_trace_id(raw_trace_id)?;
        let span_id = parse_span_id(raw_span_id)?;
        let parent_span_id = get_ignore_case(carrier, Self::PARENT_SPAN_ID).and_then(parse_span_id);

        let debug = get_ignore_case(carrier, Self::FLAGS) == Some("1");
        let sampled = match get_ignore_case(carrier, Self::SAMPLED) {
            Some("0") | Some("false") => false,
            Some("1") | Some("true") | None => true,
            Some(other) => {
                debug!(sampled = %other, "unrecognized B3 sampled value, assuming sampled");
                true
            },
        };

        Some(
            TraceContext::new(trace_id, span_id)
                .with_parent(parent_span_id)
                .with_sampled(sampled)
                .with_debug(debug)
                .with_baggage(extract_prefixed_baggage(carrier)),
        )
    }

    fn inject(&self, context: &TraceContext, carrier: &mut dyn Injector) {
        if !context.is_valid() {
            return;
        }

        carrier.set(Self::TRACE_ID, context.trace_id.to_hex());
        carrier.set(Self::SPAN_ID, context.span_id.to_hex());
        if let Some(parent) = context.parent_span_id {
            carrier.set(Self::PARENT_SPAN_ID, parent.to_hex());
        }

        // Debug implies sampled; B3 omits the sampled header in that case
        if context.is_debug() {
            carrier.set(Self::FLAGS, "1".to_string());
        } else {
            carrier.set(
                Self::SAMPLED,
                if context.is_sampled() { "1" } else { "0" }.to_string(),
            );
        }

        inject_prefixed_baggage(&context.baggage, carrier);
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![
            Self::TRACE_ID,
            Self::SPAN_ID,
            Self::PARENT_SPAN_ID,
            Self::SAMPLED,
            Self::FLAGS,
        ]
    }

    fn is_reserved(&self, key: &str) -> bool {
        is_baggage_key(key) || self.fields().iter().any(|f| f.eq_ignore_ascii_case(key))
    }
}

/// B3 Single Header propagator
#[derive(Debug, Default)]
pub struct B3SinglePropagator;

/// Fields of a parsed `b3` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct B3Header {
    /// Trace ID
    pub trace_id: TraceId,
    /// Span ID
    pub span_id: SpanId,
    /// Sampling state
    pub flags: TraceFlags,
    /// Parent span ID
    pub parent_span_id: Option<SpanId>,
}

impl B3SinglePropagator {
    /// Header name
    pub const B3: &'static str = "b3";

    /// Create a new propagator
    pub fn new() -> Self {
        Self
    }

    /// Parse B3 single header
    /// Format: {trace-id}-{span-id}-{sampling}-{parent-span-id}
    /// Or just: {trace-id}-{span-id}
    /// Or just: 0 (not sampled) or d (debug), which carry no ids
    pub fn parse_b3(header: &str) -> TracingResult<B3Header> {
        if matches!(header, "0" | "1" | "d") {
            return Err(TracingError::Propagation(
                "sampling flag without ids".to_string(),
            ));
        }

        let parts: Vec<&str> = header.split('-').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(TracingError::Propagation(format!(
                "b3 header must have 2 to 4 parts, got {}",
                parts.len()
            )));
        }

        let trace_id = TraceId::from_hex(parts[0])?;
        let span_id = SpanId::from_hex(parts[1])?;

        let mut flags = TraceFlags::SAMPLED;
        match parts.get(2).copied() {
            None | Some("1") => {},
            Some("0") => flags.set_sampled(false),
            Some("d") => flags.set_debug(true),
            Some(other) => {
                return Err(TracingError::Propagation(format!(
                    "invalid b3 sampling state: {other}"
                )))
            },
        }

        let parent_span_id = parts.get(3).map(|p| SpanId::from_hex(p)).transpose()?;

        Ok(B3Header {
            trace_id,
            span_id,
            flags,
            parent_span_id,
        })
    }

    /// Format B3 single header
    pub fn format_b3(context: &TraceContext) -> String {
        let sampling = if context.is_debug() {
            "d"
        } else if context.is_sampled() {
            "1"
        } else {
            "0"
        };

        match context.parent_span_id {
            Some(parent) => format!(
                "{}-{}-{}-{}",
                context.trace_id.to_hex(),
                context.span_id.to_hex(),
                sampling,
                parent.to_hex()
            ),
            None => format!(
                "{}-{}-{}",
                context.trace_id.to_hex(),
                context.span_id.to_hex(),
                sampling
            ),
        }
    }
}

impl Propagator for B3SinglePropagator {
    fn extract(&self, carrier: &dyn Extractor) -> Option<TraceContext> {
        let b3 = get_ignore_case(carrier, Self::B3)?;

        let header = Self::parse_b3(b3)
            .map_err(|e| debug!(error = %e, "ignoring malformed b3 header"))
            .ok()?;

        let mut context = TraceContext::new(header.trace_id, header.span_id)
            .with_parent(header.parent_span_id)
            .with_baggage(extract_prefixed_baggage(carrier));
        context.flags = header.flags;
        Some(context)
    }

    fn inject(&self, context: &TraceContext, carrier: &mut dyn Injector) {
        if !context.is_valid() {
            return;
        }

        carrier.set(Self::B3, Self::format_b3(context));
        inject_prefixed_baggage(&context.baggage, carrier);
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![Self::B3]
    }

    fn is_reserved(&self, key: &str) -> bool {
        is_baggage_key(key) || key.eq_ignore_ascii_case(Self::B3)
    }
}

/// W3C Trace Context propagator, with baggage in the W3C `baggage` header.
///
/// `traceparent` has no parent span id, so it is not carried.
#[derive(Debug, Default)]
pub struct W3CTraceContextPropagator;

impl W3CTraceContextPropagator {
    /// Header name for traceparent
    pub const TRACEPARENT: &'static str = "traceparent";

    /// Header name for baggage
    pub const BAGGAGE: &'static str = "baggage";

    /// Create a new propagator
    pub fn new() -> Self {
        Self
    }

    /// Parse traceparent header
    /// Format: {version}-{trace-id}-{span-id}-{trace-flags}
    /// Example: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01
    pub fn parse_traceparent(header: &str) -> TracingResult<(TraceId, SpanId, TraceFlags)> {
        let parts: Vec<&str> = header.trim().split('-').collect();
        if parts.len() != 4 {
            return Err(TracingError::Propagation(
                "traceparent must have 4 parts".to_string(),
            ));
        }

        if parts[0] != "00" {
            return Err(TracingError::Propagation(format!(
                "unsupported traceparent version: {}",
                parts[0]
            )));
        }

        if parts[1].len() != 32 || parts[2].len() != 16 {
            return Err(TracingError::Propagation(
                "traceparent ids must be 32 and 16 hex chars".to_string(),
            ));
        }

        let trace_id = TraceId::from_hex(parts[1])?;
        let span_id = SpanId::from_hex(parts[2])?;
        let flags = TraceFlags::from_hex(parts[3])
            .ok_or_else(|| TracingError::Propagation("invalid trace flags".to_string()))?;

        Ok((trace_id, span_id, flags))
    }

    /// Format traceparent header
    pub fn format_traceparent(trace_id: &TraceId, span_id: &SpanId, flags: &TraceFlags) -> String {
        format!(
            "00-{}-{}-{}",
            trace_id.to_hex(),
            span_id.to_hex(),
            flags.to_hex()
        )
    }
}

impl Propagator for W3CTraceContextPropagator {
    fn extract(&self, carrier: &dyn Extractor) -> Option<TraceContext> {
        let traceparent = get_ignore_case(carrier, Self::TRACEPARENT)?;

        let (trace_id, span_id, flags) = Self::parse_traceparent(traceparent)
            .map_err(|e| debug!(error = %e, "ignoring malformed traceparent"))
            .ok()?;

        let baggage = get_ignore_case(carrier, Self::BAGGAGE)
            .map(Baggage::from_header)
            .unwrap_or_default();

        Some(
            TraceContext::new(trace_id, span_id)
                .with_sampled(flags.is_sampled())
                .with_baggage(baggage),
        )
    }

    fn inject(&self, context: &TraceContext, carrier: &mut dyn Injector) {
        if !context.is_valid() {
            return;
        }

        let traceparent =
            Self::format_traceparent(&context.trace_id, &context.span_id, &context.flags);
        carrier.set(Self::TRACEPARENT, traceparent);

        if !context.baggage.is_empty() {
            carrier.set(Self::BAGGAGE, context.baggage.to_header());
        }
    }

    fn fields(&self) -> Vec<&'static str> {
        vec![Self::TRACEPARENT, Self::BAGGAGE]
    }
}

/// Composite propagator: extracts with the first format that yields a
/// context, injects with all of them.
#[derive(Default)]
pub struct CompositePropagator {
    propagators: Vec<Box<dyn Propagator>>,
}

impl CompositePropagator {
    /// Create a new composite propagator
    pub fn new() -> Self {
        Self {
            propagators: Vec::new(),
        }
    }

    /// Create with default propagators (B3 multi, B3 single, W3C)
    pub fn default_propagators() -> Self {
        let mut composite = Self::new();
        composite.add(Box::new(B3MultiPropagator::new()));
        composite.add(Box::new(B3SinglePropagator::new()));
        composite.add(Box::new(W3CTraceContextPropagator::new()));
        composite
    }

    /// Add a propagator
    pub fn add(&mut self, propagator: Box<dyn Propagator>) {
        self.propagators.push(propagator);
    }
}

impl Propagator for CompositePropagator {
    fn extract(&self, carrier: &dyn Extractor) -> Option<TraceContext> {
        self.propagators.iter().find_map(|p| p.extract(carrier))
    }

    fn inject(&self, context: &TraceContext, carrier: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject(context, carrier);
        }
    }

    fn fields(&self) -> Vec<&'static str> {
        self.propagators.iter().flat_map(|p| p.fields()).collect()
    }

    fn is_reserved(&self, key: &str) -> bool {
        self.propagators.iter().any(|p| p.is_reserved(key))
    }
}

impl std::fmt::Debug for CompositePropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositePropagator")
            .field("fields", &self.fields())
            .finish()
    }
}

/// Create a propagator from configuration
pub fn create_propagator(format: PropagationFormat) -> Box<dyn Propagator> {
    match format {
        PropagationFormat::B3Multi => Box::new(B3MultiPropagator::new()),
        PropagationFormat::B3Single => Box::new(B3SinglePropagator::new()),
        PropagationFormat::W3C => Box::new(W3CTraceContextPropagator::new()),
        PropagationFormat::Composite => Box::new(CompositePropagator::default_propagators()),
    }
}
