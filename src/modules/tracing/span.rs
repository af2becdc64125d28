//! Span types and lifecycle

use super::context::TraceContext;
use super::error::{TracingError, TracingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag carrying the failure description of a span closed with an error.
pub const ERROR_TAG: &str = "error";

/// Parse 1 to 16 hex characters. `from_str_radix` alone would accept a sign.
fn parse_hex_u64(hex: &str) -> Option<u64> {
    if hex.is_empty() || hex.len() > 16 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

/// 128-bit trace identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId {
    high: u64,
    low: u64,
}

impl TraceId {
    /// Create a new trace ID from high and low parts
    pub fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    /// Generate a random, non-zero trace ID
    pub fn generate() -> Self {
        loop {
            let id = Self::new(rand::random(), rand::random());
            if id.is_valid() {
                return id;
            }
        }
    }

    /// Create an invalid (zero) trace ID
    pub fn invalid() -> Self {
        Self { high: 0, low: 0 }
    }

    /// Check if this trace ID is valid (non-zero)
    pub fn is_valid(&self) -> bool {
        self.high != 0 || self.low != 0
    }

    /// Get the high 64 bits
    pub fn high(&self) -> u64 {
        self.high
    }

    /// Get the low 64 bits
    pub fn low(&self) -> u64 {
        self.low
    }

    /// Parse from a hex string of 1 to 32 characters.
    ///
    /// Short ids are left-padded with zeros, so a 64-bit B3 trace id and its
    /// 128-bit zero-extended form parse to the same value. An all-zero id is
    /// rejected.
    pub fn from_hex(hex: &str) -> TracingResult<Self> {
        if hex.is_empty() || hex.len() > 32 {
            return Err(TracingError::InvalidTraceId(format!(
                "expected 1 to 32 hex chars, got {}",
                hex.len()
            )));
        }

        // Byte offsets below are only char boundaries for ASCII input
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TracingError::InvalidTraceId(format!("invalid hex: {hex:?}")));
        }

        let split = hex.len().saturating_sub(16);
        let high = if split == 0 {
            Some(0)
        } else {
            parse_hex_u64(&hex[..split])
        };
        let low = parse_hex_u64(&hex[split..]);

        let (Some(high), Some(low)) = (high, low) else {
            return Err(TracingError::InvalidTraceId(format!("invalid hex: {hex}")));
        };

        let id = Self { high, low };
        if !id.is_valid() {
            return Err(TracingError::InvalidTraceId("all-zero trace ID".to_string()));
        }
        Ok(id)
    }

    /// Convert to hex string (32 characters)
    pub fn to_hex(&self) -> String {
        format!("{:016x}{:016x}", self.high, self.low)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.to_hex())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// 64-bit span identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(u64);

impl SpanId {
    /// Create a new span ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Generate a random, non-zero span ID
    pub fn generate() -> Self {
        loop {
            let id = Self(rand::random());
            if id.is_valid() {
                return id;
            }
        }
    }

    /// Create an invalid (zero) span ID
    pub fn invalid() -> Self {
        Self(0)
    }

    /// Check if this span ID is valid (non-zero)
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Parse from a hex string of 1 to 16 characters. Zero is rejected.
    pub fn from_hex(hex: &str) -> TracingResult<Self> {
        let id = parse_hex_u64(hex)
            .ok_or_else(|| TracingError::InvalidSpanId(format!("invalid hex: {hex:?}")))?;

        if id == 0 {
            return Err(TracingError::InvalidSpanId("all-zero span ID".to_string()));
        }
        Ok(Self(id))
    }

    /// Convert to hex string (16 characters)
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self.to_hex())
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Role of a span in a messaging exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    /// Sending side of a message
    Producer,

    /// Receiving side of a message
    Consumer,
}

impl SpanKind {
    /// Upper-case name, as reported to collectors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "PRODUCER",
            Self::Consumer => "CONSUMER",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    /// Unset (default)
    #[default]
    Unset,

    /// Operation completed successfully
    Ok,

    /// Operation failed with an error
    Error,
}

/// Span status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanStatus {
    /// Status code
    pub code: StatusCode,

    /// Failure description, set for errors only
    pub message: Option<String>,
}

impl SpanStatus {
    /// Create an OK status
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    /// Create an error status
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }
}

/// Lifecycle of a span: `Created -> Active -> ClosedOk | ClosedError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanState {
    /// Built but not started
    #[default]
    Created,

    /// Operation in flight
    Active,

    /// Operation completed successfully
    ClosedOk,

    /// Operation failed, was cancelled or panicked
    ClosedError,
}

impl SpanState {
    /// Whether the span has been finalized
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedOk | Self::ClosedError)
    }
}

/// A timed record of one send or one handler invocation.
///
/// Closed spans are immutable: every mutating call on a closed span returns
/// [`TracingError::SpanAlreadyEnded`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    context: TraceContext,
    name: String,
    kind: SpanKind,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    tags: BTreeMap<String, String>,
    status: SpanStatus,
    state: SpanState,
}

impl Span {
    /// Create a span in the `Created` state
    pub fn new(context: TraceContext, name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            context,
            name: name.into(),
            kind,
            start_time: Utc::now(),
            end_time: None,
            tags: BTreeMap::new(),
            status: SpanStatus::default(),
            state: SpanState::Created,
        }
    }

    /// Add a tag while building. No-op once the span is closed.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if !self.state.is_closed() {
            self.tags.insert(key.into(), value.into());
        }
        self
    }

    /// Set a tag on an open span
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> TracingResult<()> {
        self.ensure_open()?;
        self.tags.insert(key.into(), value.into());
        Ok(())
    }

    /// Move to `Active`, restarting the clock
    pub fn start(&mut self) -> TracingResult<()> {
        self.ensure_open()?;
        if self.state == SpanState::Created {
            self.start_time = Utc::now();
            self.state = SpanState::Active;
        }
        Ok(())
    }

    /// Close successfully
    pub fn end_ok(&mut self) -> TracingResult<()> {
        self.close(SpanState::ClosedOk, SpanStatus::ok())
    }

    /// Close with a failure description, also recorded under [`ERROR_TAG`]
    pub fn end_error(&mut self, description: impl Into<String>) -> TracingResult<()> {
        self.ensure_open()?;

        let mut description = description.into();
        if description.trim().is_empty() {
            description = "unknown error".to_string();
        }

        self.tags.insert(ERROR_TAG.to_string(), description.clone());
        self.close(SpanState::ClosedError, SpanStatus::error(description))
    }

    fn close(&mut self, state: SpanState, status: SpanStatus) -> TracingResult<()> {
        self.ensure_open()?;
        self.state = state;
        self.status = status;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    fn ensure_open(&self) -> TracingResult<()> {
        if self.state.is_closed() {
            return Err(TracingError::SpanAlreadyEnded(self.context.span_id.to_hex()));
        }
        Ok(())
    }

    /// Trace context of this span
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// Span name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Span kind
    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    /// Lifecycle state
    pub fn state(&self) -> SpanState {
        self.state
    }

    /// Status
    pub fn status(&self) -> &SpanStatus {
        &self.status
    }

    /// All tags, ordered by key
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Look up a tag
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Start timestamp
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// End timestamp, once closed
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Elapsed time between start and end
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Whether the span has been finalized
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Whether the span will be reported
    pub fn is_sampled(&self) -> bool {
        self.context.is_sampled()
    }
}
