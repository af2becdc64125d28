//! Trace context and baggage

use super::span::{SpanId, TraceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trace flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// No flags set
    pub const NONE: Self = Self(0);

    /// Sampled flag
    pub const SAMPLED: Self = Self(0x01);

    /// Debug flag (B3). Always carried together with `SAMPLED`.
    pub const DEBUG: Self = Self(0x02);

    /// Create new trace flags
    pub fn new(flags: u8) -> Self {
        Self(flags)
    }

    /// Check if sampled flag is set
    pub fn is_sampled(&self) -> bool {
        (self.0 & Self::SAMPLED.0) != 0
    }

    /// Check if debug flag is set
    pub fn is_debug(&self) -> bool {
        (self.0 & Self::DEBUG.0) != 0
    }

    /// Set the sampled flag
    pub fn set_sampled(&mut self, sampled: bool) {
        if sampled {
            self.0 |= Self::SAMPLED.0;
        } else {
            self.0 &= !(Self::SAMPLED.0 | Self::DEBUG.0);
        }
    }

    /// Set the debug flag; debug implies sampled
    pub fn set_debug(&mut self, debug: bool) {
        if debug {
            self.0 |= Self::SAMPLED.0 | Self::DEBUG.0;
        } else {
            self.0 &= !Self::DEBUG.0;
        }
    }

    /// Get the raw flags value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// W3C representation (2 hex chars, sampled bit only)
    pub fn to_hex(&self) -> String {
        format!("{:02x}", self.0 & Self::SAMPLED.0)
    }

    /// Parse the W3C representation
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 2 {
            return None;
        }
        u8::from_str_radix(hex, 16)
            .ok()
            .map(|v| Self(v & Self::SAMPLED.0))
    }
}

/// Key/value pairs propagated alongside the trace context and visible to
/// every downstream span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baggage {
    items: BTreeMap<String, String>,
}

impl Baggage {
    /// Maximum items allowed
    pub const MAX_ITEMS: usize = 180;

    /// Create new empty baggage
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    /// Set a value. New keys beyond [`Self::MAX_ITEMS`] are dropped.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key.is_empty() {
            return;
        }
        if self.items.len() < Self::MAX_ITEMS || self.items.contains_key(&key) {
            self.items.insert(key, value.into());
        }
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.items.remove(key)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterate over items in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a W3C `baggage` header value. Keys and values are
    /// percent-decoded; members that fail to decode are skipped.
    pub fn from_header(header: &str) -> Self {
        let mut baggage = Self::new();

        for part in header.split(',') {
            // Properties after ';' are not carried
            let member = part.split(';').next().unwrap_or_default();
            let Some((key, value)) = member.split_once('=') else {
                continue;
            };

            match (urlencoding::decode(key.trim()), urlencoding::decode(value.trim())) {
                (Ok(key), Ok(value)) if !key.is_empty() => baggage.set(key, value),
                _ => {},
            }
        }

        baggage
    }

    /// Render as a W3C `baggage` header value, percent-encoding keys and
    /// values so `,`, `;`, `=` and whitespace survive the trip.
    pub fn to_header(&self) -> String {
        self.items
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Baggage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut baggage = Self::new();
        for (k, v) in iter {
            baggage.set(k, v);
        }
        baggage
    }
}

/// Identifier set linking spans across process boundaries.
///
/// Immutable once created; each hop derives a new context with [`child`].
///
/// [`child`]: TraceContext::child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Trace ID
    pub trace_id: TraceId,

    /// Span ID
    pub span_id: SpanId,

    /// Span ID of the parent, absent for roots
    pub parent_span_id: Option<SpanId>,

    /// Trace flags
    pub flags: TraceFlags,

    /// Propagated baggage
    pub baggage: Baggage,
}

impl TraceContext {
    /// Create a sampled root context
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id: None,
            flags: TraceFlags::SAMPLED,
            baggage: Baggage::new(),
        }
    }

    /// Check if both ids are non-zero
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    /// Check if this span should be reported
    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    /// Check if the debug flag is set
    pub fn is_debug(&self) -> bool {
        self.flags.is_debug()
    }

    /// Set sampled flag
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.flags.set_sampled(sampled);
        self
    }

    /// Set debug flag
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.flags.set_debug(debug);
        self
    }

    /// Set the parent span id
    pub fn with_parent(mut self, parent_span_id: Option<SpanId>) -> Self {
        self.parent_span_id = parent_span_id;
        self
    }

    /// Replace the baggage
    pub fn with_baggage(mut self, baggage: Baggage) -> Self {
        self.baggage = baggage;
        self
    }

    /// Derive the context of a child span: same trace, this span as parent,
    /// flags and baggage inherited.
    pub fn child(&self, span_id: SpanId) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id,
            parent_span_id: Some(self.span_id),
            flags: self.flags,
            baggage: self.baggage.clone(),
        }
    }
}
