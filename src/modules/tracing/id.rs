//! Trace and span id generation

use super::span::{SpanId, TraceId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh trace and span ids
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// New non-zero trace id
    fn new_trace_id(&self) -> TraceId;

    /// New non-zero span id
    fn new_span_id(&self) -> SpanId;
}

/// Random 128-bit trace ids and 64-bit span ids
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    /// Create a new random generator
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::generate()
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::generate()
    }
}

/// Deterministic ids from a single counter starting at 1.
///
/// Trace ids use the low 64 bits only. Meant for tests and benchmarks.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Create a generator whose first id is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a generator whose first id is `first` (0 is bumped to 1)
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    fn next(&self) -> u64 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::new(0, self.next())
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::new(self.next())
    }
}
