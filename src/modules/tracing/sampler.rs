//! Root sampling strategies
//!
//! Samplers only decide for new traces. A span with a parent inherits the
//! parent's flags and never consults a sampler.

use super::config::{SamplingConfig, SamplingStrategy};
use super::span::{SpanKind, TraceId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Sampling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingDecision {
    /// Do not report
    Drop,

    /// Record and report
    RecordAndSample,
}

impl SamplingDecision {
    /// Check if this decision means we should report
    pub fn is_sampled(&self) -> bool {
        matches!(self, Self::RecordAndSample)
    }
}

/// Inputs to a root sampling decision
#[derive(Debug, Clone)]
pub struct SamplingParameters<'a> {
    /// Trace ID of the new trace
    pub trace_id: TraceId,

    /// Span name
    pub name: &'a str,

    /// Span kind
    pub kind: SpanKind,
}

/// Trait for samplers
pub trait Sampler: Send + Sync {
    /// Make a sampling decision
    fn should_sample(&self, params: &SamplingParameters<'_>) -> SamplingDecision;

    /// Get a description of this sampler
    fn description(&self) -> &str;
}

/// Always-on sampler (sample everything)
#[derive(Debug, Default)]
pub struct AlwaysOnSampler;

impl AlwaysOnSampler {
    /// Create a new always-on sampler
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for AlwaysOnSampler {
    fn should_sample(&self, _params: &SamplingParameters<'_>) -> SamplingDecision {
        SamplingDecision::RecordAndSample
    }

    fn description(&self) -> &str {
        "AlwaysOnSampler"
    }
}

/// Always-off sampler (sample nothing)
#[derive(Debug, Default)]
pub struct AlwaysOffSampler;

impl AlwaysOffSampler {
    /// Create a new always-off sampler
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for AlwaysOffSampler {
    fn should_sample(&self, _params: &SamplingParameters<'_>) -> SamplingDecision {
        SamplingDecision::Drop
    }

    fn description(&self) -> &str {
        "AlwaysOffSampler"
    }
}

/// Ratio-based sampler, deterministic per trace id
#[derive(Debug)]
pub struct TraceIdRatioSampler {
    ratio: f64,

    /// ratio * u64::MAX
    upper_bound: u64,

    description: String,
}

impl TraceIdRatioSampler {
    /// Create a new ratio sampler; the ratio is clamped to `0.0..=1.0`
    pub fn new(ratio: f64) -> Self {
        let ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        let upper_bound = (ratio * u64::MAX as f64) as u64;

        Self {
            ratio,
            upper_bound,
            description: format!("TraceIdRatioSampler{{ratio={}}}", ratio),
        }
    }

    /// Get the ratio
    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

impl Sampler for TraceIdRatioSampler {
    fn should_sample(&self, params: &SamplingParameters<'_>) -> SamplingDecision {
        if self.ratio <= 0.0 {
            return SamplingDecision::Drop;
        }
        if params.trace_id.low() <= self.upper_bound {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Token bucket refilled once per second
pub struct RateLimitingSampler {
    max_per_second: u32,
    tokens: AtomicU64,
    last_refill: Mutex<Instant>,
    description: String,
}

impl RateLimitingSampler {
    /// Create a new rate-limiting sampler
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            tokens: AtomicU64::new(max_per_second as u64),
            last_refill: Mutex::new(Instant::now()),
            description: format!("RateLimitingSampler{{rate={}/s}}", max_per_second),
        }
    }

    fn refill(&self) {
        let mut last = self
            .last_refill
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if last.elapsed() >= Duration::from_secs(1) {
            self.tokens
                .store(self.max_per_second as u64, Ordering::Relaxed);
            *last = Instant::now();
        }
    }
}

impl Sampler for RateLimitingSampler {
    fn should_sample(&self, _params: &SamplingParameters<'_>) -> SamplingDecision {
        self.refill();

        let taken = self
            .tokens
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(1)
            });

        if taken.is_ok() {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for RateLimitingSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitingSampler")
            .field("max_per_second", &self.max_per_second)
            .finish()
    }
}

/// Create a sampler from configuration
pub fn create_sampler(config: &SamplingConfig) -> Box<dyn Sampler> {
    match config.strategy {
        SamplingStrategy::AlwaysOn => Box::new(AlwaysOnSampler::new()),
        SamplingStrategy::AlwaysOff => Box::new(AlwaysOffSampler::new()),
        SamplingStrategy::Ratio => Box::new(TraceIdRatioSampler::new(config.ratio)),
        SamplingStrategy::RateLimited => {
            Box::new(RateLimitingSampler::new(config.rate_limit.unwrap_or(100)))
        },
    }
}
