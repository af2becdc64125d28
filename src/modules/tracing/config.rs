//! Tracing configuration

use super::error::{TracingError, TracingResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tracing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Whether spans are sampled at all. When false every root is unsampled
    /// and nothing is reported; contexts still propagate.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Local service name reported on every span
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Sampling configuration
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Propagation format
    #[serde(default)]
    pub propagation: PropagationFormat,

    /// Exporter configuration
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Batch reporting configuration
    #[serde(default)]
    pub batch: BatchConfig,
}

fn default_enabled() -> bool {
    true
}

fn default_service_name() -> String {
    "r0n-messaging".to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            service_name: default_service_name(),
            sampling: SamplingConfig::default(),
            propagation: PropagationFormat::default(),
            exporter: ExporterConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl TracingConfig {
    /// Check value ranges
    pub fn validate(&self) -> TracingResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(TracingError::Config(
                "service_name cannot be empty".to_string(),
            ));
        }

        let ratio = self.sampling.ratio;
        if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
            return Err(TracingError::Config(format!(
                "sampling.ratio must be between 0.0 and 1.0, got {ratio}"
            )));
        }

        if self.sampling.strategy == SamplingStrategy::RateLimited
            && self.sampling.rate_limit == Some(0)
        {
            return Err(TracingError::Config(
                "sampling.rate_limit must be greater than 0".to_string(),
            ));
        }

        if self.batch.max_batch_size == 0 {
            return Err(TracingError::Config(
                "batch.max_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.batch.max_queue_size < self.batch.max_batch_size {
            return Err(TracingError::Config(format!(
                "batch.max_queue_size ({}) must be at least batch.max_batch_size ({})",
                self.batch.max_queue_size, self.batch.max_batch_size
            )));
        }

        if self.batch.mode == ReportMode::Async && self.batch.scheduled_delay.is_zero() {
            return Err(TracingError::Config(
                "batch.scheduled_delay must be greater than 0 for async reporting".to_string(),
            ));
        }

        Ok(())
    }
}

/// Sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sampling strategy for new traces
    #[serde(default)]
    pub strategy: SamplingStrategy,

    /// Sample ratio (0.0 to 1.0) for ratio-based sampling
    #[serde(default = "default_sample_ratio")]
    pub ratio: f64,

    /// Rate limit (traces per second) for rate limiting
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

fn default_sample_ratio() -> f64 {
    1.0
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::default(),
            ratio: default_sample_ratio(),
            rate_limit: None,
        }
    }
}

/// Sampling strategy applied to root spans. Child spans always follow the
/// decision carried by their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Always sample
    #[default]
    AlwaysOn,

    /// Never sample
    AlwaysOff,

    /// Sample based on ratio
    Ratio,

    /// Rate-limited sampling
    RateLimited,
}

impl SamplingStrategy {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "always_on" | "alwayson" | "always" => Some(Self::AlwaysOn),
            "always_off" | "alwaysoff" | "never" => Some(Self::AlwaysOff),
            "ratio" | "probability" => Some(Self::Ratio),
            "rate_limited" | "ratelimited" | "rate" => Some(Self::RateLimited),
            _ => None,
        }
    }
}

/// Propagation format written to and read from message metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationFormat {
    /// B3 multi-header format (`X-B3-TraceId`, ...)
    #[default]
    B3Multi,

    /// B3 single header format (`b3`)
    B3Single,

    /// W3C Trace Context (`traceparent`, `baggage`)
    W3C,

    /// Extract from whichever format is present, inject all of them
    Composite,
}

/// Exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Exporter type
    #[serde(default)]
    pub exporter_type: ExporterType,

    /// Pretty-print console output
    #[serde(default)]
    pub pretty: bool,
}

/// Exporter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterType {
    /// Discard spans
    #[default]
    None,

    /// Zipkin v2 JSON lines on stdout
    Console,

    /// In-memory store
    Memory,
}

/// How finished spans reach the exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// Batch in the calling thread, export when a batch fills up
    #[default]
    Sync,

    /// Queue on a bounded channel drained by a background task
    Async,
}

/// Batch reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Reporting mode
    #[serde(default)]
    pub mode: ReportMode,

    /// Maximum batch size
    #[serde(default = "default_batch_size")]
    pub max_batch_size: usize,

    /// Maximum queue size
    #[serde(default = "default_queue_size")]
    pub max_queue_size: usize,

    /// Delay between scheduled exports (async mode)
    #[serde(default = "default_scheduled_delay", with = "humantime_serde")]
    pub scheduled_delay: Duration,
}

fn default_batch_size() -> usize {
    512
}

fn default_queue_size() -> usize {
    2048
}

fn default_scheduled_delay() -> Duration {
    Duration::from_secs(5)
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: ReportMode::default(),
            max_batch_size: default_batch_size(),
            max_queue_size: default_queue_size(),
            scheduled_delay: default_scheduled_delay(),
        }
    }
}
