//! Configuration type definitions.

use crate::modules::messaging::MessagingConfig;
use crate::modules::tracing::TracingConfig;
use serde::{Deserialize, Serialize};

/// Root configuration structure: a `[tracing]` and a `[messaging]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MessagingTraceConfig {
    /// Span creation, sampling, propagation and reporting.
    pub tracing: TracingConfig,

    /// Producer/consumer decoration.
    pub messaging: MessagingConfig,
}
