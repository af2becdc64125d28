//! # Configuration System
//!
//! TOML-based configuration for the tracer and the messaging decorator,
//! with pluggable validation.
//!
//! ## Example Configuration
//!
//! ```toml
//! [tracing]
//! service_name = "checkout"
//! propagation = "b3multi"
//!
//! [tracing.sampling]
//! strategy = "ratio"
//! ratio = 0.5
//!
//! [tracing.exporter]
//! exporter_type = "console"
//!
//! [tracing.batch]
//! mode = "async"
//! scheduled_delay = "2s"
//!
//! [messaging]
//! enabled = true
//! remote_service_name = "order-service"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::MessagingTraceConfig;
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
