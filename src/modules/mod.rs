//! # Modules
//!
//! - [`tracing`] - Trace context propagation, span lifecycle and reporting
//! - [`messaging`] - Trace-propagating producer and handler decorators

pub mod messaging;
pub mod tracing;
