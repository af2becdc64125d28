//! # Trace propagation
//!
//! Span model, trace context propagation through message metadata and span
//! reporting for the messaging decorator.
//!
//! ## Features
//!
//! - B3 multi-header propagation (default), B3 single header and W3C Trace Context
//! - Baggage carried alongside the trace context
//! - Root sampling strategies (always, never, ratio, rate limited)
//! - Task-local ambient context
//! - Synchronous batching and asynchronous channel-backed reporting

pub mod config;
pub mod context;
pub mod error;
pub mod exporter;
pub mod id;
pub mod propagation;
pub mod sampler;
pub mod scope;
pub mod span;
pub mod tracer;

pub use config::*;
pub use context::*;
pub use error::*;
pub use exporter::*;
pub use id::*;
pub use propagation::*;
pub use sampler::*;
pub use span::*;
pub use tracer::*;
