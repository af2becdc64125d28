//! # R0N Messaging Trace
//!
//! Transparent trace propagation for messaging clients: decorated producers
//! write the trace context into outgoing message metadata, decorated
//! handlers continue the trace from incoming metadata.
//!
//! ## Features
//!
//! - B3 (multi and single header) and W3C Trace Context propagation
//! - Producer and consumer spans with cancellation and panic handling
//! - Task-local ambient context for automatic parent lookup
//! - Root sampling strategies
//! - Synchronous or channel-backed asynchronous span reporting
//! - TOML configuration with validation
//!
//! ## Modules
//!
//! - [`modules::tracing`] - span model, propagation, sampling and reporting
//! - [`modules::messaging`] - the producer/handler decorator and an
//!   in-process transport
//! - [`config`] - configuration loading

pub mod config;
pub mod modules;
