//! # Messaging Decorator
//!
//! Wraps a producer and a handler so every send and every delivery carries
//! trace context through message metadata, without the caller noticing.
//!
//! ```no_run
//! use r0n_messaging_trace::modules::messaging::{
//!     producer_fn, Message, MessageProducer, MessagingConfig, MessagingTracing,
//! };
//! use r0n_messaging_trace::modules::tracing::Tracer;
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let tracing = MessagingTracing::new(
//!     Arc::new(Tracer::builder("checkout").build()),
//!     MessagingConfig::new("order-service"),
//! );
//! let producer = tracing.decorate_producer(producer_fn(|msg: Message| async move {
//!     Ok::<_, String>(msg.metadata.len())
//! }));
//! let headers = producer.send(Message::new("order #1")).await;
//! # }
//! ```

pub mod client;
pub mod config;
pub mod decorator;
pub mod error;
pub mod message;
pub mod transport;

pub use client::*;
pub use config::*;
pub use decorator::*;
pub use error::*;
pub use message::*;
pub use transport::*;
