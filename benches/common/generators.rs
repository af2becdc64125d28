//! Test data generators for benchmarks.

use bytes::Bytes;
use rand::Rng;
use r0n_messaging_trace::modules::messaging::Message;
use std::collections::HashMap;

/// Generate unrelated application headers, as a busy producer would attach.
pub fn random_headers(count: usize) -> HashMap<String, String> {
    let header_names = [
        "content-type",
        "correlation-id",
        "reply-to",
        "user-agent",
        "x-tenant",
        "x-request-id",
    ];
    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            let name = header_names[i % header_names.len()];
            (format!("{name}-{i}"), format!("value-{}", rng.random_range(0u32..1000)))
        })
        .collect()
}

/// Generate random payload bytes.
pub fn random_payload(size: usize) -> Bytes {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random::<u8>()).collect::<Vec<u8>>().into()
}

/// Generate a message with `header_count` unrelated headers.
pub fn message_with_headers(header_count: usize) -> Message {
    let mut message = Message::new(random_payload(256)).with_destination("orders");
    message.metadata = random_headers(header_count);
    message
}

/// Generate valid B3 multi-header metadata.
pub fn b3_metadata() -> HashMap<String, String> {
    HashMap::from([
        ("X-B3-TraceId".to_string(), "463ac35c9f6413ad48485a3953bb6124".to_string()),
        ("X-B3-SpanId".to_string(), "a2fb4a1d1a96d312".to_string()),
        ("X-B3-ParentSpanId".to_string(), "0020000000000001".to_string()),
        ("X-B3-Sampled".to_string(), "1".to_string()),
        ("baggage-tenant".to_string(), "acme".to_string()),
    ])
}
