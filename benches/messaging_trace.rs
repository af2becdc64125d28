#![allow(clippy::all)]
//! Benchmarks for trace propagation and the messaging decorator.
//!
//! Tests: inject/extract per propagation format, child span creation,
//! decorated vs. plain sends, consumer round trip, reporter throughput.

mod common;

use common::generators::{b3_metadata, message_with_headers};
use common::harness::{bench_runtime, BenchSizes};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use r0n_messaging_trace::modules::messaging::{
    handler_fn, producer_fn, Message, MessageHandler, MessageProducer, MessagingConfig,
    MessagingTracing,
};
use r0n_messaging_trace::modules::tracing::{
    create_propagator, BatchConfig, BatchSpanProcessor, ChannelReporter, InMemoryExporter,
    NoopExporter, PropagationFormat, ReportMode, SpanKind, SpanReporter, Tracer,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Propagation formats
// ---------------------------------------------------------------------------

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracing/propagation");

    let formats = [
        ("b3multi", PropagationFormat::B3Multi),
        ("b3single", PropagationFormat::B3Single),
        ("w3c", PropagationFormat::W3C),
        ("composite", PropagationFormat::Composite),
    ];

    for (label, format) in formats {
        let tracer = Tracer::builder("bench")
            .propagator(Arc::from(create_propagator(format)))
            .build();
        let span = tracer.new_child_span(None, "orders send", SpanKind::Producer);

        group.bench_function(BenchmarkId::new("inject", label), |b| {
            b.iter(|| {
                let mut metadata = message_with_headers(8).metadata;
                tracer.inject(Some(span.context()), &mut metadata);
                black_box(metadata);
            });
        });

        let mut metadata = message_with_headers(8).metadata;
        tracer.inject(Some(span.context()), &mut metadata);

        group.bench_function(BenchmarkId::new("extract", label), |b| {
            b.iter(|| black_box(tracer.extract(black_box(&metadata))));
        });
    }

    let tracer = Tracer::builder("bench").build();
    let metadata = b3_metadata();
    group.bench_function("extract/b3multi_with_parent_and_baggage", |b| {
        b.iter(|| black_box(tracer.extract(black_box(&metadata))));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Span creation
// ---------------------------------------------------------------------------

fn bench_span_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracing/span");
    let tracer = Tracer::builder("bench").build();
    let parent = tracer
        .extract(&b3_metadata())
        .expect("benchmark metadata is valid");

    group.bench_function("root", |b| {
        b.iter(|| black_box(tracer.new_child_span(None, "orders send", SpanKind::Producer)));
    });

    group.bench_function("child", |b| {
        b.iter(|| {
            black_box(tracer.new_child_span(Some(&parent), "orders receive", SpanKind::Consumer))
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Decorator overhead
// ---------------------------------------------------------------------------

fn bench_decorator(c: &mut Criterion) {
    let mut group = c.benchmark_group("messaging/decorator");
    let rt = bench_runtime();

    let tracer = Arc::new(
        Tracer::builder("bench")
            .reporter(Arc::new(BatchSpanProcessor::new(
                Arc::new(NoopExporter::new()),
                512,
                2048,
            )))
            .build(),
    );

    let enabled = MessagingTracing::new(Arc::clone(&tracer), MessagingConfig::new("broker"));
    let disabled = MessagingTracing::new(Arc::clone(&tracer), MessagingConfig::disabled());

    let traced = enabled.decorate_producer(producer_fn(|msg: Message| async move {
        Ok::<_, String>(msg.metadata.len())
    }));
    let plain = disabled.decorate_producer(producer_fn(|msg: Message| async move {
        Ok::<_, String>(msg.metadata.len())
    }));

    let traced = &traced;
    let plain = &plain;

    for headers in [0usize, 16] {
        group.bench_with_input(BenchmarkId::new("send_traced", headers), &headers, |b, &n| {
            b.to_async(&rt)
                .iter(|| async move { black_box(traced.send(message_with_headers(n)).await) });
        });

        group.bench_with_input(BenchmarkId::new("send_plain", headers), &headers, |b, &n| {
            b.to_async(&rt)
                .iter(|| async move { black_box(plain.send(message_with_headers(n)).await) });
        });
    }

    let handler = enabled.decorate_consumer(handler_fn(|_msg: Message| async {
        Ok::<_, String>(())
    }));
    let handler = &handler;
    group.bench_function("handle_traced", |b| {
        b.to_async(&rt).iter(|| async move {
            let mut message = message_with_headers(4);
            message.metadata.extend(b3_metadata());
            black_box(handler.handle(message).await)
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

fn bench_reporting(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracing/report");
    let rt = bench_runtime();
    let tracer = Tracer::builder("bench").build();

    let finished = || {
        let mut span = tracer.new_child_span(None, "orders send", SpanKind::Producer);
        let _ = span.start();
        let _ = span.end_ok();
        span
    };

    let batch = BatchSpanProcessor::new(Arc::new(InMemoryExporter::new()), 512, 2048);
    group.bench_function("batch_processor", |b| {
        b.iter(|| batch.report(finished()));
    });

    let config = BatchConfig {
        mode: ReportMode::Async,
        max_batch_size: 512,
        max_queue_size: 65_536,
        scheduled_delay: Duration::from_millis(50),
    };
    let channel = rt.block_on(async {
        ChannelReporter::start(Arc::new(NoopExporter::new()), &config)
            .expect("runtime is running")
    });
    group.bench_function("channel_reporter", |b| {
        b.iter(|| {
            for _ in 0..BenchSizes::SMALL {
                channel.report(finished());
            }
        });
    });
    rt.block_on(channel.shutdown());

    group.finish();
}

criterion_group!(
    benches,
    bench_propagation,
    bench_span_creation,
    bench_decorator,
    bench_reporting,
);
criterion_main!(benches);
