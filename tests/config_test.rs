//! Loading configuration files and building the decorator from them.

use r0n_messaging_trace::config::{BasicValidator, ConfigError, ConfigLoader, MessagingTraceConfig};
use r0n_messaging_trace::modules::messaging::{
    producer_fn, Message, MessageProducer, MessagingError, MessagingTracing,
};
use r0n_messaging_trace::modules::tracing::{
    ExporterType, PropagationFormat, ReportMode, SamplingStrategy,
};
use std::time::Duration;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[tracing]
service_name = "checkout"
propagation = "w3c"

[tracing.sampling]
strategy = "ratio"
ratio = 0.25

[tracing.exporter]
exporter_type = "memory"

[tracing.batch]
mode = "async"
max_batch_size = 64
max_queue_size = 1024
scheduled_delay = "250ms"

[messaging]
remote_service_name = "order-service"
"#;

#[test]
fn test_load_full_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("messaging-trace.toml");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load(&path)
        .unwrap();

    assert_eq!(config.tracing.service_name, "checkout");
    assert_eq!(config.tracing.propagation, PropagationFormat::W3C);
    assert_eq!(config.tracing.sampling.strategy, SamplingStrategy::Ratio);
    assert_eq!(config.tracing.sampling.ratio, 0.25);
    assert_eq!(config.tracing.exporter.exporter_type, ExporterType::Memory);
    assert_eq!(config.tracing.batch.mode, ReportMode::Async);
    assert_eq!(config.tracing.batch.scheduled_delay, Duration::from_millis(250));
    assert!(config.messaging.enabled);
    assert_eq!(config.messaging.remote_service_name, "order-service");
}

#[test]
fn test_missing_sections_use_defaults() {
    let config = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load_str("[messaging]\nenabled = false\n")
        .unwrap();

    assert!(!config.messaging.enabled);
    assert_eq!(config.messaging.remote_service_name, "broker");
    assert!(config.tracing.enabled);
    assert_eq!(config.tracing.propagation, PropagationFormat::B3Multi);
}

#[test]
fn test_rejects_out_of_range_ratio() {
    let err = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load_str("[tracing.sampling]\nstrategy = \"ratio\"\nratio = 1.5\n")
        .unwrap_err();

    match err {
        ConfigError::ValidationError(message) => assert!(message.contains("ratio")),
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn test_rejects_blank_remote_service_name() {
    let err = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load_str("[messaging]\nremote_service_name = \"  \"\n")
        .unwrap_err();

    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = ConfigLoader::new().load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));

    let config = ConfigLoader::new().load_or_default(&path).unwrap();
    assert_eq!(config.messaging.remote_service_name, "broker");
}

#[test]
fn test_save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("saved.toml");

    let loader = ConfigLoader::new();
    let original = loader.load_str(FULL_CONFIG).unwrap();
    loader.save(&original, &path).unwrap();

    let reloaded = loader.load(&path).unwrap();
    assert_eq!(reloaded.tracing.service_name, original.tracing.service_name);
    assert_eq!(
        reloaded.tracing.batch.scheduled_delay,
        original.tracing.batch.scheduled_delay
    );
    assert_eq!(
        reloaded.messaging.remote_service_name,
        original.messaging.remote_service_name
    );
}

#[tokio::test]
async fn test_decorator_from_loaded_config() {
    let config = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .load_str("[tracing]\nservice_name = \"checkout\"\n\n[messaging]\nremote_service_name = \"order-service\"\n")
        .unwrap();

    let tracing = MessagingTracing::from_config(&config.tracing, config.messaging.clone()).unwrap();
    assert_eq!(tracing.tracer().service_name(), "checkout");
    assert_eq!(tracing.config().remote_service_name, "order-service");

    let producer = tracing.decorate_producer(producer_fn(|msg: Message| async move {
        Ok::<_, String>(msg.header("X-B3-TraceId").map(str::to_string))
    }));
    assert!(producer.send(Message::new("x")).await.unwrap().is_some());
    assert_eq!(tracing.tracer().stats().spans_reported, 1);
}

#[test]
fn test_decorator_from_invalid_config() {
    let mut config = MessagingTraceConfig::default();
    config.messaging.remote_service_name = String::new();

    let err = MessagingTracing::from_config(&config.tracing, config.messaging).unwrap_err();
    assert!(matches!(err, MessagingError::Config(_)));

    let mut config = MessagingTraceConfig::default();
    config.tracing.batch.max_batch_size = 0;

    let err = MessagingTracing::from_config(&config.tracing, config.messaging).unwrap_err();
    assert!(matches!(err, MessagingError::Tracing(_)));
}
