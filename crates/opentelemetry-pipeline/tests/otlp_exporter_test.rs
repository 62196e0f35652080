//! OTLP/HTTP exporter against a local sink.

mod common;

use common::{OtlpSink, spans};
use opentelemetry_pipeline::{
    Compression, ExportError, Exporter, OtlpConfig, OtlpEndpoint, OtlpExporter,
};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use std::collections::HashMap;
use std::time::Duration;

type Traces = ExportTraceServiceRequest;

fn exporter<S: opentelemetry_pipeline::Signal>(config: OtlpConfig) -> OtlpExporter<S> {
    let endpoint = OtlpEndpoint::resolve(&config).expect("endpoint should resolve");
    OtlpExporter::new(endpoint).expect("exporter should build")
}

fn config(sink: &OtlpSink) -> OtlpConfig {
    OtlpConfig {
        url: Some(sink.url()),
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_posts_protobuf_to_traces_path() {
    let sink = OtlpSink::start().await;
    let exporter = exporter::<Traces>(OtlpConfig {
        headers: HashMap::from([("x-api-key".to_string(), "secret".to_string())]),
        ..config(&sink)
    });

    exporter.export(&spans(&["checkout"])).await.unwrap();

    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path, "/v1/traces");
    assert_eq!(
        received[0].header("content-type"),
        Some("application/x-protobuf")
    );
    assert_eq!(received[0].header("x-api-key"), Some("secret"));
    assert_eq!(received[0].header("content-encoding"), None);
    assert_eq!(sink.span_names(), vec!["checkout"]);
}

#[tokio::test]
async fn test_gzip_body_decodes_to_the_same_request() {
    let sink = OtlpSink::start().await;
    let exporter = exporter::<Traces>(OtlpConfig {
        compression: Some(Compression::Gzip),
        ..config(&sink)
    });

    exporter.export(&spans(&["a", "b"])).await.unwrap();

    let received = sink.received_on("/v1/traces");
    assert_eq!(received[0].header("content-encoding"), Some("gzip"));
    assert_eq!(&received[0].body[..2], &[0x1f, 0x8b]);
    assert_eq!(sink.span_names(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_each_signal_uses_its_own_path() {
    let sink = OtlpSink::start().await;

    exporter::<ExportMetricsServiceRequest>(config(&sink))
        .export(&ExportMetricsServiceRequest::default())
        .await
        .unwrap();

    let logs = ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            scope_logs: vec![ScopeLogs {
                log_records: vec![LogRecord {
                    severity_text: "WARN".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    };
    exporter::<ExportLogsServiceRequest>(config(&sink))
        .export(&logs)
        .await
        .unwrap();

    let paths: Vec<String> = sink.received().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/v1/metrics", "/v1/logs"]);

    let decoded: ExportLogsServiceRequest = sink.received_on("/v1/logs")[0].decode();
    assert_eq!(decoded, logs);
}

#[tokio::test]
async fn test_retries_retryable_status() {
    let sink = OtlpSink::start().await;
    sink.respond_with(&[503, 429]);
    let exporter = exporter::<Traces>(config(&sink));

    exporter.export(&spans(&["retried"])).await.unwrap();

    assert_eq!(sink.received().len(), 3);
    assert_eq!(sink.span_names(), vec!["retried"; 3]);
}

#[tokio::test]
async fn test_does_not_retry_client_errors() {
    let sink = OtlpSink::start().await;
    sink.respond_with(&[400]);
    let exporter = exporter::<Traces>(config(&sink));

    let err = exporter.export(&spans(&["rejected"])).await.unwrap_err();

    assert!(matches!(err, ExportError::Status { status: 400, .. }));
    assert_eq!(sink.received().len(), 1);
}

#[tokio::test]
async fn test_gives_up_after_three_attempts() {
    let sink = OtlpSink::start().await;
    sink.respond_with(&[500, 502, 503, 504]);
    let exporter = exporter::<Traces>(config(&sink));

    let err = exporter.export(&spans(&["doomed"])).await.unwrap_err();

    assert!(matches!(err, ExportError::Status { status: 503, .. }));
    assert_eq!(sink.received().len(), 3);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_an_http_error() {
    let sink = OtlpSink::start().await;
    let url = sink.url();
    drop(sink);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let exporter = exporter::<Traces>(OtlpConfig {
        url: Some(url),
        timeout: Some(Duration::from_millis(500)),
        ..Default::default()
    });

    let err = exporter.export(&spans(&["lost"])).await.unwrap_err();
    assert!(matches!(err, ExportError::Http(_)));
}

#[tokio::test]
async fn test_export_after_shutdown_sends_nothing() {
    let sink = OtlpSink::start().await;
    let exporter = exporter::<Traces>(config(&sink));

    exporter.shutdown().await.unwrap();
    exporter.shutdown().await.unwrap();

    assert!(matches!(
        exporter.export(&spans(&["late"])).await,
        Err(ExportError::Shutdown)
    ));
    assert!(sink.received().is_empty());
}
