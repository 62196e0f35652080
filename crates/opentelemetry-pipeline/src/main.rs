//! Pipeline smoke-test binary.
//!
//! Assembles the trace, metric and log pipelines from configuration, emits one
//! sample batch of each kind, then flushes and shuts everything down.
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of priority):
//! 1. Default values
//! 2. Config file: the first argument, or `otel-pipeline.toml`
//! 3. Standard `OTEL_*` environment variables
//! 4. Environment variables with `OTEL_PIPELINE_` prefix
//!
//! With nothing configured, every signal goes to the console.

use anyhow::{Context, Result};
use opentelemetry_pipeline::{PipelineConfig, Telemetry, init_tracing};
use opentelemetry_proto::tonic::collector::{
    logs::v1::ExportLogsServiceRequest, metrics::v1::ExportMetricsServiceRequest,
    trace::v1::ExportTraceServiceRequest,
};
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, any_value};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs, SeverityNumber};
use opentelemetry_proto::tonic::metrics::v1::{
    AggregationTemporality, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum, metric,
    number_data_point,
};
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use std::time::{SystemTime, UNIX_EPOCH};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info,opentelemetry_pipeline=debug")
        .context("failed to initialise tracing subscriber")?;

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load_from_path(&path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => PipelineConfig::load().context("failed to load configuration")?,
    };
    tracing::debug!(?config, "Configuration loaded");

    let telemetry = Telemetry::from_config(&config)
        .await
        .context("failed to assemble telemetry pipelines")?;

    let now = unix_nanos();

    if let Err(e) = telemetry.tracer_provider().emit(sample_trace(now)).await {
        tracing::warn!(error = %e, "Sample span export failed");
    }
    if let Err(e) = telemetry.meter_provider().emit(sample_metric(now)).await {
        tracing::warn!(error = %e, "Sample metric export failed");
    }
    if let Err(e) = telemetry.logger_provider().emit(sample_log(now)).await {
        tracing::warn!(error = %e, "Sample log export failed");
    }

    telemetry.flush().await;
    let report = telemetry.shutdown().await;
    tracing::info!(
        closed = report.closed,
        failed = report.failed,
        "Telemetry shut down"
    );

    Ok(())
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

fn scope() -> Option<InstrumentationScope> {
    Some(InstrumentationScope {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ..Default::default()
    })
}

fn sample_trace(now: u64) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                scope: scope(),
                spans: vec![Span {
                    trace_id: now.to_be_bytes().repeat(2),
                    span_id: now.to_le_bytes().to_vec(),
                    name: "smoke-test".to_string(),
                    start_time_unix_nano: now,
                    end_time_unix_nano: now + 1_000_000,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn sample_metric(now: u64) -> ExportMetricsServiceRequest {
    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            scope_metrics: vec![ScopeMetrics {
                scope: scope(),
                metrics: vec![Metric {
                    name: "smoke_test.runs".to_string(),
                    unit: "1".to_string(),
                    data: Some(metric::Data::Sum(Sum {
                        data_points: vec![NumberDataPoint {
                            time_unix_nano: now,
                            value: Some(number_data_point::Value::AsInt(1)),
                            ..Default::default()
                        }],
                        aggregation_temporality: AggregationTemporality::Delta as i32,
                        is_monotonic: true,
                    })),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn sample_log(now: u64) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            scope_logs: vec![ScopeLogs {
                scope: scope(),
                log_records: vec![LogRecord {
                    time_unix_nano: now,
                    severity_number: SeverityNumber::Info as i32,
                    severity_text: "INFO".to_string(),
                    body: Some(AnyValue {
                        value: Some(any_value::Value::StringValue(
                            "pipeline smoke test".to_string(),
                        )),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}
