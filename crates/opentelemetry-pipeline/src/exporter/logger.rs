//! Exporter that hands batches to the host's `tracing` subscriber.
//!
//! Each batch becomes one `info` event with target `otel_pipeline::logger`,
//! so console output follows whatever formatting and filtering the host
//! application has installed.

use super::{ExportError, ExportResult, Exporter};
use crate::signal::Signal;
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exporter that logs each batch as a `tracing` event.
pub struct LoggerExporter<S: Signal> {
    is_shutdown: AtomicBool,
    _signal: PhantomData<fn() -> S>,
}

impl<S: Signal> LoggerExporter<S> {
    /// Creates the exporter.
    pub fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
            _signal: PhantomData,
        }
    }
}

impl<S: Signal> Default for LoggerExporter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Signal> fmt::Debug for LoggerExporter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerExporter")
            .field("signal", &S::KIND)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl<S: Signal> Exporter<S> for LoggerExporter<S> {
    fn name(&self) -> &str {
        "logger"
    }

    async fn export(&self, batch: &S) -> ExportResult {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExportError::Shutdown);
        }

        let request = serde_json::to_string(batch).map_err(ExportError::encode)?;
        tracing::info!(
            target: "otel_pipeline::logger",
            signal = S::KIND.as_str(),
            items = batch.item_count(),
            request = %request,
            "Telemetry batch"
        );
        Ok(())
    }

    async fn shutdown(&self) -> ExportResult {
        self.is_shutdown.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CapturedLogs, trace_batch};
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use tracing::instrument::WithSubscriber;

    type Traces = ExportTraceServiceRequest;

    #[tokio::test]
    async fn test_batch_becomes_one_info_event() {
        let logs = CapturedLogs::default();
        let exporter = LoggerExporter::<Traces>::new();

        exporter
            .export(&trace_batch(3))
            .with_subscriber(logs.subscriber())
            .await
            .unwrap();

        let lines = logs.lines_with("otel_pipeline::logger");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].contains("signal=\"traces\""));
        assert!(lines[0].contains("items=3"));
        assert!(lines[0].contains("span-2"));
    }

    #[tokio::test]
    async fn test_export_after_shutdown_logs_nothing() {
        let logs = CapturedLogs::default();
        let exporter = LoggerExporter::<Traces>::new();
        exporter.shutdown().await.unwrap();

        let result = exporter
            .export(&trace_batch(1))
            .with_subscriber(logs.subscriber())
            .await;

        assert!(matches!(result, Err(ExportError::Shutdown)));
        assert!(logs.lines_with("otel_pipeline::logger").is_empty());
    }
}
