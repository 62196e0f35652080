//! Console exporter writing one JSON line per batch.
//!
//! This is the out-of-the-box destination used when no exporter is
//! configured. It writes synchronously, so it is never batch-eligible.

use super::{ExportError, ExportResult, Exporter};
use crate::signal::Signal;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exporter that writes batches as JSON lines to stdout or a custom writer.
pub struct ConsoleExporter<S: Signal> {
    writer: Mutex<Box<dyn Write + Send>>,
    pretty: bool,
    is_shutdown: AtomicBool,
    _signal: PhantomData<fn() -> S>,
}

impl<S: Signal> ConsoleExporter<S> {
    /// Creates an exporter writing to stdout.
    pub fn stdout() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Creates an exporter writing to `writer`.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            pretty: false,
            is_shutdown: AtomicBool::new(false),
            _signal: PhantomData,
        }
    }

    /// Enables multi-line, indented JSON output.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn render(&self, batch: &S) -> Result<String, ExportError> {
        let line = ConsoleLine {
            signal: S::KIND.as_str(),
            items: batch.item_count(),
            request: batch,
        };
        let rendered = if self.pretty {
            serde_json::to_string_pretty(&line)
        } else {
            serde_json::to_string(&line)
        };
        rendered.map_err(ExportError::encode)
    }
}

impl<S: Signal> fmt::Debug for ConsoleExporter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleExporter")
            .field("signal", &S::KIND)
            .field("pretty", &self.pretty)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: Signal> Exporter<S> for ConsoleExporter<S> {
    fn name(&self) -> &str {
        "console"
    }

    async fn export(&self, batch: &S) -> ExportResult {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExportError::Shutdown);
        }

        let json = self.render(batch)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{json}")?;
        Ok(())
    }

    async fn flush(&self) -> ExportResult {
        self.writer.lock().flush()?;
        Ok(())
    }

    async fn shutdown(&self) -> ExportResult {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            tracing::debug!(kind = %S::KIND, "Console exporter shut down more than once");
            return Ok(());
        }
        self.writer.lock().flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ConsoleLine<'a, S: Serialize> {
    signal: &'static str,
    items: usize,
    request: &'a S,
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn make_trace_batch(span_name: &str) -> ExportTraceServiceRequest {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                scope_spans: vec![ScopeSpans {
                    spans: vec![Span {
                        name: span_name.to_string(),
                        trace_id: vec![1; 16],
                        span_id: vec![1; 8],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    #[tokio::test]
    async fn test_writes_one_json_line_per_batch() {
        let buffer = SharedBuffer::default();
        let exporter = ConsoleExporter::with_writer(buffer.clone());

        exporter.export(&make_trace_batch("first")).await.unwrap();
        exporter.export(&make_trace_batch("second")).await.unwrap();

        let output = buffer.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["signal"], "traces");
        assert_eq!(parsed["items"], 1);
        assert!(lines[1].contains("second"));
    }

    #[tokio::test]
    async fn test_export_after_shutdown_fails() {
        let buffer = SharedBuffer::default();
        let exporter = ConsoleExporter::<ExportLogsServiceRequest>::with_writer(buffer.clone());

        exporter.shutdown().await.unwrap();
        let result = exporter.export(&ExportLogsServiceRequest::default()).await;

        assert!(matches!(result, Err(ExportError::Shutdown)));
        assert!(buffer.contents().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_shutdown_is_harmless() {
        let exporter = ConsoleExporter::<ExportLogsServiceRequest>::with_writer(Vec::new());

        assert!(exporter.shutdown().await.is_ok());
        assert!(exporter.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_pretty_output_spans_lines() {
        let buffer = SharedBuffer::default();
        let exporter = ConsoleExporter::with_writer(buffer.clone()).pretty(true);

        exporter.export(&make_trace_batch("pretty")).await.unwrap();

        assert!(buffer.contents().lines().count() > 1);
    }
}
