//! Test doubles shared by unit tests.

use crate::exporter::{ExportError, ExportResult, Exporter};
use crate::shutdown::Closeable;
use crate::signal::Signal;
use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behaviour {
    Succeed,
    Fail,
    Panic,
    /// Never completes an export within any reasonable deadline.
    Stall,
}

/// Exporter that counts calls and records exported item counts.
#[derive(Debug)]
pub(crate) struct RecordingExporter {
    name: String,
    behaviour: Behaviour,
    exports: AtomicUsize,
    items: AtomicUsize,
    flushes: AtomicUsize,
    shutdowns: AtomicUsize,
    shut_down: AtomicBool,
    log: Option<CallLog>,
}

impl RecordingExporter {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Self::build(name, Behaviour::Succeed, None)
    }

    pub(crate) fn with_behaviour(name: &str, behaviour: Behaviour) -> Arc<Self> {
        Self::build(name, behaviour, None)
    }

    pub(crate) fn logged(name: &str, log: CallLog) -> Arc<Self> {
        Self::build(name, Behaviour::Succeed, Some(log))
    }

    fn build(name: &str, behaviour: Behaviour, log: Option<CallLog>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behaviour,
            exports: AtomicUsize::new(0),
            items: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            log,
        })
    }

    pub(crate) fn export_calls(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    pub(crate) fn exported_items(&self) -> usize {
        self.items.load(Ordering::SeqCst)
    }

    pub(crate) fn flush_calls(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdown_calls(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn record(&self, operation: &str) -> ExportResult {
        if let Some(log) = &self.log {
            log.lock().push(format!("{}:{operation}", self.name));
        }
        match self.behaviour {
            Behaviour::Succeed | Behaviour::Stall => Ok(()),
            Behaviour::Fail => Err(ExportError::status(503, "unavailable")),
            Behaviour::Panic => panic!("{} exporter exploded during {operation}", self.name),
        }
    }
}

#[async_trait]
impl<S: Signal> Exporter<S> for RecordingExporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &S) -> ExportResult {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ExportError::Shutdown);
        }
        self.exports.fetch_add(1, Ordering::SeqCst);
        if self.behaviour == Behaviour::Stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.items.fetch_add(batch.item_count(), Ordering::SeqCst);
        self.record("export")
    }

    async fn flush(&self) -> ExportResult {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.record("flush")
    }

    async fn shutdown(&self) -> ExportResult {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.shut_down.store(true, Ordering::SeqCst);
        self.record("shutdown")
    }
}

/// Closeable resource that counts closes and appends its name to a shared log.
#[derive(Debug)]
pub(crate) struct CountingResource {
    name: String,
    closes: AtomicUsize,
    fail: bool,
    log: CallLog,
}

impl CountingResource {
    pub(crate) fn new(name: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            closes: AtomicUsize::new(0),
            fail: false,
            log: Arc::clone(log),
        })
    }

    pub(crate) fn failing(name: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            closes: AtomicUsize::new(0),
            fail: true,
            log: Arc::clone(log),
        })
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Closeable for CountingResource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn close(&self) -> ExportResult {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(self.name.clone());
        if self.fail {
            Err(ExportError::status(500, "close failed"))
        } else {
            Ok(())
        }
    }
}

/// Builds a trace batch holding `spans` spans under one resource entry.
pub(crate) fn trace_batch(spans: usize) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                spans: (0..spans)
                    .map(|i| Span {
                        name: format!("span-{i}"),
                        trace_id: vec![1; 16],
                        span_id: vec![i as u8 + 1; 8],
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Formatted log output captured from a scoped subscriber.
#[derive(Debug, Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let logs = self.clone();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .without_time()
            .with_writer(move || logs.clone())
            .finish()
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Returns the captured lines containing `needle`.
    pub(crate) fn lines_with(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
