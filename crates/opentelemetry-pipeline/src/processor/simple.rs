//! Processor exporting each batch on the caller's task.

use crate::exporter::multi::isolate;
use crate::exporter::{ExportError, ExportResult, SharedExporter};
use crate::shutdown::Closeable;
use crate::signal::Signal;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Wraps exactly one exporter and exports every batch as it is emitted.
pub struct ImmediateProcessor<S: Signal> {
    exporter: SharedExporter<S>,
    is_shutdown: AtomicBool,
}

impl<S: Signal> ImmediateProcessor<S> {
    /// Creates a processor over `exporter`.
    pub fn new(exporter: SharedExporter<S>) -> Self {
        Self {
            exporter,
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Returns the wrapped exporter.
    pub fn exporter(&self) -> &SharedExporter<S> {
        &self.exporter
    }

    /// Exports `batch` and returns the exporter's result.
    pub async fn on_emit(&self, batch: &S) -> ExportResult {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExportError::Shutdown);
        }
        isolate(self.exporter.export(batch)).await
    }

    /// Flushes the exporter.
    pub async fn force_flush(&self) -> ExportResult {
        isolate(self.exporter.flush()).await
    }

    /// Stops accepting batches and flushes the exporter.
    pub async fn shutdown(&self) -> ExportResult {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.force_flush().await
    }
}

impl<S: Signal> fmt::Debug for ImmediateProcessor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmediateProcessor")
            .field("exporter", &self.exporter)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl<S: Signal> Closeable for ImmediateProcessor<S> {
    fn describe(&self) -> String {
        format!("{} immediate processor ({})", S::KIND, self.exporter.name())
    }

    async fn close(&self) -> ExportResult {
        self.shutdown().await
    }
}
