//! Processors decide when a batch reaches its exporters.
//!
//! A pipeline holds one [`ImmediateProcessor`] per destination that exports
//! synchronously, plus at most one [`BatchProcessor`] that buffers batches for
//! every batch-eligible destination behind a single [`MultiExporter`].
//!
//! [`MultiExporter`]: crate::exporter::MultiExporter

mod assembler;
mod batch;
mod simple;

pub use assembler::{Assembly, ProcessorAssembler};
pub use batch::BatchProcessor;
pub use simple::ImmediateProcessor;

use crate::exporter::ExportResult;
use crate::signal::Signal;
use std::sync::Arc;

/// One processor of a pipeline.
#[derive(Debug)]
pub enum Processor<S: Signal> {
    /// Exports on the calling task.
    Immediate(Arc<ImmediateProcessor<S>>),
    /// Buffers and exports from a background task.
    Batch(Arc<BatchProcessor<S>>),
}

impl<S: Signal> Processor<S> {
    /// Hands a batch to the processor.
    ///
    /// Immediate processors return the export result. Batch processors only
    /// report whether the batch was accepted into their queue.
    pub async fn on_emit(&self, batch: &S) -> ExportResult {
        match self {
            Processor::Immediate(p) => p.on_emit(batch).await,
            Processor::Batch(p) => p.on_emit(batch),
        }
    }

    /// Exports anything buffered and flushes the exporters.
    pub async fn force_flush(&self) -> ExportResult {
        match self {
            Processor::Immediate(p) => p.force_flush().await,
            Processor::Batch(p) => p.force_flush().await,
        }
    }

    /// Stops the processor. Exporters are left to the shutdown registry.
    pub async fn shutdown(&self) -> ExportResult {
        match self {
            Processor::Immediate(p) => p.shutdown().await,
            Processor::Batch(p) => p.shutdown().await,
        }
    }

    /// Returns whether this is the batch processor.
    pub fn is_batch(&self) -> bool {
        matches!(self, Processor::Batch(_))
    }

    /// Returns the names of the exporters this processor feeds, in order.
    pub fn exporter_names(&self) -> Vec<String> {
        match self {
            Processor::Immediate(p) => vec![p.exporter().name().to_string()],
            Processor::Batch(p) => p
                .exporter()
                .members()
                .iter()
                .map(|m| m.name().to_string())
                .collect(),
        }
    }
}

impl<S: Signal> Clone for Processor<S> {
    fn clone(&self) -> Self {
        match self {
            Processor::Immediate(p) => Processor::Immediate(Arc::clone(p)),
            Processor::Batch(p) => Processor::Batch(Arc::clone(p)),
        }
    }
}
