//! Providers: the producer-facing end of a pipeline.

use crate::exporter::{ExportError, ExportResult, combine_results};
use crate::processor::{Assembly, Processor};
use crate::resource::ResourceDescriptor;
use crate::shutdown::Closeable;
use crate::signal::{Signal, SignalKind};
use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::{
    logs::v1::ExportLogsServiceRequest, metrics::v1::ExportMetricsServiceRequest,
    trace::v1::ExportTraceServiceRequest,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Provider for trace batches.
pub type TracerProvider = Provider<ExportTraceServiceRequest>;
/// Provider for metric batches.
pub type MeterProvider = Provider<ExportMetricsServiceRequest>;
/// Provider for log batches.
pub type LoggerProvider = Provider<ExportLogsServiceRequest>;

/// Accepts batches of one signal kind and hands them to the pipeline's processors.
pub struct Provider<S: Signal> {
    resource: ResourceDescriptor,
    processors: Vec<Processor<S>>,
    filtered: usize,
    is_shutdown: AtomicBool,
}

impl<S: Signal> Provider<S> {
    pub(crate) fn new(resource: ResourceDescriptor, assembly: Assembly<S>) -> Self {
        Self {
            resource,
            processors: assembly.processors,
            filtered: assembly.filtered,
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Returns the signal kind this provider handles.
    pub fn kind(&self) -> SignalKind {
        S::KIND
    }

    /// Returns the resource attached to emitted batches.
    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    /// Returns the processors: immediate ones first, then the batch processor.
    pub fn processors(&self) -> &[Processor<S>] {
        &self.processors
    }

    /// Returns how many configuration entries contributed no exporter.
    pub fn filtered(&self) -> usize {
        self.filtered
    }

    /// Returns every exporter name, processor by processor.
    pub fn exporter_names(&self) -> Vec<String> {
        self.processors
            .iter()
            .flat_map(Processor::exporter_names)
            .collect()
    }

    /// Returns whether the provider has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// Emits a batch.
    ///
    /// Resource entries without a resource get this provider's. The result
    /// covers immediate processors only. A batch processor that refuses the
    /// batch is logged at `warn`.
    pub async fn emit(&self, mut batch: S) -> ExportResult {
        if self.is_shut_down() {
            return Err(ExportError::Shutdown);
        }

        batch.fill_resource(self.resource.to_proto());

        let mut immediate = Vec::with_capacity(self.processors.len());
        for processor in &self.processors {
            let result = processor.on_emit(&batch).await;
            if processor.is_batch() {
                match result {
                    Ok(()) => {}
                    // already warned by the batch processor
                    Err(ExportError::QueueFull) => {}
                    Err(e) => {
                        tracing::warn!(
                            kind = %S::KIND,
                            error = %e,
                            "Batch processor did not accept batch"
                        );
                    }
                }
            } else {
                immediate.push(result);
            }
        }

        combine_results(immediate)
    }

    /// Flushes every processor.
    pub async fn force_flush(&self) -> ExportResult {
        let mut results = Vec::with_capacity(self.processors.len());
        for processor in &self.processors {
            results.push(processor.force_flush().await);
        }
        combine_results(results)
    }

    /// Stops accepting batches and flushes the processors.
    ///
    /// Processors and exporters are stopped separately by the shutdown registry.
    pub async fn shutdown(&self) -> ExportResult {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.force_flush().await
    }
}

impl<S: Signal> fmt::Debug for Provider<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &S::KIND)
            .field("processors", &self.processors.len())
            .field("exporters", &self.exporter_names())
            .field("filtered", &self.filtered)
            .field("is_shutdown", &self.is_shut_down())
            .finish()
    }
}

#[async_trait]
impl<S: Signal> Closeable for Provider<S> {
    fn describe(&self) -> String {
        format!("{} provider", S::KIND)
    }

    async fn close(&self) -> ExportResult {
        self.shutdown().await
    }
}
