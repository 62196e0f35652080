//! Turns resolved exporter holders into a pipeline's processors.

use super::{BatchProcessor, ImmediateProcessor, Processor};
use crate::config::BatchConfig;
use crate::error::ConfigError;
use crate::exporter::{MultiExporter, Resolved, SharedExporter};
use crate::shutdown::ShutdownRegistry;
use crate::signal::Signal;
use std::sync::Arc;

/// Processors built for one pipeline.
#[derive(Debug)]
pub struct Assembly<S: Signal> {
    /// Immediate processors in configuration order, then the batch processor.
    pub processors: Vec<Processor<S>>,
    /// Configuration entries that resolved to no exporter.
    pub filtered: usize,
}

/// Partitions holders into immediate processors and one shared batch processor.
///
/// Each exporter and processor is registered with the shutdown registry as
/// soon as it is built. Registration order is exporter before processor, so
/// teardown stops a processor before the exporters it feeds.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorAssembler<'a> {
    registry: &'a ShutdownRegistry,
    batch: &'a BatchConfig,
}

impl<'a> ProcessorAssembler<'a> {
    /// Creates an assembler registering into `registry` and batching with `batch`.
    pub fn new(registry: &'a ShutdownRegistry, batch: &'a BatchConfig) -> Self {
        Self { registry, batch }
    }

    /// Builds the processors for `resolved`.
    ///
    /// # Errors
    ///
    /// Returns the first exporter construction failure. Resources built before
    /// it stay registered; batch-eligible exporters built for the unfinished
    /// batch group are shut down before returning.
    pub async fn assemble<S: Signal>(
        &self,
        resolved: Resolved<S>,
    ) -> Result<Assembly<S>, ConfigError> {
        let (batched, immediate): (Vec<_>, Vec<_>) = resolved
            .holders
            .into_iter()
            .partition(|holder| holder.batch_eligible());

        let mut processors = Vec::with_capacity(immediate.len() + 1);

        for holder in immediate {
            let exporter = self.registry.register_exporter(holder.materialize()?);
            let processor = self
                .registry
                .register(Arc::new(ImmediateProcessor::new(exporter)));
            processors.push(Processor::Immediate(processor));
        }

        if !batched.is_empty() {
            let mut members: Vec<SharedExporter<S>> = Vec::with_capacity(batched.len());
            for holder in batched {
                match holder.materialize() {
                    Ok(exporter) => members.push(exporter),
                    Err(e) => {
                        roll_back(members).await;
                        return Err(e);
                    }
                }
            }

            let multi = self.registry.register(Arc::new(MultiExporter::new(members)));
            let processor = self.registry.register(Arc::new(BatchProcessor::new(
                multi,
                self.batch.clone(),
            )));
            processors.push(Processor::Batch(processor));
        }

        tracing::debug!(
            kind = %S::KIND,
            processors = processors.len(),
            filtered = resolved.filtered,
            "Assembled processors"
        );

        Ok(Assembly {
            processors,
            filtered: resolved.filtered,
        })
    }
}

/// Shuts down batch-group exporters that never made it into a registered fan-out.
async fn roll_back<S: Signal>(members: Vec<SharedExporter<S>>) {
    if members.is_empty() {
        return;
    }
    tracing::debug!(kind = %S::KIND, count = members.len(), "Rolling back unregistered exporters");
    // Failures are already logged per member.
    let _ = MultiExporter::new(members).shutdown_each().await;
}
