//! Provider factories: from exporter configuration to a ready provider.
//!
//! A [`ProviderFactory`] resolves a signal's exporter list (falling back to a
//! single console exporter), assembles the processors and registers everything
//! it builds with the shared [`ShutdownRegistry`].

use crate::config::{BatchConfig, ExporterConfig, OtlpConfig, PipelineConfig};
use crate::error::Result;
use crate::exporter::ExporterRegistry;
use crate::processor::ProcessorAssembler;
use crate::provider::Provider;
use crate::resource::ResourceDescriptor;
use crate::shutdown::ShutdownRegistry;
use crate::signal::Signal;
use opentelemetry_proto::tonic::collector::{
    logs::v1::ExportLogsServiceRequest, metrics::v1::ExportMetricsServiceRequest,
    trace::v1::ExportTraceServiceRequest,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Factory for trace providers.
pub type TracerProviderFactory = ProviderFactory<ExportTraceServiceRequest>;
/// Factory for metric providers.
pub type MeterProviderFactory = ProviderFactory<ExportMetricsServiceRequest>;
/// Factory for log providers.
pub type LoggerProviderFactory = ProviderFactory<ExportLogsServiceRequest>;

/// Progress of the most recent [`ProviderFactory::create`] call.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// Nothing assembled yet, or the last assembly failed.
    Unassembled,
    /// An assembly is in progress.
    Assembling,
    /// The last assembly produced a provider.
    Ready,
}

/// Builds providers of one signal kind.
pub struct ProviderFactory<S: Signal> {
    registry: Arc<ShutdownRegistry>,
    exporters: ExporterRegistry<S>,
    otlp: OtlpConfig,
    batch: BatchConfig,
    state: Mutex<AssemblyState>,
}

impl<S: Signal> ProviderFactory<S> {
    /// Creates a factory registering into `registry`, with built-in destinations
    /// and default batch settings for the signal kind.
    pub fn new(registry: Arc<ShutdownRegistry>) -> Self {
        Self {
            registry,
            exporters: ExporterRegistry::with_builtins(),
            otlp: OtlpConfig::default(),
            batch: BatchConfig::for_kind(S::KIND),
            state: Mutex::new(AssemblyState::Unassembled),
        }
    }

    /// Creates a factory using the shared OTLP and per-signal batch settings of `config`.
    pub fn from_config(registry: Arc<ShutdownRegistry>, config: &PipelineConfig) -> Self {
        Self::new(registry)
            .with_otlp(config.otlp.clone())
            .with_batch_config(config.signal(S::KIND).batch.clone())
    }

    /// Sets the OTLP settings `otlp` entries inherit.
    #[must_use]
    pub fn with_otlp(mut self, otlp: OtlpConfig) -> Self {
        self.otlp = otlp;
        self
    }

    /// Sets the batch processor settings.
    #[must_use]
    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Replaces the destination registry.
    #[must_use]
    pub fn with_exporter_registry(mut self, exporters: ExporterRegistry<S>) -> Self {
        self.exporters = exporters;
        self
    }

    /// Returns the destination registry for adding destination types.
    pub fn exporter_registry_mut(&mut self) -> &mut ExporterRegistry<S> {
        &mut self.exporters
    }

    /// Returns the shutdown registry this factory registers into.
    pub fn shutdown_registry(&self) -> &Arc<ShutdownRegistry> {
        &self.registry
    }

    /// Returns the state of the most recent assembly.
    pub fn state(&self) -> AssemblyState {
        *self.state.lock()
    }

    /// Assembles a provider for `resource` from `exporters`.
    ///
    /// An absent or empty list yields a single console exporter. Each call
    /// starts a fresh assembly.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for zero batch durations, an unknown
    /// exporter type, invalid parameters, or an exporter that cannot be
    /// constructed. Whatever was
    /// registered before the failure is released by the registry's
    /// `shutdown_all`.
    pub async fn create(
        &self,
        resource: &ResourceDescriptor,
        exporters: Option<&[ExporterConfig]>,
    ) -> Result<Arc<Provider<S>>> {
        self.transition(AssemblyState::Assembling);

        match self.assemble(resource, exporters).await {
            Ok(provider) => {
                self.transition(AssemblyState::Ready);
                tracing::debug!(
                    kind = %S::KIND,
                    exporters = ?provider.exporter_names(),
                    filtered = provider.filtered(),
                    "Provider ready"
                );
                Ok(provider)
            }
            Err(e) => {
                self.transition(AssemblyState::Unassembled);
                tracing::debug!(kind = %S::KIND, error = %e, "Provider assembly failed");
                Err(e)
            }
        }
    }

    async fn assemble(
        &self,
        resource: &ResourceDescriptor,
        exporters: Option<&[ExporterConfig]>,
    ) -> Result<Arc<Provider<S>>> {
        self.batch.validate(S::KIND)?;
        let resolved = self.exporters.resolve(exporters, &self.otlp)?;
        let assembly = ProcessorAssembler::new(&self.registry, &self.batch)
            .assemble(resolved)
            .await?;
        Ok(self
            .registry
            .register(Arc::new(Provider::new(resource.clone(), assembly))))
    }

    fn transition(&self, next: AssemblyState) {
        let mut state = self.state.lock();
        tracing::debug!(kind = %S::KIND, from = ?*state, to = ?next, "Assembly state change");
        *state = next;
    }
}

impl<S: Signal> fmt::Debug for ProviderFactory<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("signal", &S::KIND)
            .field("exporters", &self.exporters)
            .field("batch", &self.batch)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, PipelineError};

    #[tokio::test]
    async fn test_state_transitions() {
        let factory = TracerProviderFactory::new(Arc::new(ShutdownRegistry::new()));
        assert_eq!(factory.state(), AssemblyState::Unassembled);

        factory
            .create(&ResourceDescriptor::default(), None)
            .await
            .unwrap();
        assert_eq!(factory.state(), AssemblyState::Ready);

        let err = factory
            .create(
                &ResourceDescriptor::default(),
                Some(&[ExporterConfig::new("carrier-pigeon")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnknownExporterType { .. })
        ));
        assert_eq!(factory.state(), AssemblyState::Unassembled);

        factory.shutdown_registry().shutdown_all().await;
    }

    #[tokio::test]
    async fn test_default_registers_console_processor_and_provider() {
        let registry = Arc::new(ShutdownRegistry::new());
        let factory = LoggerProviderFactory::new(Arc::clone(&registry));

        let provider = factory
            .create(&ResourceDescriptor::default(), Some(&[]))
            .await
            .unwrap();

        assert_eq!(provider.exporter_names(), vec!["console"]);
        // exporter, processor, provider
        assert_eq!(registry.len(), 3);

        registry.shutdown_all().await;
        assert!(provider.is_shut_down());
    }

    #[tokio::test]
    async fn test_zero_batch_durations_are_rejected_before_assembly() {
        let registry = Arc::new(ShutdownRegistry::new());

        for (batch, expected) in [
            (
                BatchConfig {
                    scheduled_delay: std::time::Duration::ZERO,
                    ..BatchConfig::default()
                },
                "scheduled_delay",
            ),
            (
                BatchConfig {
                    export_timeout: std::time::Duration::ZERO,
                    ..BatchConfig::default()
                },
                "export_timeout",
            ),
        ] {
            let factory =
                MeterProviderFactory::new(Arc::clone(&registry)).with_batch_config(batch);

            let err = factory
                .create(&ResourceDescriptor::default(), None)
                .await
                .unwrap_err();

            match err {
                PipelineError::Config(ConfigError::InvalidBatch { kind, setting }) => {
                    assert_eq!(kind, crate::signal::SignalKind::Metrics);
                    assert_eq!(setting, expected);
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(factory.state(), AssemblyState::Unassembled);
        }

        assert!(registry.is_empty());
    }

    #[test]
    fn test_meter_factory_uses_metric_interval() {
        let config = PipelineConfig::default();
        let factory = MeterProviderFactory::from_config(Arc::new(ShutdownRegistry::new()), &config);

        assert_eq!(factory.batch, config.metrics.batch);
        assert_eq!(factory.batch.scheduled_delay.as_secs(), 60);
    }
}
