//! All three pipelines assembled together.
//!
//! [`Telemetry`] owns the trace, metric and log providers built from one
//! [`PipelineConfig`], sharing a single [`ShutdownRegistry`]. Call
//! [`Telemetry::shutdown`] before the process exits; dropping it without doing
//! so logs a warning and loses whatever is still buffered.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::factory::{LoggerProviderFactory, MeterProviderFactory, TracerProviderFactory};
use crate::provider::{LoggerProvider, MeterProvider, TracerProvider};
use crate::resource::ResourceDescriptor;
use crate::shutdown::{ShutdownRegistry, ShutdownReport};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_directives`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(default_directives: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .without_time(),
        )
        .with(filter)
        .try_init()?;

    Ok(())
}

/// Trace, metric and log providers with their shared teardown.
#[derive(Debug)]
pub struct Telemetry {
    resource: ResourceDescriptor,
    tracer_provider: Arc<TracerProvider>,
    meter_provider: Arc<MeterProvider>,
    logger_provider: Arc<LoggerProvider>,
    registry: Arc<ShutdownRegistry>,
}

impl Telemetry {
    /// Builds the resource and assembles the three providers concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first assembly error. Anything already built is shut down
    /// before returning.
    pub async fn from_config(config: &PipelineConfig) -> Result<Self> {
        let registry = Arc::new(ShutdownRegistry::new());
        Self::with_registry(config, registry).await
    }

    /// Like [`from_config`](Self::from_config), registering into `registry`.
    ///
    /// Assembly registers into a private registry whose resources move to
    /// `registry` only once all three providers are ready. Resources the
    /// caller registered earlier are never touched by a failed call.
    ///
    /// # Errors
    ///
    /// Returns the first assembly error, after shutting down whatever this
    /// call built.
    pub async fn with_registry(
        config: &PipelineConfig,
        registry: Arc<ShutdownRegistry>,
    ) -> Result<Self> {
        let resource = ResourceDescriptor::from_config(&config.resource);
        let staging = Arc::new(ShutdownRegistry::new());

        let traces = TracerProviderFactory::from_config(Arc::clone(&staging), config);
        let metrics = MeterProviderFactory::from_config(Arc::clone(&staging), config);
        let logs = LoggerProviderFactory::from_config(Arc::clone(&staging), config);

        let assembled = tokio::try_join!(
            traces.create(&resource, config.traces.exporters.as_deref()),
            metrics.create(&resource, config.metrics.exporters.as_deref()),
            logs.create(&resource, config.logs.exporters.as_deref()),
        );

        match assembled {
            Ok((tracer_provider, meter_provider, logger_provider)) => {
                registry.adopt(&staging);
                tracing::debug!(
                    service_name = resource.service_name().as_deref().unwrap_or("unknown"),
                    resources = registry.len(),
                    "Telemetry pipelines assembled"
                );
                Ok(Self {
                    resource,
                    tracer_provider,
                    meter_provider,
                    logger_provider,
                    registry,
                })
            }
            Err(e) => {
                let report = staging.shutdown_all().await;
                tracing::debug!(
                    target: "otel_lifecycle",
                    closed = report.closed,
                    failed = report.failed,
                    "Released partially assembled pipelines"
                );
                Err(e)
            }
        }
    }

    /// Returns the shared resource.
    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    /// Returns the trace provider.
    pub fn tracer_provider(&self) -> &Arc<TracerProvider> {
        &self.tracer_provider
    }

    /// Returns the metric provider.
    pub fn meter_provider(&self) -> &Arc<MeterProvider> {
        &self.meter_provider
    }

    /// Returns the log provider.
    pub fn logger_provider(&self) -> &Arc<LoggerProvider> {
        &self.logger_provider
    }

    /// Returns the shutdown registry.
    pub fn registry(&self) -> &Arc<ShutdownRegistry> {
        &self.registry
    }

    /// Flushes all three providers.
    ///
    /// Flush errors are logged via `tracing::warn!` with target `otel_lifecycle`.
    pub async fn flush(&self) {
        if let Err(e) = self.tracer_provider.force_flush().await {
            tracing::warn!(target: "otel_lifecycle", error = %e, "Failed to flush tracer provider");
        }

        if let Err(e) = self.meter_provider.force_flush().await {
            tracing::warn!(target: "otel_lifecycle", error = %e, "Failed to flush meter provider");
        }

        if let Err(e) = self.logger_provider.force_flush().await {
            tracing::warn!(target: "otel_lifecycle", error = %e, "Failed to flush logger provider");
        }
    }

    /// Shuts everything down, newest resource first.
    ///
    /// Safe to call more than once; later calls report nothing closed.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.registry.shutdown_all().await
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if !self.registry.is_shut_down() {
            tracing::warn!(
                target: "otel_lifecycle",
                resources = self.registry.len(),
                "Telemetry dropped without shutdown; buffered data may be lost"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfig;
    use crate::error::{ConfigError, PipelineError};
    use crate::signal::SignalKind;
    use crate::testing::CountingResource;

    #[tokio::test]
    async fn test_defaults_to_console_everywhere() {
        let telemetry = Telemetry::from_config(&PipelineConfig::default())
            .await
            .unwrap();

        assert_eq!(telemetry.tracer_provider().exporter_names(), vec!["console"]);
        assert_eq!(telemetry.meter_provider().exporter_names(), vec!["console"]);
        assert_eq!(telemetry.logger_provider().exporter_names(), vec!["console"]);

        let report = telemetry.shutdown().await;
        // three exporters, three processors, three providers
        assert_eq!(report.closed, 9);
        assert_eq!(telemetry.shutdown().await, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_failure_leaves_caller_resources_alone() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let registry = Arc::new(ShutdownRegistry::new());
        let existing = registry.register(CountingResource::new("existing", &log));
        let config = PipelineConfig::builder()
            .exporters(SignalKind::Logs, vec![ExporterConfig::new("fax")])
            .build();

        let err = Telemetry::with_registry(&config, Arc::clone(&registry))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnknownExporterType {
                kind: SignalKind::Logs,
                ..
            })
        ));
        assert!(!registry.is_shut_down());
        assert_eq!(registry.len(), 1);
        assert_eq!(existing.close_count(), 0);

        let report = registry.shutdown_all().await;
        assert_eq!(report.closed, 1);
        assert_eq!(*log.lock(), vec!["existing"]);
    }

    #[tokio::test]
    async fn test_success_joins_caller_registry() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let registry = Arc::new(ShutdownRegistry::new());
        let existing = registry.register(CountingResource::new("existing", &log));

        let telemetry = Telemetry::with_registry(&PipelineConfig::default(), Arc::clone(&registry))
            .await
            .unwrap();
        // nine pipeline resources on top of the caller's own
        assert_eq!(registry.len(), 10);

        let report = telemetry.shutdown().await;
        assert_eq!(report.closed, 10);
        assert_eq!(existing.close_count(), 1);
        assert!(telemetry.logger_provider().is_shut_down());
    }
}
