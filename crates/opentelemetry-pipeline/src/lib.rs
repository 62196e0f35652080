//! OpenTelemetry pipeline assembly with resilient multi-exporter fan-out.
//!
//! This crate turns a declarative list of exporter entries per signal kind
//! (traces, metrics, logs) into a running pipeline:
//!
//! - entries resolve through an [`ExporterRegistry`] into [`ExporterHolder`]s;
//!   an absent or empty list means a single console exporter, and `none`
//!   entries are filtered out;
//! - the [`ProcessorAssembler`] gives every synchronous destination its own
//!   [`ImmediateProcessor`] and puts all batch-eligible destinations behind one
//!   [`BatchProcessor`] over a [`MultiExporter`];
//! - a [`MultiExporter`] dispatches to every member even when some fail or panic;
//! - everything built is registered with a [`ShutdownRegistry`], which releases
//!   it exactly once, newest first.
//!
//! [`Telemetry`] assembles all three signal kinds from a [`PipelineConfig`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod exporter;
pub mod factory;
pub mod holder;
pub mod processor;
pub mod provider;
pub mod resource;
pub mod shutdown;
pub mod signal;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::{
    BatchConfig, Compression, ExporterConfig, OtlpConfig, PipelineConfig, PipelineConfigBuilder,
    Protocol, ResourceConfig, SignalConfig,
};
pub use error::{ConfigError, PipelineError, Result};
pub use exporter::{
    ConsoleExporter, DestinationFactory, ExportError, ExportResult, Exporter, ExporterRegistry,
    LoggerExporter, MultiExporter, OtlpEndpoint, OtlpExporter, ResolveContext, Resolved,
    SharedExporter, combine_results,
};
pub use factory::{
    AssemblyState, LoggerProviderFactory, MeterProviderFactory, ProviderFactory,
    TracerProviderFactory,
};
pub use holder::ExporterHolder;
pub use processor::{Assembly, BatchProcessor, ImmediateProcessor, Processor, ProcessorAssembler};
pub use provider::{LoggerProvider, MeterProvider, Provider, TracerProvider};
pub use resource::ResourceDescriptor;
pub use shutdown::{Closeable, ShutdownRegistry, ShutdownReport};
pub use signal::{Signal, SignalKind};
pub use telemetry::{Telemetry, init_tracing};
