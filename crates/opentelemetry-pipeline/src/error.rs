//! Error types for pipeline assembly.

use crate::exporter::ExportError;
use crate::signal::SignalKind;
use thiserror::Error;

/// A specialised Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while assembling or running pipelines.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error; assembly is aborted.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Export error.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Tracing subscriber initialisation failed.
    #[error("failed to initialise tracing")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
}

impl From<figment::Error> for PipelineError {
    fn from(err: figment::Error) -> Self {
        PipelineError::Config(err.into())
    }
}

/// Fatal configuration errors, surfaced before a provider becomes ready.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The layered configuration could not be loaded.
    #[error("failed to load configuration")]
    Load(#[source] Box<figment::Error>),

    /// An exporter entry names a destination type nobody registered.
    #[error("{kind} exporter #{index}: unknown exporter type '{exporter_type}'")]
    UnknownExporterType {
        /// Signal kind of the offending list.
        kind: SignalKind,
        /// Position of the entry in its list.
        index: usize,
        /// The unrecognised type tag.
        exporter_type: String,
    },

    /// An exporter entry's parameters do not fit its destination type.
    #[error("{kind} exporter #{index} ('{exporter_type}'): invalid parameters")]
    InvalidParams {
        /// Signal kind of the offending list.
        kind: SignalKind,
        /// Position of the entry in its list.
        index: usize,
        /// The entry's type tag.
        exporter_type: String,
        /// Underlying deserialisation failure.
        #[source]
        source: serde_json::Error,
    },

    /// An exporter entry was rejected by its destination factory.
    #[error("{kind} exporter #{index} ('{exporter_type}'): {source}")]
    InvalidEntry {
        /// Signal kind of the offending list.
        kind: SignalKind,
        /// Position of the entry in its list.
        index: usize,
        /// The entry's type tag.
        exporter_type: String,
        /// Why the entry was rejected.
        #[source]
        source: Box<ConfigError>,
    },

    /// The OTLP protocol is not one of the supported values.
    #[error("unsupported OTLP protocol '{0}', must be one of 'grpc' or 'http/protobuf'")]
    UnsupportedProtocol(String),

    /// The OTLP endpoint is not a valid URL.
    #[error("invalid OTLP endpoint URL '{url}'")]
    InvalidEndpoint {
        /// The rejected URL.
        url: String,
        /// Parse failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No gRPC transport is linked into this build.
    #[error("no gRPC transport available for {kind} exporter at '{endpoint}'")]
    GrpcUnavailable {
        /// Signal kind of the exporter.
        kind: SignalKind,
        /// The configured endpoint.
        endpoint: String,
    },

    /// A batch processor setting that must be non-zero is zero.
    #[error("{kind} batch setting '{setting}' must be greater than zero")]
    InvalidBatch {
        /// Signal kind the settings apply to.
        kind: SignalKind,
        /// Name of the offending setting.
        setting: &'static str,
    },

    /// An OTLP header name or value cannot be sent over HTTP.
    #[error("invalid OTLP header '{name}'")]
    InvalidHeader {
        /// The rejected header name.
        name: String,
        /// Why the header was rejected.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The HTTP client for an exporter could not be built.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    /// A custom destination failed to materialise its exporter.
    #[error("failed to create '{exporter_type}' exporter: {message}")]
    Materialize {
        /// The entry's type tag.
        exporter_type: String,
        /// What went wrong.
        message: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
