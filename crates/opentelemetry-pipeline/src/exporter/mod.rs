//! Exporters: the destinations a signal batch is sent to.
//!
//! Every destination implements [`Exporter`] for the signal types it handles.
//! The pipeline never depends on a concrete transport; it only calls
//! `export`, `flush` and `shutdown` through this trait.

pub mod console;
pub mod logger;
pub mod multi;
pub mod otlp;
pub mod registry;

pub use console::ConsoleExporter;
pub use logger::LoggerExporter;
pub use multi::{MultiExporter, combine_results};
pub use otlp::{OtlpEndpoint, OtlpExporter};
pub use registry::{DestinationFactory, ExporterRegistry, ResolveContext, Resolved};

use crate::signal::Signal;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Result of an export, flush or shutdown call.
pub type ExportResult = Result<(), ExportError>;

/// Shared handle to a type-erased exporter.
pub type SharedExporter<S> = Arc<dyn Exporter<S>>;

/// Error during export.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// HTTP request failed.
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Server returned an error status.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code returned by server.
        status: u16,
        /// Response body from server.
        body: String,
    },

    /// Encoding failed.
    #[error("failed to encode request")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Writing to a local sink failed.
    #[error("failed to write export output")]
    Io(#[from] std::io::Error),

    /// The exporter or processor has already been shut down.
    #[error("already shut down")]
    Shutdown,

    /// The exporter panicked while handling the call.
    #[error("exporter panicked: {0}")]
    Panicked(String),

    /// The batch queue is full and the batch was dropped.
    #[error("batch queue is full")]
    QueueFull,

    /// The operation did not complete within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Some members of a fan-out failed.
    #[error("{failed} of {total} exporters failed")]
    Partial {
        /// Number of failed members.
        failed: usize,
        /// Number of members attempted.
        total: usize,
        /// The first member failure.
        #[source]
        first: Box<ExportError>,
    },
}

impl ExportError {
    pub(crate) fn encode<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Encode(Box::new(error))
    }

    pub(crate) fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }
}

/// A destination for batches of one signal type.
///
/// Implementations must reject `export` once `shutdown` has been called,
/// returning [`ExportError::Shutdown`] rather than silently succeeding.
#[async_trait]
pub trait Exporter<S: Signal>: Send + Sync + fmt::Debug {
    /// Short name of the destination type, used in logs and introspection.
    fn name(&self) -> &str;

    /// Sends one batch to the destination.
    async fn export(&self, batch: &S) -> ExportResult;

    /// Pushes out anything the exporter buffers internally.
    async fn flush(&self) -> ExportResult {
        Ok(())
    }

    /// Releases the exporter. Subsequent exports fail.
    async fn shutdown(&self) -> ExportResult;
}
