//! Deferred exporter construction.

use crate::error::ConfigError;
use crate::exporter::SharedExporter;
use crate::signal::Signal;
use std::fmt;

type ExporterFactory<S> = Box<dyn FnOnce() -> Result<SharedExporter<S>, ConfigError> + Send>;

/// A resolved exporter entry whose exporter has not been built yet.
///
/// The holder records whether the destination joins the shared batch
/// processor. Building the exporter consumes the holder, so it happens at
/// most once.
pub struct ExporterHolder<S: Signal> {
    label: String,
    batch_eligible: bool,
    factory: ExporterFactory<S>,
}

impl<S: Signal> ExporterHolder<S> {
    /// Creates a holder labelled `label` that builds its exporter with `factory`.
    pub fn new<F>(label: impl Into<String>, batch_eligible: bool, factory: F) -> Self
    where
        F: FnOnce() -> Result<SharedExporter<S>, ConfigError> + Send + 'static,
    {
        Self {
            label: label.into(),
            batch_eligible,
            factory: Box::new(factory),
        }
    }

    /// Returns whether the exporter should be wrapped by the batch processor.
    pub fn batch_eligible(&self) -> bool {
        self.batch_eligible
    }

    /// Returns the destination label, normally the entry's type tag.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Builds the exporter.
    ///
    /// # Errors
    ///
    /// Returns whatever error the destination reports while constructing it.
    pub fn materialize(self) -> Result<SharedExporter<S>, ConfigError> {
        (self.factory)()
    }
}

impl<S: Signal> fmt::Debug for ExporterHolder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterHolder")
            .field("signal", &S::KIND)
            .field("label", &self.label)
            .field("batch_eligible", &self.batch_eligible)
            .finish_non_exhaustive()
    }
}
