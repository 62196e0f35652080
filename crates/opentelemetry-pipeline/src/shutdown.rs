//! Exactly-once teardown of everything assembled for the pipelines.
//!
//! Every exporter, processor and provider built during assembly is registered
//! with a [`ShutdownRegistry`] the moment it exists. [`ShutdownRegistry::shutdown_all`]
//! then closes them newest first, so providers stop before their processors and
//! processors stop before their exporters.

use crate::exporter::multi::isolate;
use crate::exporter::{ExportResult, SharedExporter};
use crate::signal::Signal;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A resource released during teardown.
#[async_trait]
pub trait Closeable: Send + Sync + fmt::Debug {
    /// Human-readable description used in teardown logs.
    fn describe(&self) -> String;

    /// Releases the resource.
    async fn close(&self) -> ExportResult;
}

/// Outcome of [`ShutdownRegistry::shutdown_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Resources closed successfully.
    pub closed: usize,
    /// Resources whose close failed or panicked.
    pub failed: usize,
}

impl ShutdownReport {
    /// Returns whether every resource closed cleanly.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Ledger of closeable resources, released once in reverse registration order.
///
/// The registry is passed explicitly (as `Arc<ShutdownRegistry>`) to whoever
/// assembles pipelines. Registration is safe from concurrent tasks.
#[derive(Default)]
pub struct ShutdownRegistry {
    resources: Mutex<Vec<Arc<dyn Closeable>>>,
    shut_down: AtomicBool,
}

impl ShutdownRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource` for teardown and hands it back unchanged.
    ///
    /// A resource registered after [`shutdown_all`](Self::shutdown_all) has run
    /// is closed straight away on the current tokio runtime.
    pub fn register<R: Closeable + 'static>(&self, resource: Arc<R>) -> Arc<R> {
        {
            let mut resources = self.resources.lock();
            if !self.shut_down.load(Ordering::Acquire) {
                resources.push(Arc::clone(&resource) as Arc<dyn Closeable>);
                return resource;
            }
        }

        self.close_late(Arc::clone(&resource) as Arc<dyn Closeable>);
        resource
    }

    /// Registers an exporter so that teardown calls its `shutdown`.
    pub fn register_exporter<S: Signal>(&self, exporter: SharedExporter<S>) -> SharedExporter<S> {
        self.register(Arc::new(ExporterResource {
            exporter: Arc::clone(&exporter),
        }));
        exporter
    }

    /// Moves every resource registered with `other` into this registry,
    /// keeping their order.
    ///
    /// If this registry has already shut down, the moved resources are closed
    /// straight away, newest first.
    pub fn adopt(&self, other: &ShutdownRegistry) {
        let moved = std::mem::take(&mut *other.resources.lock());
        let late = {
            let mut resources = self.resources.lock();
            if !self.shut_down.load(Ordering::Acquire) {
                resources.extend(moved);
                return;
            }
            moved
        };

        for resource in late.into_iter().rev() {
            self.close_late(resource);
        }
    }

    /// Closes every registered resource, newest first.
    ///
    /// A failing or panicking resource is logged and counted; the rest are still
    /// closed. Calls after the first return an empty report without doing anything.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        if self
            .shut_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(target: "otel_lifecycle", "Shutdown already performed, ignoring");
            return ShutdownReport::default();
        }

        let resources = std::mem::take(&mut *self.resources.lock());
        tracing::debug!(target: "otel_lifecycle", count = resources.len(), "Shutting down registered resources");

        let mut report = ShutdownReport::default();
        for resource in resources.iter().rev() {
            match isolate(resource.close()).await {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        target: "otel_lifecycle",
                        resource = %resource.describe(),
                        error = %e,
                        "Failed to close resource"
                    );
                }
            }
        }
        report
    }

    /// Returns the number of resources awaiting teardown.
    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    /// Returns whether no resources await teardown.
    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }

    /// Returns whether [`shutdown_all`](Self::shutdown_all) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn close_late(&self, resource: Arc<dyn Closeable>) {
        let description = resource.describe();
        tracing::warn!(
            target: "otel_lifecycle",
            resource = %description,
            "Resource registered after shutdown, closing immediately"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = isolate(resource.close()).await {
                        tracing::warn!(
                            target: "otel_lifecycle",
                            resource = %description,
                            error = %e,
                            "Failed to close late resource"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    target: "otel_lifecycle",
                    resource = %description,
                    "No runtime available to close late resource"
                );
            }
        }
    }
}

impl fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("resources", &self.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Adapts an exporter to the registry: closing it shuts the exporter down.
#[derive(Debug)]
struct ExporterResource<S: Signal> {
    exporter: SharedExporter<S>,
}

#[async_trait]
impl<S: Signal> Closeable for ExporterResource<S> {
    fn describe(&self) -> String {
        format!("{} exporter '{}'", S::KIND, self.exporter.name())
    }

    async fn close(&self) -> ExportResult {
        self.exporter.shutdown().await
    }
}
