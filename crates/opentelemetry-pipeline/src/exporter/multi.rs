//! Resilient fan-out over several exporters of one signal type.
//!
//! [`MultiExporter`] presents the same contract as a single exporter. Every
//! call reaches every member in configuration order; a member that fails or
//! panics is logged and recorded, but never stops dispatch to the others.

use super::{ExportError, ExportResult, Exporter, SharedExporter};
use crate::shutdown::Closeable;
use crate::signal::Signal;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Exporter that dispatches each call to an ordered list of members.
///
/// `shutdown` performs no idempotence check: calling it twice calls every
/// member's `shutdown` twice. Exactly-once teardown is the job of the
/// [`ShutdownRegistry`](crate::ShutdownRegistry).
#[derive(Debug)]
pub struct MultiExporter<S: Signal> {
    members: Vec<SharedExporter<S>>,
}

impl<S: Signal> MultiExporter<S> {
    /// Creates a fan-out over `members`, dispatched in the given order.
    pub fn new(members: Vec<SharedExporter<S>>) -> Self {
        Self { members }
    }

    /// Returns the members in dispatch order.
    pub fn members(&self) -> &[SharedExporter<S>] {
        &self.members
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Runs `operation` against each member and returns the per-member results.
    async fn each<'a, F, Fut>(&'a self, operation: &'static str, call: F) -> Vec<ExportResult>
    where
        F: Fn(&'a SharedExporter<S>) -> Fut,
        Fut: Future<Output = ExportResult> + 'a,
    {
        let mut results = Vec::with_capacity(self.members.len());
        for (position, member) in self.members.iter().enumerate() {
            let result = isolate(call(member)).await;
            if let Err(e) = &result {
                tracing::warn!(
                    kind = %S::KIND,
                    exporter = member.name(),
                    position,
                    operation,
                    error = %e,
                    "Exporter member failed"
                );
            }
            results.push(result);
        }
        results
    }

    /// Exports to every member, returning each member's own result.
    pub async fn export_each(&self, batch: &S) -> Vec<ExportResult> {
        self.each("export", |member| member.export(batch)).await
    }

    /// Flushes every member, returning each member's own result.
    pub async fn flush_each(&self) -> Vec<ExportResult> {
        self.each("flush", |member| member.flush()).await
    }

    /// Shuts down every member, returning each member's own result.
    pub async fn shutdown_each(&self) -> Vec<ExportResult> {
        self.each("shutdown", |member| member.shutdown()).await
    }
}

#[async_trait]
impl<S: Signal> Exporter<S> for MultiExporter<S> {
    fn name(&self) -> &str {
        "multi"
    }

    async fn export(&self, batch: &S) -> ExportResult {
        combine_results(self.export_each(batch).await)
    }

    async fn flush(&self) -> ExportResult {
        combine_results(self.flush_each().await)
    }

    async fn shutdown(&self) -> ExportResult {
        combine_results(self.shutdown_each().await)
    }
}

#[async_trait]
impl<S: Signal> Closeable for MultiExporter<S> {
    fn describe(&self) -> String {
        format!("{} multi-exporter ({} members)", S::KIND, self.members.len())
    }

    async fn close(&self) -> ExportResult {
        Exporter::shutdown(self).await
    }
}

/// Combines per-member results: succeeds only if every member succeeded.
///
/// An empty set of results is a success.
pub fn combine_results(results: impl IntoIterator<Item = ExportResult>) -> ExportResult {
    let mut total = 0;
    let mut failed = 0;
    let mut first = None;

    for result in results {
        total += 1;
        if let Err(e) = result {
            failed += 1;
            first.get_or_insert(e);
        }
    }

    match first {
        None => Ok(()),
        Some(first) => Err(ExportError::Partial {
            failed,
            total,
            first: Box::new(first),
        }),
    }
}

/// Awaits `future`, converting a panic into [`ExportError::Panicked`].
pub(crate) async fn isolate<F>(future: F) -> ExportResult
where
    F: Future<Output = ExportResult>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(ExportError::Panicked(panic_message(panic.as_ref()))),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
