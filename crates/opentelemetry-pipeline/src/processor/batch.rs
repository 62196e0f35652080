//! Buffered export from a background task.
//!
//! Emitted batches travel over a bounded channel to a worker task that merges
//! them and exports when enough records have accumulated or the schedule
//! fires. Exports always run one at a time.

use crate::config::BatchConfig;
use crate::exporter::{ExportError, ExportResult, Exporter, MultiExporter};
use crate::shutdown::Closeable;
use crate::signal::Signal;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

enum BatchMessage<S> {
    Export(S),
    Flush(oneshot::Sender<ExportResult>),
    Shutdown(oneshot::Sender<ExportResult>),
}

/// Processor buffering batches for every batch-eligible exporter of a signal.
///
/// Must be created inside a tokio runtime: construction spawns the worker.
pub struct BatchProcessor<S: Signal> {
    exporter: Arc<MultiExporter<S>>,
    config: BatchConfig,
    sender: mpsc::Sender<BatchMessage<S>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    dropped: AtomicU64,
}

impl<S: Signal> BatchProcessor<S> {
    /// Creates the processor and starts its worker task.
    pub fn new(exporter: Arc<MultiExporter<S>>, config: BatchConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.max_queue_size.max(1));
        let worker = Worker {
            exporter: Arc::clone(&exporter),
            config: config.clone(),
            buffer: Vec::new(),
            buffered_items: 0,
        };
        let handle = tokio::spawn(worker.run(receiver));

        tracing::debug!(
            kind = %S::KIND,
            exporters = exporter.len(),
            max_queue_size = config.max_queue_size,
            max_export_batch_size = config.max_export_batch_size,
            scheduled_delay_ms = config.scheduled_delay.as_millis() as u64,
            "Batch processor started"
        );

        Self {
            exporter,
            config,
            sender,
            handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns the fan-out exporter this processor feeds.
    pub fn exporter(&self) -> &Arc<MultiExporter<S>> {
        &self.exporter
    }

    /// Returns the batch settings.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Returns how many batches were dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queues `batch` without waiting.
    ///
    /// A full queue drops the batch and returns [`ExportError::QueueFull`].
    pub fn on_emit(&self, batch: &S) -> ExportResult {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExportError::Shutdown);
        }

        match self.sender.try_send(BatchMessage::Export(batch.clone())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    kind = %S::KIND,
                    items = batch.item_count(),
                    dropped_total = dropped,
                    "Batch queue full, dropping batch"
                );
                Err(ExportError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(ExportError::Shutdown),
        }
    }

    /// Exports everything queued so far and flushes the exporters.
    ///
    /// Waits at most `export_timeout`.
    pub async fn force_flush(&self) -> ExportResult {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExportError::Shutdown);
        }
        self.request(BatchMessage::Flush).await
    }

    /// Drains the queue, exports the remainder and stops the worker.
    ///
    /// The worker gets `export_timeout` to finish; after that it is aborted.
    /// Calls after the first do nothing.
    pub async fn shutdown(&self) -> ExportResult {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self.request(BatchMessage::Shutdown).await;
        let handle = self.handle.lock().take();

        if let Some(handle) = handle {
            if matches!(result, Err(ExportError::Timeout(_))) {
                tracing::warn!(
                    kind = %S::KIND,
                    grace_ms = self.config.export_timeout.as_millis() as u64,
                    "Batch worker did not stop in time, aborting"
                );
                handle.abort();
            } else if let Err(e) = handle.await {
                tracing::warn!(kind = %S::KIND, error = %e, "Batch worker ended abnormally");
            }
        }

        tracing::debug!(kind = %S::KIND, dropped = self.dropped_count(), "Batch processor shut down");
        result
    }

    async fn request(
        &self,
        message: fn(oneshot::Sender<ExportResult>) -> BatchMessage<S>,
    ) -> ExportResult {
        let grace = self.config.export_timeout;
        let (reply, response) = oneshot::channel();

        let exchange = async {
            if self.sender.send(message(reply)).await.is_err() {
                return Err(ExportError::Shutdown);
            }
            response.await.unwrap_or(Err(ExportError::Shutdown))
        };

        match tokio::time::timeout(grace, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout(grace)),
        }
    }
}

impl<S: Signal> fmt::Debug for BatchProcessor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("exporter", &self.exporter)
            .field("config", &self.config)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

#[async_trait]
impl<S: Signal> Closeable for BatchProcessor<S> {
    fn describe(&self) -> String {
        format!(
            "{} batch processor ({} exporters)",
            S::KIND,
            self.exporter.len()
        )
    }

    async fn close(&self) -> ExportResult {
        self.shutdown().await
    }
}

struct Worker<S: Signal> {
    exporter: Arc<MultiExporter<S>>,
    config: BatchConfig,
    buffer: Vec<S>,
    buffered_items: usize,
}

impl<S: Signal> Worker<S> {
    async fn run(mut self, mut receiver: mpsc::Receiver<BatchMessage<S>>) {
        // interval_at panics on a zero period
        let delay = self.config.scheduled_delay.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + delay, delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(BatchMessage::Export(batch)) => {
                        self.buffered_items += batch.item_count();
                        self.buffer.push(batch);
                        if self.buffered_items >= self.config.max_export_batch_size {
                            let _ = self.export_buffer().await;
                        }
                    }
                    Some(BatchMessage::Flush(reply)) => {
                        let exported = self.export_buffer().await;
                        let flushed = self.exporter.flush().await;
                        let _ = reply.send(exported.and(flushed));
                    }
                    Some(BatchMessage::Shutdown(reply)) => {
                        let drained = self.drain(&mut receiver).await;
                        let _ = reply.send(drained);
                        break;
                    }
                    None => {
                        let _ = self.export_buffer().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let _ = self.export_buffer().await;
                }
            }
        }
    }

    /// Exports the buffer plus anything still queued behind the shutdown request.
    async fn drain(&mut self, receiver: &mut mpsc::Receiver<BatchMessage<S>>) -> ExportResult {
        receiver.close();
        while let Ok(message) = receiver.try_recv() {
            match message {
                BatchMessage::Export(batch) => {
                    self.buffered_items += batch.item_count();
                    self.buffer.push(batch);
                }
                BatchMessage::Flush(reply) | BatchMessage::Shutdown(reply) => {
                    let _ = reply.send(Err(ExportError::Shutdown));
                }
            }
        }
        self.export_buffer().await
    }

    async fn export_buffer(&mut self) -> ExportResult {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let items = std::mem::take(&mut self.buffered_items);
        let batch = S::concat(std::mem::take(&mut self.buffer));
        let timeout = self.config.export_timeout;

        let result = match tokio::time::timeout(timeout, self.exporter.export(&batch)).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout(timeout)),
        };

        match &result {
            Ok(()) => tracing::debug!(kind = %S::KIND, items, "Exported batch"),
            Err(e) => tracing::warn!(kind = %S::KIND, items, error = %e, "Batch export failed"),
        }
        result
    }
}
