//! Signal kinds and the OTLP request types that carry their batches.
//!
//! Each signal kind (traces, metrics, logs) is carried by the corresponding
//! OTLP collector request. The [`Signal`] trait gives the pipeline the few
//! operations it needs on those requests without caring about their contents.

use opentelemetry_proto::tonic::collector::{
    logs::v1::ExportLogsServiceRequest, metrics::v1::ExportMetricsServiceRequest,
    trace::v1::ExportTraceServiceRequest,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three telemetry record categories.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Trace spans.
    Traces,
    /// Metric data.
    Metrics,
    /// Log records.
    Logs,
}

impl SignalKind {
    /// Returns the lowercase name of this signal kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Traces => "traces",
            SignalKind::Metrics => "metrics",
            SignalKind::Logs => "logs",
        }
    }

    /// Returns the OTLP/HTTP path for this signal, relative to the base URL.
    pub fn http_path(&self) -> &'static str {
        match self {
            SignalKind::Traces => "v1/traces",
            SignalKind::Metrics => "v1/metrics",
            SignalKind::Logs => "v1/logs",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch of telemetry records of one signal kind.
pub trait Signal: prost::Message + fmt::Debug + Serialize + Default + Clone + 'static {
    /// The signal kind carried by this batch type.
    const KIND: SignalKind;

    /// Returns the number of records (spans, metrics, log records) in the batch.
    fn item_count(&self) -> usize;

    /// Concatenates several batches into one, preserving order.
    fn concat(batches: Vec<Self>) -> Self;

    /// Sets `resource` on every resource entry that does not carry one yet.
    fn fill_resource(&mut self, resource: &ProtoResource);
}

impl Signal for ExportTraceServiceRequest {
    const KIND: SignalKind = SignalKind::Traces;

    fn item_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| &rs.scope_spans)
            .map(|ss| ss.spans.len())
            .sum()
    }

    fn concat(batches: Vec<Self>) -> Self {
        ExportTraceServiceRequest {
            resource_spans: batches
                .into_iter()
                .flat_map(|r| r.resource_spans)
                .collect(),
        }
    }

    fn fill_resource(&mut self, resource: &ProtoResource) {
        for rs in &mut self.resource_spans {
            if rs.resource.is_none() {
                rs.resource = Some(resource.clone());
            }
        }
    }
}

impl Signal for ExportMetricsServiceRequest {
    const KIND: SignalKind = SignalKind::Metrics;

    fn item_count(&self) -> usize {
        self.resource_metrics
            .iter()
            .flat_map(|rm| &rm.scope_metrics)
            .map(|sm| sm.metrics.len())
            .sum()
    }

    fn concat(batches: Vec<Self>) -> Self {
        ExportMetricsServiceRequest {
            resource_metrics: batches
                .into_iter()
                .flat_map(|r| r.resource_metrics)
                .collect(),
        }
    }

    fn fill_resource(&mut self, resource: &ProtoResource) {
        for rm in &mut self.resource_metrics {
            if rm.resource.is_none() {
                rm.resource = Some(resource.clone());
            }
        }
    }
}

impl Signal for ExportLogsServiceRequest {
    const KIND: SignalKind = SignalKind::Logs;

    fn item_count(&self) -> usize {
        self.resource_logs
            .iter()
            .flat_map(|rl| &rl.scope_logs)
            .map(|sl| sl.log_records.len())
            .sum()
    }

    fn concat(batches: Vec<Self>) -> Self {
        ExportLogsServiceRequest {
            resource_logs: batches.into_iter().flat_map(|r| r.resource_logs).collect(),
        }
    }

    fn fill_resource(&mut self, resource: &ProtoResource) {
        for rl in &mut self.resource_logs {
            if rl.resource.is_none() {
                rl.resource = Some(resource.clone());
            }
        }
    }
}
