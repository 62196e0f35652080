//! Configuration loading and management.
//!
//! This module provides layered configuration for the pipelines using figment.
//! Configuration is loaded from (in order of priority):
//! 1. Default values (compiled in)
//! 2. Config file: `otel-pipeline.toml` (optional)
//! 3. Standard OpenTelemetry environment variables (`OTEL_*`)
//! 4. Pipeline-specific environment variables (`OTEL_PIPELINE_*`)
//!
//! # Supported Standard Environment Variables
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `OTEL_SERVICE_NAME` | `resource.service_name` | Service name |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `otlp.url` | OTLP base URL |
//! | `OTEL_EXPORTER_OTLP_PROTOCOL` | `otlp.protocol` | `http/protobuf` or `grpc` |
//! | `OTEL_EXPORTER_OTLP_HEADERS` | `otlp.headers` | Comma-separated key=value pairs |
//! | `OTEL_EXPORTER_OTLP_COMPRESSION` | `otlp.compression` | `gzip` or `none` |
//! | `OTEL_EXPORTER_OTLP_TIMEOUT` | `otlp.timeout` | Request timeout (ms) |
//! | `OTEL_TRACES_EXPORTER` | `traces.exporters` | Comma-separated exporter types |
//! | `OTEL_METRICS_EXPORTER` | `metrics.exporters` | Comma-separated exporter types |
//! | `OTEL_LOGS_EXPORTER` | `logs.exporters` | Comma-separated exporter types |
//! | `OTEL_METRIC_EXPORT_INTERVAL` | `metrics.batch.scheduled_delay` | Export interval (ms) |
//! | `OTEL_BSP_*` | `traces.batch.*` | Span batch settings |
//! | `OTEL_BLRP_*` | `logs.batch.*` | Log record batch settings |
//!
//! Pipeline-specific variables use `__` as the path separator, for example
//! `OTEL_PIPELINE_OTLP__URL` or `OTEL_PIPELINE_TRACES__BATCH__MAX_QUEUE_SIZE`.

use crate::error::ConfigError;
use crate::signal::SignalKind;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "otel-pipeline.toml";
const ENV_PREFIX: &str = "OTEL_PIPELINE_";

/// OTLP transport protocol.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Protocol {
    /// Protobuf over HTTP (port 4318).
    #[default]
    #[serde(rename = "http/protobuf")]
    HttpProtobuf,
    /// gRPC (port 4317).
    #[serde(rename = "grpc")]
    Grpc,
}

impl Protocol {
    /// Returns the canonical configuration value for this protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::HttpProtobuf => "http/protobuf",
            Protocol::Grpc => "grpc",
        }
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http/protobuf" => Ok(Protocol::HttpProtobuf),
            "grpc" => Ok(Protocol::Grpc),
            other => Err(ConfigError::UnsupportedProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression algorithm for OTLP export.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// Gzip compression.
    Gzip,
}

/// Main configuration struct for the pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Resource attached to every batch.
    pub resource: ResourceConfig,
    /// OTLP settings shared by every `otlp` exporter entry.
    pub otlp: OtlpConfig,
    /// Trace pipeline.
    pub traces: SignalConfig,
    /// Metric pipeline.
    pub metrics: SignalConfig,
    /// Log pipeline.
    pub logs: SignalConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resource: ResourceConfig::default(),
            otlp: OtlpConfig::default(),
            traces: SignalConfig::for_kind(SignalKind::Traces),
            metrics: SignalConfig::for_kind(SignalKind::Metrics),
            logs: SignalConfig::for_kind(SignalKind::Logs),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from all sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. Config file at `otel-pipeline.toml` (if it exists)
    /// 3. Standard `OTEL_*` environment variables
    /// 4. Environment variables with `OTEL_PIPELINE_` prefix
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a custom config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(standard_otel_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(figment.extract()?)
    }

    /// Creates a new config builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Returns the pipeline section for `kind`.
    pub fn signal(&self, kind: SignalKind) -> &SignalConfig {
        match kind {
            SignalKind::Traces => &self.traces,
            SignalKind::Metrics => &self.metrics,
            SignalKind::Logs => &self.logs,
        }
    }

    fn signal_mut(&mut self, kind: SignalKind) -> &mut SignalConfig {
        match kind {
            SignalKind::Traces => &mut self.traces,
            SignalKind::Metrics => &mut self.metrics,
            SignalKind::Logs => &mut self.logs,
        }
    }
}

/// Resource configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// `service.name` attribute; SDK detection is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Extra resource attributes.
    pub attributes: HashMap<String, String>,
}

/// Configuration for one signal kind's pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Ordered exporter entries. Absent or empty means a single console exporter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exporters: Option<Vec<ExporterConfig>>,
    /// Settings for the shared batch processor.
    pub batch: BatchConfig,
}

impl SignalConfig {
    /// Returns the default section for `kind`.
    pub fn for_kind(kind: SignalKind) -> Self {
        Self {
            exporters: None,
            batch: BatchConfig::for_kind(kind),
        }
    }
}

/// One export destination: a `type` tag plus destination-specific parameters.
///
/// The signal kind is implied by the list the entry appears in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Destination type tag, e.g. `console`, `logger`, `otlp` or `none`.
    #[serde(rename = "type")]
    pub exporter_type: String,
    /// Parameters interpreted by the destination factory for `exporter_type`.
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ExporterConfig {
    /// Creates an entry of the given type with no parameters.
    pub fn new(exporter_type: impl Into<String>) -> Self {
        Self {
            exporter_type: exporter_type.into(),
            params: serde_json::Map::new(),
        }
    }

    /// Creates a `console` entry.
    pub fn console() -> Self {
        Self::new("console")
    }

    /// Creates a `none` entry.
    pub fn none() -> Self {
        Self::new("none")
    }

    /// Creates an `otlp` entry posting to `url`.
    pub fn otlp(url: impl Into<String>) -> Self {
        Self::new("otlp").with_param("url", url.into())
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// OTLP connection settings.
///
/// Used both for the shared `otlp` section and for the parameters of an
/// individual `otlp` exporter entry, which are layered over the shared section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OtlpConfig {
    /// Base URL; the signal path is appended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `http/protobuf` or `grpc`. Validated when the endpoint is resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Additional headers to send with requests.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Request timeout in milliseconds.
    #[serde(with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Compression algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
}

impl OtlpConfig {
    /// Returns these settings with unset fields taken from `base`.
    ///
    /// Headers are merged, with entries in `self` winning.
    pub fn merged_over(&self, base: &OtlpConfig) -> OtlpConfig {
        let mut headers = base.headers.clone();
        headers.extend(self.headers.clone());

        OtlpConfig {
            url: self.url.clone().or_else(|| base.url.clone()),
            protocol: self.protocol.clone().or_else(|| base.protocol.clone()),
            headers,
            timeout: self.timeout.or(base.timeout),
            compression: self.compression.or(base.compression),
        }
    }
}

/// Batch processor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of batches waiting in the queue.
    pub max_queue_size: usize,
    /// Buffered record count that triggers an export.
    pub max_export_batch_size: usize,
    /// Interval between scheduled exports, in milliseconds.
    #[serde(with = "duration_ms")]
    pub scheduled_delay: Duration,
    /// Deadline for one export, and the grace period at shutdown, in milliseconds.
    #[serde(with = "duration_ms")]
    pub export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay: Duration::from_millis(5000),
            export_timeout: Duration::from_millis(30000),
        }
    }
}

impl BatchConfig {
    /// Returns the default settings for `kind`.
    ///
    /// Logs are scheduled every second and metrics every minute, following the
    /// OpenTelemetry SDK defaults.
    pub fn for_kind(kind: SignalKind) -> Self {
        let scheduled_delay = match kind {
            SignalKind::Traces => Duration::from_millis(5000),
            SignalKind::Metrics => Duration::from_secs(60),
            SignalKind::Logs => Duration::from_millis(1000),
        };
        Self {
            scheduled_delay,
            ..Self::default()
        }
    }

    /// Checks that the settings can drive a batch processor for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBatch`] for a zero `scheduled_delay` or
    /// `export_timeout`.
    pub fn validate(&self, kind: SignalKind) -> Result<(), ConfigError> {
        let zero = [
            ("scheduled_delay", self.scheduled_delay),
            ("export_timeout", self.export_timeout),
        ]
        .into_iter()
        .find(|(_, value)| value.is_zero());

        match zero {
            Some((setting, _)) => Err(ConfigError::InvalidBatch { kind, setting }),
            None => Ok(()),
        }
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Sets the service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.resource.service_name = Some(name.into());
        self
    }

    /// Adds a resource attribute.
    pub fn resource_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .resource
            .attributes
            .insert(key.into(), value.into());
        self
    }

    /// Sets the shared OTLP base URL.
    pub fn otlp_url(mut self, url: impl Into<String>) -> Self {
        self.config.otlp.url = Some(url.into());
        self
    }

    /// Sets the shared OTLP protocol.
    pub fn otlp_protocol(mut self, protocol: Protocol) -> Self {
        self.config.otlp.protocol = Some(protocol.as_str().to_string());
        self
    }

    /// Sets the shared OTLP request timeout.
    pub fn otlp_timeout(mut self, timeout: Duration) -> Self {
        self.config.otlp.timeout = Some(timeout);
        self
    }

    /// Sets the exporter entries for `kind`.
    pub fn exporters(mut self, kind: SignalKind, exporters: Vec<ExporterConfig>) -> Self {
        self.config.signal_mut(kind).exporters = Some(exporters);
        self
    }

    /// Sets the batch settings for `kind`.
    pub fn batch(mut self, kind: SignalKind, batch: BatchConfig) -> Self {
        self.config.signal_mut(kind).batch = batch;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial batch config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialBatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_queue_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_export_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduled_delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    export_timeout: Option<u64>,
}

impl PartialBatchConfig {
    fn from_env(prefix: &str) -> Self {
        Self {
            max_queue_size: env_number(&format!("{prefix}_MAX_QUEUE_SIZE")),
            max_export_batch_size: env_number(&format!("{prefix}_MAX_EXPORT_BATCH_SIZE")),
            scheduled_delay: env_number(&format!("{prefix}_SCHEDULE_DELAY")),
            export_timeout: env_number(&format!("{prefix}_EXPORT_TIMEOUT")),
        }
    }

    fn is_empty(&self) -> bool {
        self.max_queue_size.is_none()
            && self.max_export_batch_size.is_none()
            && self.scheduled_delay.is_none()
            && self.export_timeout.is_none()
    }
}

/// Partial signal config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialSignalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    exporters: Option<Vec<ExporterConfig>>,
    #[serde(skip_serializing_if = "PartialBatchConfig::is_empty")]
    batch: PartialBatchConfig,
}

impl PartialSignalConfig {
    fn is_empty(&self) -> bool {
        self.exporters.is_none() && self.batch.is_empty()
    }
}

/// Partial resource config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialResourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
}

/// Partial config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "is_partial_resource_empty")]
    resource: PartialResourceConfig,
    #[serde(skip_serializing_if = "is_partial_otlp_empty")]
    otlp: OtlpConfig,
    #[serde(skip_serializing_if = "PartialSignalConfig::is_empty")]
    traces: PartialSignalConfig,
    #[serde(skip_serializing_if = "PartialSignalConfig::is_empty")]
    metrics: PartialSignalConfig,
    #[serde(skip_serializing_if = "PartialSignalConfig::is_empty")]
    logs: PartialSignalConfig,
}

fn is_partial_resource_empty(config: &PartialResourceConfig) -> bool {
    config.service_name.is_none()
}

fn is_partial_otlp_empty(config: &OtlpConfig) -> bool {
    *config == OtlpConfig::default()
}

fn standard_otel_env() -> Serialized<PartialConfig> {
    let mut config = PartialConfig::default();

    if let Ok(service_name) = std::env::var("OTEL_SERVICE_NAME") {
        config.resource.service_name = Some(service_name);
    }

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.otlp.url = Some(endpoint);
    }

    if let Ok(protocol) = std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL") {
        config.otlp.protocol = Some(protocol.trim().to_lowercase());
    }

    if let Ok(compression) = std::env::var("OTEL_EXPORTER_OTLP_COMPRESSION") {
        config.otlp.compression = match compression.to_lowercase().as_str() {
            "gzip" => Some(Compression::Gzip),
            "none" => Some(Compression::None),
            other => {
                tracing::warn!(value = other, "Ignoring unknown OTEL_EXPORTER_OTLP_COMPRESSION");
                None
            }
        };
    }

    if let Some(timeout) = env_number::<u64>("OTEL_EXPORTER_OTLP_TIMEOUT") {
        config.otlp.timeout = Some(Duration::from_millis(timeout));
    }

    if let Ok(headers_str) = std::env::var("OTEL_EXPORTER_OTLP_HEADERS") {
        for pair in headers_str.split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                config
                    .otlp
                    .headers
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    config.traces.exporters = env_exporter_list("OTEL_TRACES_EXPORTER");
    config.metrics.exporters = env_exporter_list("OTEL_METRICS_EXPORTER");
    config.logs.exporters = env_exporter_list("OTEL_LOGS_EXPORTER");

    config.traces.batch = PartialBatchConfig::from_env("OTEL_BSP");
    config.logs.batch = PartialBatchConfig::from_env("OTEL_BLRP");
    config.metrics.batch.scheduled_delay = env_number("OTEL_METRIC_EXPORT_INTERVAL");

    Serialized::defaults(config)
}

fn env_exporter_list(var: &str) -> Option<Vec<ExporterConfig>> {
    let value = std::env::var(var).ok()?;
    let exporters: Vec<ExporterConfig> = value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ExporterConfig::new)
        .collect();
    (!exporters.is_empty()).then_some(exporters)
}

fn env_number<T: FromStr>(var: &str) -> Option<T> {
    let value = std::env::var(var).ok()?;
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var, value = %value, "Ignoring non-numeric environment variable");
            None
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
