//! OTLP/HTTP exporter with retry.
//!
//! This module provides the remote destination: each batch is encoded with
//! `prost` and posted to `<base url>/v1/<signal>`. Transient failures are
//! retried with exponential backoff.

use super::{ExportError, ExportResult, Exporter};
use crate::config::{Compression, OtlpConfig, Protocol};
use crate::error::ConfigError;
use crate::signal::{Signal, SignalKind};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderName, HeaderValue};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

const DEFAULT_HTTP_URL: &str = "http://localhost:4318";
const DEFAULT_GRPC_URL: &str = "http://localhost:4317";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A fully resolved OTLP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpEndpoint {
    base_url: String,
    protocol: Protocol,
    headers: HashMap<String, String>,
    timeout: Duration,
    compression: Compression,
}

impl OtlpEndpoint {
    /// Resolves an endpoint from configuration, applying protocol defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the protocol is unsupported, the URL is invalid, or
    /// a header name or value cannot be sent over HTTP.
    pub fn resolve(config: &OtlpConfig) -> Result<Self, ConfigError> {
        let protocol = match config.protocol.as_deref() {
            Some(protocol) => protocol.parse::<Protocol>()?,
            None => Protocol::default(),
        };

        let url = config.url.clone().unwrap_or_else(|| {
            match protocol {
                Protocol::Grpc => DEFAULT_GRPC_URL,
                Protocol::HttpProtobuf => DEFAULT_HTTP_URL,
            }
            .to_string()
        });

        reqwest::Url::parse(&url).map_err(|e| ConfigError::InvalidEndpoint {
            url: url.clone(),
            source: Box::new(e),
        })?;

        for (name, value) in &config.headers {
            validate_header(name, value)?;
        }

        let base_url = if url.ends_with('/') {
            url
        } else {
            format!("{url}/")
        };

        Ok(Self {
            base_url,
            protocol,
            headers: config.headers.clone(),
            timeout: config.timeout.unwrap_or(DEFAULT_TIMEOUT),
            compression: config.compression.unwrap_or_default(),
        })
    }

    /// Returns the base URL, always ending with `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the URL batches of `kind` are posted to.
    pub fn signal_url(&self, kind: SignalKind) -> String {
        format!("{}{}", self.base_url, kind.http_path())
    }

    /// Returns the resolved protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the extra request headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the request compression.
    pub fn compression(&self) -> Compression {
        self.compression
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |source: Box<dyn std::error::Error + Send + Sync>| ConfigError::InvalidHeader {
        name: name.to_string(),
        source,
    };
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(Box::new(e)))?;
    HeaderValue::from_str(value).map_err(|e| invalid(Box::new(e)))?;
    Ok(())
}

/// OTLP exporter for sending batches of one signal type to a remote endpoint.
pub struct OtlpExporter<S: Signal> {
    endpoint: OtlpEndpoint,
    url: String,
    client: Client,
    is_shutdown: AtomicBool,
    _signal: PhantomData<fn() -> S>,
}

impl<S: Signal> OtlpExporter<S> {
    /// Creates a new OTLP exporter for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint uses gRPC, which has no transport in
    /// this build, or if the HTTP client cannot be created.
    pub fn new(endpoint: OtlpEndpoint) -> Result<Self, ConfigError> {
        let url = endpoint.signal_url(S::KIND);

        if endpoint.protocol == Protocol::Grpc {
            return Err(ConfigError::GrpcUnavailable {
                kind: S::KIND,
                endpoint: endpoint.base_url.clone(),
            });
        }

        let client = Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            endpoint,
            url,
            client,
            is_shutdown: AtomicBool::new(false),
            _signal: PhantomData,
        })
    }

    /// Returns the URL this exporter posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the resolved endpoint.
    pub fn endpoint(&self) -> &OtlpEndpoint {
        &self.endpoint
    }

    async fn export_with_retry(&self, batch: &S) -> ExportResult {
        let body = self.encode_request(batch)?;
        let mut last_error = None;
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 0..MAX_RETRIES {
            match self.try_export(body.clone()).await {
                Ok(()) => return Ok(()),
                Err(ExportError::Status { status, ref body }) if !Self::is_retryable(status) => {
                    tracing::error!(status, url = %self.url, "Received non-retryable status code, not retrying");
                    return Err(ExportError::status(status, body.clone()));
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        url = %self.url,
                        error = %e,
                        "Export attempt failed"
                    );
                    last_error = Some(e);

                    if attempt + 1 < MAX_RETRIES {
                        if self.is_shutdown.load(Ordering::Acquire) {
                            break;
                        }
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ExportError::Shutdown))
    }

    /// Determines if a status code is retryable per OTLP specification.
    ///
    /// Retryable: 408 (Request Timeout), 429 (Too Many Requests), 5xx (Server Errors)
    /// Non-retryable: 400, 401, 403, 404, and other 4xx client errors
    fn is_retryable(status: u16) -> bool {
        matches!(status, 408 | 429) || (500..600).contains(&status)
    }

    async fn try_export(&self, body: Vec<u8>) -> ExportResult {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/x-protobuf")
            .body(body);

        for (key, value) in &self.endpoint.headers {
            request = request.header(key, value);
        }

        if self.endpoint.compression == Compression::Gzip {
            request = request.header("Content-Encoding", "gzip");
        }

        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ExportError::status(status.as_u16(), body))
        }
    }

    fn encode_request(&self, request: &S) -> Result<Vec<u8>, ExportError> {
        let mut buf = Vec::with_capacity(request.encoded_len());
        request.encode(&mut buf).map_err(ExportError::encode)?;

        if self.endpoint.compression == Compression::Gzip {
            use flate2::Compression as GzCompression;
            use flate2::write::GzEncoder;

            let mut encoder = GzEncoder::new(Vec::new(), GzCompression::default());
            encoder.write_all(&buf).map_err(ExportError::encode)?;
            encoder.finish().map_err(ExportError::encode)
        } else {
            Ok(buf)
        }
    }
}

impl<S: Signal> fmt::Debug for OtlpExporter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtlpExporter")
            .field("signal", &S::KIND)
            .field("url", &self.url)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: Signal> Exporter<S> for OtlpExporter<S> {
    fn name(&self) -> &str {
        "otlp"
    }

    async fn export(&self, batch: &S) -> ExportResult {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExportError::Shutdown);
        }

        self.export_with_retry(batch).await
    }

    async fn shutdown(&self) -> ExportResult {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            tracing::debug!(url = %self.url, "OTLP exporter shut down more than once");
        }
        Ok(())
    }
}
