//! In-process OTLP/HTTP sink for integration tests.
//!
//! The sink records every request it receives and answers with queued status
//! codes first, then `200 OK`.

#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use parking_lot::Mutex;
use prost::Message;
use std::collections::VecDeque;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// One request as the sink saw it.
#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Received {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the body with any gzip content encoding removed.
    pub fn payload(&self) -> Vec<u8> {
        if self.header("content-encoding") == Some("gzip") {
            let mut decoded = Vec::new();
            GzDecoder::new(self.body.as_slice())
                .read_to_end(&mut decoded)
                .expect("gzip body should decode");
            decoded
        } else {
            self.body.clone()
        }
    }

    pub fn decode<M: Message + Default>(&self) -> M {
        M::decode(self.payload().as_slice()).expect("body should be a valid OTLP message")
    }
}

#[derive(Clone, Default)]
struct SinkState {
    received: Arc<Mutex<Vec<Received>>>,
    statuses: Arc<Mutex<VecDeque<u16>>>,
}

/// A running OTLP/HTTP sink bound to an ephemeral local port.
pub struct OtlpSink {
    addr: SocketAddr,
    state: SinkState,
    server: JoinHandle<()>,
}

impl OtlpSink {
    pub async fn start() -> Self {
        let state = SinkState::default();
        let app = Router::new().fallback(receive).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind sink");
        let addr = listener.local_addr().expect("sink has no local address");

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("sink server failed");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL to configure exporters with.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answers the next requests with `statuses`, in order.
    pub fn respond_with(&self, statuses: &[u16]) {
        self.state.statuses.lock().extend(statuses.iter().copied());
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().clone()
    }

    pub fn received_on(&self, path: &str) -> Vec<Received> {
        self.received()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Span names across every trace request received, in arrival order.
    pub fn span_names(&self) -> Vec<String> {
        self.received_on("/v1/traces")
            .iter()
            .flat_map(|r| {
                r.decode::<ExportTraceServiceRequest>()
                    .resource_spans
                    .into_iter()
                    .flat_map(|rs| rs.scope_spans)
                    .flat_map(|ss| ss.spans)
                    .map(|s| s.name)
            })
            .collect()
    }

    /// Polls until at least `count` requests arrived or `timeout` elapses.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Result<(), String> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.state.received.lock().len() >= count {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(format!(
            "sink at {} received {} of {count} requests within {timeout:?}",
            self.addr,
            self.state.received.lock().len()
        ))
    }
}

impl Drop for OtlpSink {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn receive(
    State(state): State<SinkState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.received.lock().push(Received {
        path: uri.path().to_string(),
        headers,
        body: body.to_vec(),
    });

    let status = state.statuses.lock().pop_front().unwrap_or(200);
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Builds a trace request with one span per name.
pub fn spans(names: &[&str]) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                spans: names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| Span {
                        name: (*name).to_string(),
                        trace_id: vec![7; 16],
                        span_id: vec![i as u8 + 1; 8],
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}
