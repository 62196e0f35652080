//! Workspace-level integration harness for the OpenTelemetry pipeline.
//!
//! This is a virtual package. The functionality lives in
//! `crates/opentelemetry-pipeline`; `tests/integration_harness.rs` drives all
//! three pipelines from a config file against local OTLP/HTTP collectors.
