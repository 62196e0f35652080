//! Destination lookup: from an entry's `type` tag to an exporter holder.
//!
//! An [`ExporterRegistry`] starts out knowing the built-in destinations
//! (`console`, `logger`, `otlp` and `none`) and accepts further ones through
//! [`ExporterRegistry::register`]. Resolution is a pure lookup; no exporter is
//! constructed until a holder is materialised.

use super::{ConsoleExporter, LoggerExporter, OtlpEndpoint, OtlpExporter, SharedExporter};
use crate::config::{ExporterConfig, OtlpConfig, Protocol};
use crate::error::ConfigError;
use crate::holder::ExporterHolder;
use crate::signal::{Signal, SignalKind};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Where an entry sits and the settings shared by every entry.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Signal kind of the list being resolved.
    pub kind: SignalKind,
    /// Position of the entry in its list.
    pub index: usize,
    /// The shared `otlp` configuration section.
    pub otlp: &'a OtlpConfig,
}

impl ResolveContext<'_> {
    /// Deserialises an entry's parameters into the destination's typed form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParams`] naming the entry on any mismatch.
    pub fn params<T: DeserializeOwned>(&self, config: &ExporterConfig) -> Result<T, ConfigError> {
        serde_json::from_value(serde_json::Value::Object(config.params.clone())).map_err(|source| {
            ConfigError::InvalidParams {
                kind: self.kind,
                index: self.index,
                exporter_type: config.exporter_type.clone(),
                source,
            }
        })
    }
}

/// Turns one exporter entry into at most one holder.
pub trait DestinationFactory<S: Signal>: Send + Sync {
    /// Resolves `config`. `Ok(None)` means the entry contributes no exporter.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry's parameters are invalid for this destination.
    fn resolve(
        &self,
        config: &ExporterConfig,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ExporterHolder<S>>, ConfigError>;
}

/// Outcome of resolving one signal's exporter list.
#[derive(Debug)]
pub struct Resolved<S: Signal> {
    /// Holders in configuration order.
    pub holders: Vec<ExporterHolder<S>>,
    /// Entries that resolved to no holder.
    pub filtered: usize,
}

/// Table of destination factories for one signal kind.
pub struct ExporterRegistry<S: Signal> {
    factories: HashMap<String, Arc<dyn DestinationFactory<S>>>,
}

impl<S: Signal> ExporterRegistry<S> {
    /// Creates a registry knowing only the built-in destinations.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry
            .register("console", ConsoleDestination)
            .register("logger", LoggerDestination)
            .register("otlp", OtlpDestination)
            .register("none", NoneDestination);
        registry
    }

    /// Adds or replaces the factory for `exporter_type`.
    pub fn register(
        &mut self,
        exporter_type: impl Into<String>,
        factory: impl DestinationFactory<S> + 'static,
    ) -> &mut Self {
        self.factories
            .insert(exporter_type.into(), Arc::new(factory));
        self
    }

    /// Returns whether a factory is registered for `exporter_type`.
    pub fn contains(&self, exporter_type: &str) -> bool {
        self.factories.contains_key(exporter_type)
    }

    /// Resolves an exporter list into holders.
    ///
    /// An absent or empty list resolves as a single `console` entry.
    ///
    /// # Errors
    ///
    /// Fails on the first entry with an unknown type or invalid parameters.
    pub fn resolve(
        &self,
        configs: Option<&[ExporterConfig]>,
        otlp: &OtlpConfig,
    ) -> Result<Resolved<S>, ConfigError> {
        let default = [ExporterConfig::console()];
        let configs: &[ExporterConfig] = match configs {
            Some(configs) if !configs.is_empty() => configs,
            _ => {
                tracing::debug!(kind = %S::KIND, "No exporters configured, using console");
                &default
            }
        };

        let mut holders = Vec::with_capacity(configs.len());
        let mut filtered = 0;

        for (index, config) in configs.iter().enumerate() {
            let ctx = ResolveContext {
                kind: S::KIND,
                index,
                otlp,
            };

            let factory = self.factories.get(&config.exporter_type).ok_or_else(|| {
                ConfigError::UnknownExporterType {
                    kind: S::KIND,
                    index,
                    exporter_type: config.exporter_type.clone(),
                }
            })?;

            match factory.resolve(config, &ctx).map_err(|e| locate(e, &ctx, config))? {
                Some(holder) => holders.push(holder),
                None => {
                    tracing::debug!(kind = %S::KIND, index, exporter_type = %config.exporter_type, "Exporter entry filtered out");
                    filtered += 1;
                }
            }
        }

        Ok(Resolved { holders, filtered })
    }
}

impl<S: Signal> Default for ExporterRegistry<S> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl<S: Signal> fmt::Debug for ExporterRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("ExporterRegistry")
            .field("signal", &S::KIND)
            .field("types", &types)
            .finish()
    }
}

/// Attaches the entry's position to errors that do not carry it already.
fn locate(err: ConfigError, ctx: &ResolveContext<'_>, config: &ExporterConfig) -> ConfigError {
    match err {
        located @ (ConfigError::InvalidParams { .. }
        | ConfigError::InvalidEntry { .. }
        | ConfigError::UnknownExporterType { .. }) => located,
        other => ConfigError::InvalidEntry {
            kind: ctx.kind,
            index: ctx.index,
            exporter_type: config.exporter_type.clone(),
            source: Box::new(other),
        },
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConsoleParams {
    pretty: bool,
}

struct ConsoleDestination;

impl<S: Signal> DestinationFactory<S> for ConsoleDestination {
    fn resolve(
        &self,
        config: &ExporterConfig,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ExporterHolder<S>>, ConfigError> {
        let params: ConsoleParams = ctx.params(config)?;
        Ok(Some(ExporterHolder::new("console", false, move || {
            Ok(Arc::new(ConsoleExporter::<S>::stdout().pretty(params.pretty)) as SharedExporter<S>)
        })))
    }
}

struct LoggerDestination;

impl<S: Signal> DestinationFactory<S> for LoggerDestination {
    fn resolve(
        &self,
        config: &ExporterConfig,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ExporterHolder<S>>, ConfigError> {
        ctx.params::<NoParams>(config)?;
        Ok(Some(ExporterHolder::new("logger", false, || {
            Ok(Arc::new(LoggerExporter::<S>::new()) as SharedExporter<S>)
        })))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

struct OtlpDestination;

impl<S: Signal> DestinationFactory<S> for OtlpDestination {
    fn resolve(
        &self,
        config: &ExporterConfig,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<ExporterHolder<S>>, ConfigError> {
        let params: OtlpConfig = ctx.params(config)?;
        let endpoint = OtlpEndpoint::resolve(&params.merged_over(ctx.otlp))?;
        if endpoint.protocol() == Protocol::Grpc {
            return Err(ConfigError::GrpcUnavailable {
                kind: ctx.kind,
                endpoint: endpoint.base_url().to_string(),
            });
        }
        Ok(Some(ExporterHolder::new("otlp", true, move || {
            Ok(Arc::new(OtlpExporter::<S>::new(endpoint)?) as SharedExporter<S>)
        })))
    }
}

struct NoneDestination;

impl<S: Signal> DestinationFactory<S> for NoneDestination {
    fn resolve(
        &self,
        _config: &ExporterConfig,
        _ctx: &ResolveContext<'_>,
    ) -> Result<Option<ExporterHolder<S>>, ConfigError> {
        Ok(None)
    }
}
