//! The resource every pipeline attaches to its batches.
//!
//! A [`ResourceDescriptor`] is built once from configuration on top of the
//! SDK's resource detection (`OTEL_SERVICE_NAME`, `OTEL_RESOURCE_ATTRIBUTES`,
//! telemetry SDK attributes) and handed unchanged to every provider.

use crate::config::ResourceConfig;
use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, KeyValue as ProtoKeyValue, any_value,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;

/// Resource shared by the trace, metric and log providers.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    resource: Resource,
    proto: ProtoResource,
}

impl ResourceDescriptor {
    /// Wraps an SDK resource.
    pub fn new(resource: Resource) -> Self {
        let proto = to_proto_resource(&resource);
        Self { resource, proto }
    }

    /// Builds the resource from configuration over SDK detection.
    ///
    /// Configured attributes and service name override detected values.
    pub fn from_config(config: &ResourceConfig) -> Self {
        let mut builder = Resource::builder();

        if let Some(name) = &config.service_name {
            builder = builder.with_service_name(name.clone());
        }

        let mut attributes: Vec<_> = config.attributes.iter().collect();
        attributes.sort();
        builder = builder.with_attributes(
            attributes
                .into_iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
        );

        Self::new(builder.build())
    }

    /// Returns the SDK resource.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Returns the resource in its OTLP form.
    pub fn to_proto(&self) -> &ProtoResource {
        &self.proto
    }

    /// Returns the `service.name` attribute, if any.
    pub fn service_name(&self) -> Option<String> {
        self.resource
            .get(&Key::from_static_str(SERVICE_NAME))
            .map(|v| v.to_string())
    }
}

impl Default for ResourceDescriptor {
    fn default() -> Self {
        Self::new(Resource::builder().build())
    }
}

impl From<Resource> for ResourceDescriptor {
    fn from(resource: Resource) -> Self {
        Self::new(resource)
    }
}

/// Converts an SDK resource into the OTLP resource message, keys sorted.
fn to_proto_resource(resource: &Resource) -> ProtoResource {
    let mut attributes: Vec<ProtoKeyValue> = resource
        .iter()
        .map(|(key, value)| ProtoKeyValue {
            key: key.as_str().to_string(),
            value: Some(to_any_value(value)),
            ..Default::default()
        })
        .collect();
    attributes.sort_by(|a, b| a.key.cmp(&b.key));

    ProtoResource {
        attributes,
        ..Default::default()
    }
}

fn to_any_value(value: &Value) -> AnyValue {
    let value = match value {
        Value::Bool(b) => any_value::Value::BoolValue(*b),
        Value::I64(i) => any_value::Value::IntValue(*i),
        Value::F64(f) => any_value::Value::DoubleValue(*f),
        Value::String(s) => any_value::Value::StringValue(s.as_str().to_string()),
        other => any_value::Value::StringValue(other.to_string()),
    };
    AnyValue { value: Some(value) }
}
