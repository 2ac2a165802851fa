//! Resource describing this service instance
//!
//! Attached to every span, metric point and log record.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

/// Identity of the running service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Build the resource from the service identity
///
/// Empty attributes are left out instead of being exported as blanks. The
/// SDK's default detectors (SDK info, `OTEL_RESOURCE_ATTRIBUTES`) are merged in.
pub fn build_resource(identity: &ServiceIdentity) -> Resource {
    let attributes = [
        ("service.name", &identity.name),
        ("service.version", &identity.version),
        ("service.instance.id", &identity.instance_id),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(key, value)| KeyValue::new(key, value.clone()));

    Resource::builder().with_attributes(attributes).build()
}
