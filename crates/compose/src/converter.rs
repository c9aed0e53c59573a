//! Docker Compose to appliance descriptor conversion.
//!
//! Only the first declared service is converted. Multi-service documents
//! are reduced to that service and the rest are logged as ignored.

use crate::descriptor::{
    ImageRef, NetworkConfig, NetworkKind, PortForward, RestartPolicy, TargetDescriptor,
    VolumeMount,
};
use crate::document::{
    split_port, split_volume, ComposeDocument, EnvironmentSpec, ServiceDefinition, ServiceSpec,
};
use indexmap::IndexMap;
use nasdeploy_common::{Error, Result};
use tracing::{debug, info, warn};

/// Convert Compose YAML text into a descriptor named `app_name`.
pub fn convert(compose_yaml: &str, app_name: &str) -> Result<TargetDescriptor> {
    info!(app = app_name, "Converting Docker Compose to TrueNAS format");
    let document = ComposeDocument::parse(compose_yaml)?;
    convert_document(&document, app_name)
}

/// Convert an already parsed document.
pub fn convert_document(document: &ComposeDocument, app_name: &str) -> Result<TargetDescriptor> {
    let services = document.services();
    let Some(first) = services.first() else {
        return Err(Error::EmptyInput);
    };

    if services.len() > 1 {
        let ignored: Vec<&str> = services[1..].iter().map(|s| s.name.as_str()).collect();
        warn!(
            service = %first.name,
            ignored = ?ignored,
            "Only the first service is converted"
        );
    }

    let spec = match &first.definition {
        ServiceDefinition::Spec(spec) => spec,
        ServiceDefinition::NotAMapping => {
            return Err(Error::InvalidService {
                service: first.name.clone(),
                reason: "must be an object".to_string(),
            })
        }
        ServiceDefinition::Invalid(cause) => {
            return Err(Error::InvalidService {
                service: first.name.clone(),
                reason: format!("invalid definition: {}", cause),
            })
        }
    };

    let image = spec.image.as_deref().ok_or_else(|| Error::MissingImage {
        service: first.name.clone(),
    })?;

    if let Some(restart) = spec.restart.as_deref() {
        if restart != "unless-stopped" {
            debug!(restart, "Restart policy replaced with unless-stopped");
        }
    }

    Ok(TargetDescriptor {
        name: app_name.to_string(),
        image: ImageRef::parse(image),
        network: convert_network(spec)?,
        storage: convert_storage(spec),
        environment: convert_environment(spec)?,
        restart_policy: RestartPolicy::UnlessStopped,
    })
}

fn parse_port(value: &str, entry: &str) -> Result<u16> {
    value.trim().parse::<u16>().map_err(|_| Error::InvalidPort {
        entry: entry.to_string(),
    })
}

/// Bridge networking plus one TCP forward per `host:container` entry.
fn convert_network(spec: &ServiceSpec) -> Result<NetworkConfig> {
    let mut port_forwards = Vec::new();

    for entry in spec.short_ports() {
        let Some(fields) = split_port(entry) else {
            debug!(entry, "Skipping container-only port");
            continue;
        };
        let (host, container) = fields.map_err(|_| Error::InvalidPort {
            entry: entry.to_string(),
        })?;
        let container = container.strip_suffix("/tcp").unwrap_or(container);

        port_forwards.push(PortForward::tcp(
            parse_port(host, entry)?,
            parse_port(container, entry)?,
        ));
    }

    Ok(NetworkConfig {
        kind: NetworkKind::Bridge,
        port_forwards: (!port_forwards.is_empty()).then_some(port_forwards),
    })
}

/// One storage entry per `source:target` volume, keyed by list position.
fn convert_storage(spec: &ServiceSpec) -> IndexMap<String, VolumeMount> {
    let mut storage = IndexMap::new();

    for (index, entry) in spec.volumes.iter().enumerate() {
        let Some(raw) = entry.as_short() else {
            continue;
        };
        let Some((source, target)) = split_volume(raw) else {
            debug!(entry = raw, "Skipping anonymous volume");
            continue;
        };
        let read_only = raw.contains(":ro");
        storage.insert(
            format!("volume_{}", index),
            VolumeMount::classify(source, target, read_only),
        );
    }

    storage
}

fn convert_environment(spec: &ServiceSpec) -> Result<IndexMap<String, serde_json::Value>> {
    let mut environment = IndexMap::new();

    match &spec.environment {
        Some(EnvironmentSpec::List(vars)) => {
            for var in vars {
                if let Some((key, value)) = var.split_once('=') {
                    environment.insert(key.to_string(), serde_json::Value::from(value));
                }
            }
        }
        Some(EnvironmentSpec::Map(vars)) => {
            for (key, value) in vars {
                environment.insert(key.clone(), serde_json::to_value(value)?);
            }
        }
        None => {}
    }

    Ok(environment)
}
