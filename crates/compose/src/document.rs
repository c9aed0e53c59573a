//! Parsed view of a Docker Compose document.
//!
//! Only `version`, `services`, `networks` and the handful of per-service
//! fields the appliance understands are interpreted. Everything else is
//! carried along in the raw YAML tree and ignored.

use indexmap::IndexMap;
use nasdeploy_common::{Error, Result};
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};

/// A Compose document that parsed as YAML.
#[derive(Debug, Clone)]
pub struct ComposeDocument {
    root: Value,
}

/// One entry of the `services` mapping, in declared order.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub name: String,
    pub definition: ServiceDefinition,
}

/// How a service body was understood.
#[derive(Debug, Clone)]
pub enum ServiceDefinition {
    Spec(Box<ServiceSpec>),
    /// The body is a scalar or a list rather than a mapping.
    NotAMapping,
    /// The body is a mapping but a known field has the wrong type.
    Invalid(String),
}

/// The per-service fields that matter for deployment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    pub image: Option<String>,
    pub build: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub ports: Vec<PortEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub volumes: Vec<VolumeEntry>,
    pub environment: Option<EnvironmentSpec>,
    #[serde(deserialize_with = "null_as_default")]
    pub cap_add: Vec<String>,
    pub network_mode: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub privileged: bool,
    pub restart: Option<String>,
    pub user: Option<Value>,
}

impl ServiceSpec {
    pub fn has_image_or_build(&self) -> bool {
        self.image.is_some() || self.build.is_some()
    }

    /// Short-syntax port strings, skipping numbers and long-syntax entries.
    pub fn short_ports(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().filter_map(PortEntry::as_short)
    }
}

/// An element of `ports`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    Short(String),
    Number(i64),
    Long(Mapping),
}

impl PortEntry {
    pub fn as_short(&self) -> Option<&str> {
        match self {
            PortEntry::Short(s) => Some(s),
            _ => None,
        }
    }
}

/// An element of `volumes`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VolumeEntry {
    Short(String),
    Long(Mapping),
}

impl VolumeEntry {
    pub fn as_short(&self) -> Option<&str> {
        match self {
            VolumeEntry::Short(s) => Some(s),
            VolumeEntry::Long(_) => None,
        }
    }
}

/// `environment` in either of its two accepted shapes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentSpec {
    List(Vec<String>),
    Map(IndexMap<String, Value>),
}

/// The fields of a top-level network that are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSpec {
    pub external: bool,
    pub driver: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// YAML truthiness: null, false, zero and empty collections are false.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => truthy(&tagged.value),
    }
}

/// Render a mapping key as text.
pub(crate) fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

impl ComposeDocument {
    /// Parse YAML text. Fails with [`Error::Parse`] carrying the cause.
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(text).map_err(|e| Error::Parse(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Whether the top level is a mapping.
    pub fn is_mapping(&self) -> bool {
        self.root.is_mapping()
    }

    pub fn version(&self) -> Option<&Value> {
        self.root.get("version")
    }

    /// The raw `services` value, if the key exists.
    pub fn services_value(&self) -> Option<&Value> {
        self.root.get("services")
    }

    /// Services in declared order. Empty when the section is missing,
    /// empty, or not a mapping.
    pub fn services(&self) -> Vec<ServiceEntry> {
        let Some(Value::Mapping(services)) = self.services_value() else {
            return Vec::new();
        };

        services
            .iter()
            .map(|(key, body)| {
                let definition = match body {
                    Value::Mapping(_) => {
                        match serde_yaml::from_value::<ServiceSpec>(body.clone()) {
                            Ok(spec) => ServiceDefinition::Spec(Box::new(spec)),
                            Err(e) => ServiceDefinition::Invalid(e.to_string()),
                        }
                    }
                    _ => ServiceDefinition::NotAMapping,
                };
                ServiceEntry {
                    name: key_to_string(key),
                    definition,
                }
            })
            .collect()
    }

    /// Top-level networks in declared order.
    pub fn networks(&self) -> Vec<(String, NetworkSpec)> {
        let Some(Value::Mapping(networks)) = self.root.get("networks") else {
            return Vec::new();
        };

        networks
            .iter()
            .map(|(key, body)| {
                let spec = NetworkSpec {
                    external: body.get("external").map(truthy).unwrap_or(false),
                    driver: body
                        .get("driver")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                (key_to_string(key), spec)
            })
            .collect()
    }
}

/// Split a short-syntax port entry into its host and container fields.
///
/// Accepts `host:container` and `ip:host:container`. Returns `None` for
/// entries without a colon (container-only) and `Some(Err(()))` for
/// entries with too many fields.
pub fn split_port(entry: &str) -> Option<std::result::Result<(&str, &str), ()>> {
    if !entry.contains(':') {
        return None;
    }
    let fields: Vec<&str> = entry.split(':').collect();
    match fields.as_slice() {
        [host, container] => Some(Ok((*host, *container))),
        [_ip, host, container] => Some(Ok((*host, *container))),
        _ => Some(Err(())),
    }
}

/// Split a short-syntax volume entry into source and target, ignoring
/// any trailing mode field.
pub fn split_volume(entry: &str) -> Option<(&str, &str)> {
    let mut fields = entry.splitn(3, ':');
    let source = fields.next()?;
    let target = fields.next()?;
    Some((source, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure_carries_cause() {
        let err = ComposeDocument::parse("services: [unclosed").unwrap_err();
        match err {
            Error::Parse(cause) => assert!(!cause.is_empty()),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_services_keep_declared_order() {
        let doc = ComposeDocument::parse(
            "services:\n  zeta:\n    image: a\n  alpha:\n    image: b\n  mid:\n    image: c\n",
        )
        .unwrap();
        let names: Vec<String> = doc.services().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_service_spec_fields() {
        let doc = ComposeDocument::parse(
            r#"
services:
  web:
    image: nginx:1.25
    ports:
      - "8080:80"
      - 9000
      - target: 443
        published: 8443
    volumes:
      - /mnt/pool/data:/data:ro
    environment:
      MODE: prod
      WORKERS: 4
    cap_add: [NET_ADMIN]
    privileged: false
    user: 1000
"#,
        )
        .unwrap();

        let services = doc.services();
        let ServiceDefinition::Spec(spec) = &services[0].definition else {
            panic!("expected a spec");
        };
        assert_eq!(spec.image.as_deref(), Some("nginx:1.25"));
        assert_eq!(spec.short_ports().collect::<Vec<_>>(), vec!["8080:80"]);
        assert_eq!(spec.ports.len(), 3);
        assert_eq!(spec.volumes[0].as_short(), Some("/mnt/pool/data:/data:ro"));
        assert!(matches!(spec.environment, Some(EnvironmentSpec::Map(_))));
        assert_eq!(spec.cap_add, vec!["NET_ADMIN"]);
        assert!(!spec.privileged);
    }

    #[test]
    fn test_null_fields_are_empty() {
        let doc = ComposeDocument::parse("services:\n  web:\n    image: x\n    ports:\n    volumes:\n")
            .unwrap();
        let ServiceDefinition::Spec(spec) = &doc.services()[0].definition else {
            panic!("expected a spec");
        };
        assert!(spec.ports.is_empty());
        assert!(spec.volumes.is_empty());
    }

    #[test]
    fn test_non_mapping_and_invalid_services() {
        let doc = ComposeDocument::parse(
            "services:\n  broken: just-a-string\n  typed:\n    privileged: [1, 2]\n",
        )
        .unwrap();
        let services = doc.services();
        assert!(matches!(services[0].definition, ServiceDefinition::NotAMapping));
        assert!(matches!(services[1].definition, ServiceDefinition::Invalid(_)));
    }

    #[test]
    fn test_networks_external_flag() {
        let doc = ComposeDocument::parse(
            "networks:\n  plain:\n  ext:\n    external: true\n    driver: bridge\n  legacy:\n    external:\n      name: other\n",
        )
        .unwrap();
        let networks = doc.networks();
        assert_eq!(networks.len(), 3);
        assert!(!networks[0].1.external);
        assert!(networks[1].1.external);
        assert_eq!(networks[1].1.driver.as_deref(), Some("bridge"));
        assert!(networks[2].1.external);
    }

    #[test]
    fn test_split_port() {
        assert_eq!(split_port("8080:80"), Some(Ok(("8080", "80"))));
        assert_eq!(split_port("127.0.0.1:8080:80"), Some(Ok(("8080", "80"))));
        assert_eq!(split_port("80"), None);
        assert_eq!(split_port("a:b:c:d"), Some(Err(())));
    }

    #[test]
    fn test_split_volume() {
        assert_eq!(split_volume("/mnt/a:/b:ro"), Some(("/mnt/a", "/b")));
        assert_eq!(split_volume("data:/var/lib/data"), Some(("data", "/var/lib/data")));
        assert_eq!(split_volume("/anonymous"), None);
    }
}
