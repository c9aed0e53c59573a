//! The appliance-native app descriptor produced by conversion.
//!
//! The serialized form of [`TargetDescriptor`] is sent verbatim as the
//! parameter of `app.create` / `app.update`.

use crate::POOL_ROOT;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Complete app definition for the appliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub name: String,
    pub image: ImageRef,
    pub network: NetworkConfig,
    pub storage: IndexMap<String, VolumeMount>,
    pub environment: IndexMap<String, serde_json::Value>,
    pub restart_policy: RestartPolicy,
}

/// Container image reference split into repository and tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

pub const DEFAULT_TAG: &str = "latest";

impl ImageRef {
    /// Split on the last `:` that follows the last `/`, so a registry
    /// port such as `registry:5000/app` is not taken for a tag.
    pub fn parse(reference: &str) -> Self {
        let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        match reference[name_start..].rfind(':') {
            Some(offset) => {
                let split = name_start + offset;
                Self {
                    repository: reference[..split].to_string(),
                    tag: reference[split + 1..].to_string(),
                }
            }
            None => Self {
                repository: reference.to_string(),
                tag: DEFAULT_TAG.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Bridge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(rename = "type")]
    pub kind: NetworkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_forwards: Option<Vec<PortForward>>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            kind: NetworkKind::Bridge,
            port_forwards: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl PortForward {
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            host_port,
            container_port,
            protocol: Protocol::Tcp,
        }
    }
}

/// A storage entry: either a dataset path under the pool root, or a
/// volume the appliance provisions itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeMount {
    HostPath(HostPathMount),
    #[serde(rename = "ix_volume")]
    Managed(ManagedVolumeMount),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPathMount {
    pub host_path: String,
    pub mount_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedVolumeMount {
    pub ix_volume_config: ManagedVolumeConfig,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedVolumeConfig {
    pub dataset_name: String,
    pub acl_enable: bool,
}

impl VolumeMount {
    /// Pick the variant from the source alone: pool paths are bound
    /// directly, anything else becomes a managed volume named after the
    /// source.
    pub fn classify(source: &str, target: &str, read_only: bool) -> Self {
        if source.starts_with(POOL_ROOT) {
            VolumeMount::HostPath(HostPathMount {
                host_path: source.to_string(),
                mount_path: target.to_string(),
                read_only,
            })
        } else {
            VolumeMount::Managed(ManagedVolumeMount {
                ix_volume_config: ManagedVolumeConfig {
                    dataset_name: source.replace('/', "_"),
                    acl_enable: false,
                },
                mount_path: target.to_string(),
            })
        }
    }

    pub fn mount_path(&self) -> &str {
        match self {
            VolumeMount::HostPath(m) => &m.mount_path,
            VolumeMount::Managed(m) => &m.mount_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestartPolicy {
    #[default]
    #[serde(rename = "unless-stopped")]
    UnlessStopped,
}
