//! Docker Compose handling for appliance deployments.
//!
//! This crate provides:
//! - A parsed view of Compose documents
//! - Conversion to the appliance app descriptor
//! - Security and compatibility validation
//! - App-name checks

pub mod app_name;
pub mod converter;
pub mod descriptor;
pub mod document;
pub mod rules;
pub mod validator;

/// Host paths under this prefix live on appliance storage pools.
pub const POOL_ROOT: &str = "/mnt/";

pub use app_name::validate_app_name;
pub use converter::{convert, convert_document};
pub use descriptor::{
    HostPathMount, ImageRef, ManagedVolumeConfig, ManagedVolumeMount, NetworkConfig, NetworkKind,
    PortForward, Protocol, RestartPolicy, TargetDescriptor, VolumeMount,
};
pub use document::ComposeDocument;
pub use validator::{validate, Severity, ValidationIssue, ValidationReport};
