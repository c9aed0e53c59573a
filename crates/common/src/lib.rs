//! Common utilities and types shared across nasdeploy crates.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod timestamp;

pub use config::{Config, Credential, DeploymentEnvironment, SecurityIssue};
pub use endpoint::{Endpoint, Scheme};
pub use error::{Error, Result};
pub use timestamp::Timestamp;
