//! The operations every app backend provides.

use async_trait::async_trait;
use nasdeploy_common::{Error, Result};
use nasdeploy_compose::{validate, ValidationReport};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// An app as reported by `app.query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInstance {
    pub name: String,
    #[serde(alias = "state", default = "unknown_status")]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unknown_status() -> String {
    "unknown".to_string()
}

impl AppInstance {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            extra: Map::new(),
        }
    }
}

/// Client-side filter for app listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Running,
    Stopped,
    Error,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Running => "running",
            StatusFilter::Stopped => "stopped",
            StatusFilter::Error => "error",
        }
    }

    /// Case-insensitive so `RUNNING` from the appliance matches `running`.
    pub fn matches(&self, status: &str) -> bool {
        match self {
            StatusFilter::All => true,
            other => status.eq_ignore_ascii_case(other.as_str()),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "running" => Ok(StatusFilter::Running),
            "stopped" => Ok(StatusFilter::Stopped),
            "error" => Ok(StatusFilter::Error),
            other => Err(Error::Other(format!(
                "unknown status filter '{}' (expected all, running, stopped or error)",
                other
            ))),
        }
    }
}

/// App lifecycle operations against an appliance or a stand-in.
#[async_trait]
pub trait AppBackend: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self);

    /// Round-trip a ping. Connects first when needed.
    async fn test_connection(&self) -> Result<bool>;

    async fn list_apps(&self, filter: StatusFilter) -> Result<Vec<AppInstance>>;

    async fn get_app_status(&self, name: &str) -> Result<String>;

    async fn start_app(&self, name: &str) -> Result<()>;

    async fn stop_app(&self, name: &str) -> Result<()>;

    /// Convert `compose_yaml` and create the app, starting it if asked.
    async fn deploy_app(&self, name: &str, compose_yaml: &str, auto_start: bool) -> Result<()>;

    async fn update_app(&self, name: &str, compose_yaml: &str, force_recreate: bool) -> Result<()>;

    async fn delete_app(&self, name: &str, delete_volumes: bool) -> Result<()>;

    async fn validate_compose(&self, compose_yaml: &str, check_security: bool) -> ValidationReport {
        validate(compose_yaml, check_security)
    }

    async fn get_app_logs(&self, name: &str, lines: usize, service: Option<&str>)
        -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_app_instance_accepts_state_alias() {
        let app: AppInstance =
            serde_json::from_value(json!({"name": "web", "state": "RUNNING", "version": "1.0"}))
                .unwrap();
        assert_eq!(app.status, "RUNNING");
        assert_eq!(app.extra["version"], json!("1.0"));
    }

    #[test]
    fn test_app_instance_missing_status() {
        let app: AppInstance = serde_json::from_value(json!({"name": "web"})).unwrap();
        assert_eq!(app.status, "unknown");
        assert!(app.extra.is_empty());
    }

    #[test]
    fn test_status_filter() {
        assert_eq!("Running".parse::<StatusFilter>().unwrap(), StatusFilter::Running);
        assert!("paused".parse::<StatusFilter>().is_err());
        assert!(StatusFilter::Running.matches("RUNNING"));
        assert!(!StatusFilter::Stopped.matches("running"));
        assert!(StatusFilter::All.matches("anything"));
        assert_eq!(StatusFilter::default().to_string(), "all");
    }
}
