//! Named operations with argument checks and human-readable results.

use nasdeploy_client::{AppBackend, ApplianceClient, MockBackend, StatusFilter};
use nasdeploy_common::{Config, Error, Result};
use nasdeploy_compose::{convert, validate, validate_app_name, Severity, ValidationReport};
use std::fmt::Display;
use tracing::{error, info, warn};

pub const MIN_COMPOSE_LEN: usize = 10;
pub const MAX_COMPOSE_LEN: usize = 100_000;
pub const MIN_LOG_LINES: usize = 1;
pub const MAX_LOG_LINES: usize = 1000;
pub const DEFAULT_LOG_LINES: usize = 100;

/// Result of one operation, rendered for people.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub text: String,
}

impl Outcome {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

fn failed(op: &str, err: impl Display) -> Outcome {
    error!(tool = op, error = %err, "Tool execution failed");
    Outcome::fail(format!("❌ Error executing {}: {}", op, err))
}

fn check_app_name(name: &str) -> Result<()> {
    let issues = validate_app_name(name);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "app name '{}': {}",
            name,
            issues.join("; ")
        )))
    }
}

fn check_compose(compose_yaml: &str) -> Result<()> {
    let len = compose_yaml.len();
    if (MIN_COMPOSE_LEN..=MAX_COMPOSE_LEN).contains(&len) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "compose document must be between {} and {} bytes (got {})",
            MIN_COMPOSE_LEN, MAX_COMPOSE_LEN, len
        )))
    }
}

fn check_lines(lines: usize) -> Result<()> {
    if (MIN_LOG_LINES..=MAX_LOG_LINES).contains(&lines) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "lines must be between {} and {} (got {})",
            MIN_LOG_LINES, MAX_LOG_LINES, lines
        )))
    }
}

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "❌",
        Severity::Warning => "⚠️",
        Severity::Info => "ℹ️",
    }
}

fn render_report(report: &ValidationReport) -> Outcome {
    let lines = || {
        report
            .issues
            .iter()
            .map(|i| format!("{} {}", marker(i.severity), i.message))
            .collect::<Vec<_>>()
            .join("\n")
    };

    if report.is_empty() {
        Outcome::ok("✅ Docker Compose is valid and secure")
    } else if report.is_valid() {
        Outcome::ok(format!(
            "✅ Docker Compose is valid but has warnings:\n{}",
            lines()
        ))
    } else {
        Outcome::fail(format!("❌ Docker Compose validation failed:\n{}", lines()))
    }
}

/// Check a document without any backend.
pub fn validate_document(compose_yaml: &str, check_security: bool) -> Outcome {
    const OP: &str = "validate_compose";
    if let Err(e) = check_compose(compose_yaml) {
        return failed(OP, e);
    }
    render_report(&validate(compose_yaml, check_security))
}

/// Convert a document to the pretty-printed app descriptor.
pub fn convert_document(name: &str, compose_yaml: &str) -> Outcome {
    const OP: &str = "convert_compose";
    let descriptor = check_app_name(name)
        .and_then(|_| check_compose(compose_yaml))
        .and_then(|_| convert(compose_yaml, name));
    match descriptor.and_then(|d| serde_json::to_string_pretty(&d).map_err(Error::from)) {
        Ok(json) => Outcome::ok(json),
        Err(e) => failed(OP, e),
    }
}

/// Dispatches operations to a backend and renders the results.
pub struct Operations {
    backend: Box<dyn AppBackend>,
}

impl Operations {
    pub fn new(backend: Box<dyn AppBackend>) -> Self {
        Self { backend }
    }

    /// Pick the mock or the real backend from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: Box<dyn AppBackend> = if config.mock {
            warn!("Using mock TrueNAS backend");
            Box::new(MockBackend::new()?)
        } else {
            Box::new(ApplianceClient::from_config(config)?)
        };
        Ok(Self::new(backend))
    }

    /// Open the backend session. Every operation except
    /// [`Operations::test_connection`] expects this to have succeeded.
    pub async fn connect(&self) -> Outcome {
        match self.backend.connect().await {
            Ok(()) => Outcome::ok("✅ Connected to TrueNAS"),
            Err(e) => {
                error!(error = %e, "Failed to connect to TrueNAS");
                Outcome::fail(format!("❌ TrueNAS connection failed: {}", e))
            }
        }
    }

    pub async fn shutdown(&self) {
        self.backend.disconnect().await;
    }

    pub async fn test_connection(&self) -> Outcome {
        info!(tool = "test_connection", "Executing tool");
        match self.backend.test_connection().await {
            Ok(true) => Outcome::ok("✅ TrueNAS connection successful"),
            Ok(false) => Outcome::fail("❌ TrueNAS connection failed"),
            Err(e) => {
                error!(error = %e, "Connection test failed");
                Outcome::fail(format!("❌ TrueNAS connection failed: {}", e))
            }
        }
    }

    pub async fn list_apps(&self, filter: StatusFilter) -> Outcome {
        const OP: &str = "list_custom_apps";
        info!(tool = OP, filter = %filter, "Executing tool");
        let apps = match self.backend.list_apps(filter).await {
            Ok(apps) => apps,
            Err(e) => return failed(OP, e),
        };

        if apps.is_empty() {
            return Outcome::ok("No Custom Apps found");
        }

        let mut text = String::from("Custom Apps:\n");
        for app in &apps {
            text.push_str(&format!("- {}: {}\n", app.name, app.status));
        }
        Outcome::ok(text)
    }

    pub async fn app_status(&self, name: &str) -> Outcome {
        const OP: &str = "get_custom_app_status";
        info!(tool = OP, app = name, "Executing tool");
        if let Err(e) = check_app_name(name) {
            return failed(OP, e);
        }
        match self.backend.get_app_status(name).await {
            Ok(status) => Outcome::ok(format!("App '{}' status: {}", name, status)),
            Err(e) => failed(OP, e),
        }
    }

    pub async fn start_app(&self, name: &str) -> Outcome {
        const OP: &str = "start_custom_app";
        info!(tool = OP, app = name, "Executing tool");
        if let Err(e) = check_app_name(name) {
            return failed(OP, e);
        }
        match self.backend.start_app(name).await {
            Ok(()) => Outcome::ok(format!("✅ Started Custom App '{}'", name)),
            Err(e) => failed(OP, e),
        }
    }

    pub async fn stop_app(&self, name: &str) -> Outcome {
        const OP: &str = "stop_custom_app";
        info!(tool = OP, app = name, "Executing tool");
        if let Err(e) = check_app_name(name) {
            return failed(OP, e);
        }
        match self.backend.stop_app(name).await {
            Ok(()) => Outcome::ok(format!("✅ Stopped Custom App '{}'", name)),
            Err(e) => failed(OP, e),
        }
    }

    pub async fn deploy_app(&self, name: &str, compose_yaml: &str, auto_start: bool) -> Outcome {
        const OP: &str = "deploy_custom_app";
        info!(tool = OP, app = name, auto_start, "Executing tool");
        if let Err(e) = check_app_name(name).and_then(|_| check_compose(compose_yaml)) {
            return failed(OP, e);
        }
        match self.backend.deploy_app(name, compose_yaml, auto_start).await {
            Ok(()) => Outcome::ok(format!("✅ Deployed Custom App '{}' successfully", name)),
            Err(e) => failed(OP, e),
        }
    }

    pub async fn update_app(&self, name: &str, compose_yaml: &str, force_recreate: bool) -> Outcome {
        const OP: &str = "update_custom_app";
        info!(tool = OP, app = name, force_recreate, "Executing tool");
        if let Err(e) = check_app_name(name).and_then(|_| check_compose(compose_yaml)) {
            return failed(OP, e);
        }
        match self
            .backend
            .update_app(name, compose_yaml, force_recreate)
            .await
        {
            Ok(()) => Outcome::ok(format!("✅ Updated Custom App '{}' successfully", name)),
            Err(e) => failed(OP, e),
        }
    }

    pub async fn delete_app(&self, name: &str, delete_volumes: bool, confirmed: bool) -> Outcome {
        const OP: &str = "delete_custom_app";
        info!(tool = OP, app = name, delete_volumes, "Executing tool");
        if let Err(e) = check_app_name(name) {
            return failed(OP, e);
        }
        if !confirmed {
            return Outcome::fail(
                "❌ Deletion not confirmed. Set confirm_deletion=true to proceed.",
            );
        }
        match self.backend.delete_app(name, delete_volumes).await {
            Ok(()) => Outcome::ok(format!("✅ Deleted Custom App '{}' successfully", name)),
            Err(e) => failed(OP, e),
        }
    }

    pub async fn validate_compose(&self, compose_yaml: &str, check_security: bool) -> Outcome {
        const OP: &str = "validate_compose";
        info!(tool = OP, check_security, "Executing tool");
        if let Err(e) = check_compose(compose_yaml) {
            return failed(OP, e);
        }
        let report = self
            .backend
            .validate_compose(compose_yaml, check_security)
            .await;
        render_report(&report)
    }

    pub async fn app_logs(&self, name: &str, lines: usize, service: Option<&str>) -> Outcome {
        const OP: &str = "get_app_logs";
        info!(tool = OP, app = name, lines, "Executing tool");
        if let Err(e) = check_app_name(name).and_then(|_| check_lines(lines)) {
            return failed(OP, e);
        }
        match self.backend.get_app_logs(name, lines, service).await {
            Ok(logs) if logs.is_empty() => Outcome::ok(format!("No logs found for '{}'", name)),
            Ok(logs) => Outcome::ok(format!("Logs for '{}':\n{}", name, logs)),
            Err(e) => failed(OP, e),
        }
    }
}
