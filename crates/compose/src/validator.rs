//! Structural, security and compatibility checks for Compose documents.
//!
//! [`validate`] never fails: every finding, including a YAML parse error,
//! is returned as a [`ValidationIssue`] with an explicit [`Severity`].

use crate::document::{split_port, truthy, ComposeDocument, ServiceDefinition, ServiceEntry};
use crate::rules::{is_dangerous_capability, security_rules, SERVICE_NAME_PATTERN};
use crate::POOL_ROOT;
use nasdeploy_common::Error;
use serde::Serialize;
use serde_yaml::Value;
use std::fmt;
use std::net::IpAddr;
use tracing::info;

/// How much an issue matters. Only `Error` makes a document invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

/// Ordered findings for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, severity: Severity, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity,
            message: message.into(),
        });
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.add(Severity::Error, message);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.add(Severity::Warning, message);
    }

    pub fn add_info(&mut self, message: impl Into<String>) {
        self.add(Severity::Info, message);
    }

    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    /// Rendered messages in the order they were found.
    pub fn messages(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.message.as_str()).collect()
    }

    /// Validity plus the rendered messages.
    pub fn into_parts(self) -> (bool, Vec<String>) {
        let valid = self.is_valid();
        (valid, self.issues.into_iter().map(|i| i.message).collect())
    }
}

/// Classify a Compose document. Security rules only run when
/// `check_security` is set; structure and compatibility checks always run.
pub fn validate(text: &str, check_security: bool) -> ValidationReport {
    info!(check_security, "Validating Docker Compose");

    let mut report = ValidationReport::new();

    let document = match ComposeDocument::parse(text) {
        Ok(document) => document,
        Err(Error::Parse(cause)) => {
            report.add_error(format!("Invalid YAML syntax: {}", cause));
            return report;
        }
        Err(other) => {
            report.add_error(format!("Invalid YAML syntax: {}", other));
            return report;
        }
    };

    if !document.is_mapping() {
        report.add_error("Docker Compose must be a YAML object");
        return report;
    }

    let services = document.services();

    validate_structure(&document, &services, &mut report);
    if check_security {
        validate_security(text, &services, &mut report);
    }
    validate_compatibility(&document, &services, &mut report);

    info!(
        is_valid = report.is_valid(),
        total_issues = report.issues.len(),
        errors = report.error_count(),
        "Validation complete"
    );

    report
}

fn validate_structure(
    document: &ComposeDocument,
    services: &[ServiceEntry],
    report: &mut ValidationReport,
) {
    match document.services_value() {
        None => report.add_error("Missing required 'services' section"),
        Some(value) if !truthy(value) => report.add_error("Services section cannot be empty"),
        Some(Value::Mapping(_)) => {}
        Some(_) => report
            .add_error("Invalid services section: expected a mapping of service definitions"),
    }

    if let Some(version) = document.version().filter(|v| truthy(v)) {
        match parse_version(version) {
            Some(v) if v < 2.0 => {
                report.add_warning("Docker Compose version should be 2.0 or higher")
            }
            Some(_) => {}
            None => report.add_error("Invalid Docker Compose version format"),
        }
    }

    for service in services {
        match &service.definition {
            ServiceDefinition::NotAMapping => {
                report.add_error(format!("Service '{}' must be an object", service.name));
                continue;
            }
            ServiceDefinition::Invalid(cause) => {
                report.add_error(format!(
                    "Service '{}' has an invalid definition: {}",
                    service.name, cause
                ));
            }
            ServiceDefinition::Spec(spec) => {
                if !spec.has_image_or_build() {
                    report.add_error(format!(
                        "Service '{}' must have either 'image' or 'build'",
                        service.name
                    ));
                }
            }
        }

        if !SERVICE_NAME_PATTERN.is_match(&service.name) {
            report.add_error(format!(
                "Service name '{}' contains invalid characters",
                service.name
            ));
        }
    }
}

fn parse_version(version: &Value) -> Option<f64> {
    match version {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn validate_security(text: &str, services: &[ServiceEntry], report: &mut ValidationReport) {
    for rule in security_rules() {
        if rule.pattern.is_match(text) {
            report.add(rule.severity, rule.message);
        }
    }

    for service in services {
        let ServiceDefinition::Spec(spec) = &service.definition else {
            continue;
        };
        for cap in spec.cap_add.iter().filter(|c| is_dangerous_capability(c)) {
            report.add_error(format!(
                "Service '{}': Capability {} is not allowed",
                service.name, cap
            ));
        }
    }
}

fn validate_compatibility(
    document: &ComposeDocument,
    services: &[ServiceEntry],
    report: &mut ValidationReport,
) {
    for service in services {
        let ServiceDefinition::Spec(spec) = &service.definition else {
            continue;
        };

        for volume in spec.volumes.iter().filter_map(|v| v.as_short()) {
            if volume.starts_with("./") || volume.starts_with("../") {
                report.add_error(format!(
                    "Service '{}': Relative paths in volumes are not supported",
                    service.name
                ));
            }

            if let Some((source, _)) = volume.split_once(':') {
                if source.starts_with('/') && !source.starts_with(POOL_ROOT) {
                    report.add_info(format!(
                        "Service '{}': Host paths should start with /mnt/ to use TrueNAS pools",
                        service.name
                    ));
                }
            }
        }

        for entry in spec.short_ports() {
            check_port(&service.name, entry, report);
        }
    }

    for (name, network) in document.networks() {
        if network.external {
            report.add_warning(format!("External network '{}' may not work as expected", name));
        }
    }

    if let [first, rest @ ..] = services {
        if !rest.is_empty() {
            let ignored: Vec<&str> = rest.iter().map(|s| s.name.as_str()).collect();
            report.add_warning(format!(
                "Only the first service '{}' is deployed; ignoring {}",
                first.name,
                ignored.join(", ")
            ));
        }
    }
}

fn check_port(service: &str, entry: &str, report: &mut ValidationReport) {
    let host = match split_port(entry) {
        None => return,
        Some(Ok((host, _))) => host.trim(),
        Some(Err(())) => {
            report.add_error(format!("Service '{}': Invalid port format '{}'", service, entry));
            return;
        }
    };

    // Bind addresses are covered by the interface rules.
    if host.is_empty() || host == "*" || host.parse::<IpAddr>().is_ok() {
        return;
    }

    let lower = host.split('-').next().unwrap_or(host);
    match lower.parse::<u32>() {
        Ok(port) if port < 1024 && port != 80 && port != 443 => {
            report.add_warning(format!(
                "Service '{}': Privileged ports (<1024) may require special configuration (port {})",
                service, port
            ));
        }
        Ok(_) => {}
        Err(_) => {
            report.add_error(format!("Service '{}': Invalid port format '{}'", service, entry));
        }
    }
}
