//! Runtime configuration and production safety checks.
//!
//! Configuration is read once from the environment into an immutable
//! [`Config`] that is handed to whatever needs it.

use crate::endpoint::{Endpoint, Scheme};
use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_HOST: &str = "truenas.local";
pub const DEFAULT_PORT: u16 = 443;

/// Placeholder printed instead of secret values.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

static HOSTNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap()
});

static PRIVATE_HOST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(local|lan|internal)$").unwrap());

/// Bearer credential for the appliance API. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for the login call only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", REDACTED_PLACEHOLDER)
    }
}

/// Where the process believes it is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentEnvironment {
    Development,
    Production,
}

impl DeploymentEnvironment {
    /// Detect production from the usual environment markers.
    pub fn detect<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let equals = |key: &str, expected: &str| {
            lookup(key)
                .map(|v| v.eq_ignore_ascii_case(expected))
                .unwrap_or(false)
        };

        if equals("ENVIRONMENT", "production")
            || equals("PROD", "true")
            || equals("NODE_ENV", "production")
            || equals("TRUENAS_PRODUCTION", "true")
        {
            DeploymentEnvironment::Production
        } else {
            DeploymentEnvironment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, DeploymentEnvironment::Production)
    }
}

/// A finding from [`Config::security_issues`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityIssue {
    /// Critical issues block startup in production.
    pub critical: bool,
    pub message: String,
}

impl SecurityIssue {
    fn critical(message: impl Into<String>) -> Self {
        Self {
            critical: true,
            message: message.into(),
        }
    }

    fn advisory(message: impl Into<String>) -> Self {
        Self {
            critical: false,
            message: message.into(),
        }
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    pub api_key: Option<Credential>,
    pub verify_tls: bool,
    pub debug: bool,
    pub mock: bool,
    /// Per-call reply timeout. `None` waits until the channel closes.
    pub request_timeout: Option<Duration>,
    pub environment: DeploymentEnvironment,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new(DEFAULT_HOST, DEFAULT_PORT, Scheme::Wss),
            api_key: None,
            verify_tls: true,
            debug: false,
            mock: false,
            request_timeout: None,
            environment: DeploymentEnvironment::Development,
        }
    }
}

fn flag(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => v.trim().eq_ignore_ascii_case("true"),
        None => default,
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Only `DEBUG_MODE`, so logging can start before the rest of the
    /// configuration is known to be valid.
    pub fn debug_from_env() -> bool {
        flag(std::env::var("DEBUG_MODE").ok(), false)
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("TRUENAS_HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("TRUENAS_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("invalid TRUENAS_PORT '{}': {}", raw, e)))?,
            None => DEFAULT_PORT,
        };

        let scheme = match lookup("TRUENAS_PROTOCOL") {
            Some(raw) => raw.trim().parse::<Scheme>()?,
            None => Scheme::Wss,
        };

        let request_timeout = match lookup("TRUENAS_TIMEOUT") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| {
                    Error::Config(format!("invalid TRUENAS_TIMEOUT '{}': {}", raw, e))
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            endpoint: Endpoint::new(host, port, scheme),
            api_key: lookup("TRUENAS_API_KEY")
                .filter(|k| !k.is_empty())
                .map(Credential::new),
            verify_tls: flag(lookup("TRUENAS_SSL_VERIFY"), true),
            debug: flag(lookup("DEBUG_MODE"), false),
            mock: flag(lookup("MOCK_TRUENAS"), false),
            request_timeout,
            environment: DeploymentEnvironment::detect(&lookup),
        })
    }

    /// Check the configuration for insecure or unusable settings.
    pub fn security_issues(&self) -> Vec<SecurityIssue> {
        let mut issues = Vec::new();
        let production = self.environment.is_production();
        let host = &self.endpoint.host;

        if production && self.endpoint.is_loopback() {
            issues.push(SecurityIssue::critical(
                "Production environment should not use localhost for TrueNAS host",
            ));
        }

        if PRIVATE_HOST_PATTERN.is_match(host) {
            info!(host = %host, "Host appears to be on a private network");
        }

        if !HOSTNAME_PATTERN.is_match(host) {
            issues.push(SecurityIssue::critical(format!(
                "Invalid hostname format: {}",
                host
            )));
        }

        if !self.verify_tls {
            if production {
                issues.push(SecurityIssue::critical(
                    "SSL certificate verification MUST be enabled in production environments",
                ));
            }
            if !self.endpoint.is_loopback() {
                issues.push(SecurityIssue::advisory(format!(
                    "SSL verification disabled for remote host {} - this is insecure",
                    host
                )));
            }
        }

        if self.api_key.is_none() && !self.mock {
            issues.push(SecurityIssue::critical(
                "TRUENAS_API_KEY environment variable is required",
            ));
        }

        if self.mock {
            if production {
                issues.push(SecurityIssue::critical(
                    "Mock mode MUST NOT be enabled in production environments",
                ));
            }
            warn!("Mock mode is enabled - this bypasses all TrueNAS authentication");
        }

        issues
    }

    /// Refuse to start with critical issues in production, or without a
    /// credential when a real appliance is needed.
    pub fn enforce(&self) -> Result<()> {
        let issues = self.security_issues();

        for issue in &issues {
            warn!(critical = issue.critical, "{}", issue.message);
        }

        if self.api_key.is_none() && !self.mock {
            return Err(Error::Config(
                "TRUENAS_API_KEY environment variable is required".to_string(),
            ));
        }

        if !self.environment.is_production() {
            return Ok(());
        }

        let critical: Vec<String> = issues
            .into_iter()
            .filter(|i| i.critical)
            .map(|i| i.message)
            .collect();

        if critical.is_empty() {
            info!("Security configuration validation passed");
            Ok(())
        } else {
            Err(Error::Security(critical))
        }
    }
}
