//! Common error types for nasdeploy.

use thiserror::Error;

/// Common error type for nasdeploy operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    Parse(String),

    #[error("No services found in Docker Compose")]
    EmptyInput,

    #[error("Service '{service}' cannot be deployed: {reason}")]
    InvalidService { service: String, reason: String },

    #[error("Service '{service}' has no image to deploy")]
    MissingImage { service: String },

    #[error("Invalid port mapping '{entry}'")]
    InvalidPort { entry: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API call {method} failed: [{code}] {message}")]
    Api {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Not connected to appliance")]
    NotConnected,

    #[error("Timed out waiting for reply to {method}")]
    Timeout { method: String },

    #[error("No containers found for app '{app}'")]
    NoContainers { app: String },

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Critical security issues: {}", .0.join("; "))]
    Security(Vec<String>),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an application-level error raised outside an RPC reply.
    pub fn api(method: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Api {
            method: method.into(),
            code: 0,
            message: message.into(),
        }
    }

    /// Whether the error means the channel to the appliance is gone.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::NotConnected)
    }
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_error_joins_messages() {
        let err = Error::Security(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "Critical security issues: first; second");
    }

    #[test]
    fn test_api_error_display() {
        let err = Error::Api {
            method: "app.start".to_string(),
            code: 22,
            message: "app not found".to_string(),
        };
        assert_eq!(err.to_string(), "API call app.start failed: [22] app not found");
        assert!(!err.is_connection());
        assert!(Error::NotConnected.is_connection());
    }
}
