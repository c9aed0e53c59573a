//! Appliance endpoint definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Path of the versioned JSON-RPC API on the appliance.
pub const API_PATH: &str = "/api/current";

/// WebSocket scheme used to reach the appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ws,
    Wss,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Ws => write!(f, "ws"),
            Scheme::Wss => write!(f, "wss"),
        }
    }
}

impl FromStr for Scheme {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            _ => Err(crate::Error::Config(format!(
                "unsupported protocol '{}', expected ws or wss",
                s
            ))),
        }
    }
}

impl Scheme {
    /// Check if the scheme runs over TLS.
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Wss)
    }
}

/// Host, port and scheme of the appliance API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, scheme: Scheme) -> Self {
        Self {
            host: host.into(),
            port,
            scheme,
        }
    }

    /// Full WebSocket URL of the API.
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, API_PATH)
    }

    /// Whether the host names the local machine.
    pub fn is_loopback(&self) -> bool {
        matches!(
            self.host.to_lowercase().as_str(),
            "localhost" | "127.0.0.1" | "::1"
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}
