//! JSON-RPC envelopes exchanged with the appliance.

use nasdeploy_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Methods consumed from the appliance API.
pub mod methods {
    pub const LOGIN_WITH_API_KEY: &str = "auth.login_with_api_key";
    pub const PING: &str = "core.ping";
    pub const APP_QUERY: &str = "app.query";
    pub const APP_GET_INSTANCE: &str = "app.get_instance";
    pub const APP_START: &str = "app.start";
    pub const APP_STOP: &str = "app.stop";
    pub const APP_CREATE: &str = "app.create";
    pub const APP_UPDATE: &str = "app.update";
    pub const APP_DELETE: &str = "app.delete";
    pub const APP_CONTAINER_IDS: &str = "app.container_ids";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: u64,
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Any inbound frame: a reply (with `id`) or a server notification
/// (with `method` and no `id`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Response {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    /// The `result` value, or [`Error::Api`] when the reply carries `error`.
    /// A missing result is returned as `null`.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            Some(err) => Err(Error::Api {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
