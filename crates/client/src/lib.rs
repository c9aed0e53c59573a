//! Appliance client for nasdeploy.
//!
//! JSON-RPC over a persistent WebSocket, plus an in-memory backend for
//! running without an appliance.

pub mod backend;
pub mod client;
pub mod mock;
pub mod rpc;
pub mod transport;

pub use backend::{AppBackend, AppInstance, StatusFilter};
pub use client::{ApplianceClient, ConnectionState};
pub use mock::MockBackend;
pub use rpc::{Request, Response, RpcError};
pub use transport::{Connector, Duplex, WebSocketConnector};
