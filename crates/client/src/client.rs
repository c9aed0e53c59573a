//! JSON-RPC client for the appliance API.
//!
//! One connection per client. Requests are written as they are issued and
//! a dispatch task routes each reply to its caller by `id`, so any number
//! of tasks may share a client.

use crate::backend::{AppBackend, AppInstance, StatusFilter};
use crate::rpc::{methods, Request, Response};
use crate::transport::{Connector, Duplex, WebSocketConnector};
use async_trait::async_trait;
use nasdeploy_common::{Config, Credential, Endpoint, Error, Result};
use nasdeploy_compose::convert;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Response>>>>>;

const CLOSED: &str = "connection closed";

struct Session {
    outbound: mpsc::Sender<String>,
    dispatcher: JoinHandle<()>,
}

pub struct ApplianceClient {
    endpoint: Endpoint,
    api_key: Credential,
    connector: Box<dyn Connector>,
    request_timeout: Option<Duration>,
    next_id: AtomicU64,
    authenticated: Arc<AtomicBool>,
    state: Arc<watch::Sender<ConnectionState>>,
    pending: PendingTable,
    session: Mutex<Option<Session>>,
    /// Held for the whole connect/login sequence.
    connecting: Mutex<()>,
}

impl ApplianceClient {
    pub fn new(endpoint: Endpoint, api_key: Credential, connector: impl Connector + 'static) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            endpoint,
            api_key,
            connector: Box::new(connector),
            request_timeout: None,
            next_id: AtomicU64::new(1),
            authenticated: Arc::new(AtomicBool::new(false)),
            state: Arc::new(state),
            pending: Arc::new(Mutex::new(HashMap::new())),
            session: Mutex::new(None),
            connecting: Mutex::new(()),
        }
    }

    /// Build a WebSocket client from configuration. Requires an API key.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Config("TRUENAS_API_KEY environment variable is required".to_string())
        })?;
        Ok(Self::new(
            config.endpoint.clone(),
            api_key,
            WebSocketConnector::from_config(config),
        )
        .with_request_timeout(config.request_timeout))
    }

    /// Fail calls with [`Error::Timeout`] when no reply arrives in time.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Open the channel and log in. A no-op when already authenticated.
    /// Concurrent callers wait for the first attempt and share its session.
    pub async fn connect(&self) -> Result<()> {
        let _connecting = self.connecting.lock().await;
        if self.is_authenticated() {
            return Ok(());
        }

        self.close_session().await;
        self.state.send_replace(ConnectionState::Connecting);
        info!(url = %self.endpoint.url(), "Connecting to TrueNAS");

        let Duplex { outbound, inbound } = match self.connector.connect(&self.endpoint).await {
            Ok(duplex) => duplex,
            Err(e) => {
                self.state.send_replace(ConnectionState::Disconnected);
                error!(error = %e, "Failed to connect to TrueNAS");
                return Err(match e {
                    Error::Connection(_) => e,
                    other => Error::Connection(other.to_string()),
                });
            }
        };

        let dispatcher = tokio::spawn(dispatch(
            inbound,
            self.pending.clone(),
            self.state.clone(),
            self.authenticated.clone(),
        ));
        *self.session.lock().await = Some(Session {
            outbound,
            dispatcher,
        });

        self.state.send_replace(ConnectionState::Authenticating);
        if let Err(e) = self.authenticate().await {
            error!(error = %e, "Failed to authenticate with TrueNAS");
            self.disconnect().await;
            return Err(e);
        }

        self.authenticated.store(true, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Connected);
        info!("Connected to TrueNAS successfully");
        Ok(())
    }

    /// Close the channel. Outstanding calls fail with a connection error.
    pub async fn disconnect(&self) {
        if self.close_session().await {
            info!("Disconnected from TrueNAS");
        }
        self.authenticated.store(false, Ordering::SeqCst);
        self.state.send_replace(ConnectionState::Disconnected);
        fail_pending(&self.pending).await;
    }

    /// Tear down the current session. Calls waiting on it fail, since its
    /// dispatcher will never answer them.
    async fn close_session(&self) -> bool {
        let session = self.session.lock().await.take();
        match session {
            Some(Session {
                outbound,
                dispatcher,
            }) => {
                dispatcher.abort();
                drop(outbound);
                fail_pending(&self.pending).await;
                true
            }
            None => false,
        }
    }

    async fn authenticate(&self) -> Result<()> {
        let reply = self
            .send(
                methods::LOGIN_WITH_API_KEY,
                vec![json!(self.api_key.expose())],
            )
            .await?;

        if let Some(err) = reply.error {
            return Err(Error::Authentication(err.message));
        }
        if reply.result == Some(Value::Bool(false)) {
            return Err(Error::Authentication("API key rejected".to_string()));
        }

        info!("Authenticated with TrueNAS successfully");
        Ok(())
    }

    /// Issue one authenticated call and return its `result`.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        if !self.is_authenticated() {
            return Err(Error::NotConnected);
        }
        self.send(method, params).await?.into_result(method)
    }

    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Response> {
        let outbound = {
            let session = self.session.lock().await;
            session
                .as_ref()
                .map(|s| s.outbound.clone())
                .ok_or(Error::NotConnected)?
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&Request::new(id, method, params))?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        // The dispatcher marks the state before draining the table, so a
        // call registered after the drain sees it here.
        if self.state() == ConnectionState::Disconnected {
            self.pending.lock().await.remove(&id);
            return Err(Error::Connection(CLOSED.to_string()));
        }

        debug!(id, method, "Sending request");
        if outbound.send(frame).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::Connection(CLOSED.to_string()));
        }

        let reply = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    warn!(id, method, "Request timed out");
                    return Err(Error::Timeout {
                        method: method.to_string(),
                    });
                }
            },
            None => rx.await,
        };

        let reply = reply.map_err(|_| Error::Connection(CLOSED.to_string()))??;
        debug!(id, method, error = reply.error.is_some(), "Received reply");
        Ok(reply)
    }

    async fn container_ids(&self, name: &str) -> Result<Vec<String>> {
        let result = self
            .call(methods::APP_CONTAINER_IDS, vec![json!(name)])
            .await?;
        let ids = match result {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            Value::Object(map) => map.keys().cloned().collect(),
            other => {
                return Err(Error::MalformedReply(format!(
                    "expected container id list, got {}",
                    other
                )))
            }
        };
        Ok(ids)
    }
}

impl Drop for ApplianceClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.dispatcher.abort();
        }
    }
}

/// Route inbound frames to waiting callers until the channel closes.
async fn dispatch(
    mut inbound: mpsc::Receiver<String>,
    pending: PendingTable,
    state: Arc<watch::Sender<ConnectionState>>,
    authenticated: Arc<AtomicBool>,
) {
    while let Some(frame) = inbound.recv().await {
        match serde_json::from_str::<Response>(&frame) {
            Ok(reply) if reply.is_notification() => {
                debug!(method = ?reply.method, "Ignoring notification");
            }
            Ok(reply) => match reply.id {
                Some(id) => match pending.lock().await.remove(&id) {
                    Some(waiter) => {
                        let _ = waiter.send(Ok(reply));
                    }
                    None => warn!(id, "Dropping reply with no pending request"),
                },
                None => warn!("Dropping reply without id"),
            },
            Err(e) => {
                let mut table = pending.lock().await;
                let only = if table.len() == 1 {
                    table.keys().next().copied()
                } else {
                    None
                };
                match only.and_then(|id| table.remove(&id)) {
                    Some(waiter) => {
                        let _ = waiter.send(Err(Error::MalformedReply(e.to_string())));
                    }
                    None => warn!(error = %e, "Dropping unparseable frame"),
                }
            }
        }
    }

    authenticated.store(false, Ordering::SeqCst);
    state.send_replace(ConnectionState::Disconnected);
    fail_pending(&pending).await;
    warn!("TrueNAS connection closed");
}

async fn fail_pending(pending: &PendingTable) {
    for (_, waiter) in pending.lock().await.drain() {
        let _ = waiter.send(Err(Error::Connection(CLOSED.to_string())));
    }
}

fn malformed(method: &str, e: serde_json::Error) -> Error {
    Error::MalformedReply(format!("{}: {}", method, e))
}

#[async_trait]
impl AppBackend for ApplianceClient {
    async fn connect(&self) -> Result<()> {
        ApplianceClient::connect(self).await
    }

    async fn disconnect(&self) {
        ApplianceClient::disconnect(self).await
    }

    async fn test_connection(&self) -> Result<bool> {
        ApplianceClient::connect(self).await?;
        let reply = self.send(methods::PING, Vec::new()).await?;
        Ok(reply.error.is_none())
    }

    async fn list_apps(&self, filter: StatusFilter) -> Result<Vec<AppInstance>> {
        let result = self.call(methods::APP_QUERY, vec![json!({})]).await?;
        let apps: Vec<AppInstance> = match result {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other).map_err(|e| malformed(methods::APP_QUERY, e))?,
        };
        Ok(apps
            .into_iter()
            .filter(|app| filter.matches(&app.status))
            .collect())
    }

    async fn get_app_status(&self, name: &str) -> Result<String> {
        let result = self
            .call(methods::APP_GET_INSTANCE, vec![json!(name)])
            .await?;
        let status = ["status", "state"]
            .iter()
            .find_map(|key| result.get(*key).and_then(Value::as_str))
            .unwrap_or("unknown");
        Ok(status.to_string())
    }

    async fn start_app(&self, name: &str) -> Result<()> {
        self.call(methods::APP_START, vec![json!(name)]).await?;
        Ok(())
    }

    async fn stop_app(&self, name: &str) -> Result<()> {
        self.call(methods::APP_STOP, vec![json!(name)]).await?;
        Ok(())
    }

    async fn deploy_app(&self, name: &str, compose_yaml: &str, auto_start: bool) -> Result<()> {
        let descriptor = convert(compose_yaml, name)?;
        let payload = serde_json::to_value(&descriptor)?;

        if let Err(e) = self.call(methods::APP_CREATE, vec![payload]).await {
            error!(app = name, error = %e, "App deployment failed");
            return Err(e);
        }
        info!(app = name, auto_start, "App created");

        if auto_start {
            AppBackend::start_app(self, name).await?;
        }
        Ok(())
    }

    async fn update_app(&self, name: &str, compose_yaml: &str, force_recreate: bool) -> Result<()> {
        let descriptor = convert(compose_yaml, name)?;
        let payload = serde_json::to_value(&descriptor)?;
        if force_recreate {
            // app.update has no recreate switch; the appliance decides.
            debug!(app = name, "force_recreate requested");
        }
        self.call(methods::APP_UPDATE, vec![json!(name), payload])
            .await?;
        Ok(())
    }

    async fn delete_app(&self, name: &str, delete_volumes: bool) -> Result<()> {
        self.call(methods::APP_DELETE, vec![json!(name), json!(delete_volumes)])
            .await?;
        Ok(())
    }

    async fn get_app_logs(
        &self,
        name: &str,
        lines: usize,
        service: Option<&str>,
    ) -> Result<String> {
        let ids = self.container_ids(name).await?;
        let container = service
            .and_then(|svc| ids.iter().find(|id| id.contains(svc)))
            .or_else(|| ids.first())
            .ok_or_else(|| Error::NoContainers {
                app: name.to_string(),
            })?;

        debug!(app = name, container = %container, lines, "Resolved log container");
        Err(Error::Unsupported(format!(
            "log retrieval for app '{}' (container {}) is not available through the appliance API",
            name, container
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nasdeploy_common::Scheme;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    type Script = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

    /// In-memory connector backed by a fake appliance task. The script maps
    /// each request to the raw frames sent back, in order.
    struct FakeConnector {
        script: Script,
        seen: Arc<StdMutex<Vec<Value>>>,
        refuse: bool,
    }

    impl FakeConnector {
        fn new(script: impl Fn(&Value) -> Vec<String> + Send + Sync + 'static) -> Self {
            Self {
                script: Arc::new(script),
                seen: Arc::new(StdMutex::new(Vec::new())),
                refuse: false,
            }
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _endpoint: &Endpoint) -> Result<Duplex> {
            if self.refuse {
                return Err(Error::Connection("refused".to_string()));
            }
            let (outbound, mut requests) = mpsc::channel::<String>(16);
            let (replies, inbound) = mpsc::channel::<String>(16);
            let script = self.script.clone();
            let seen = self.seen.clone();

            tokio::spawn(async move {
                while let Some(frame) = requests.recv().await {
                    let request: Value = serde_json::from_str(&frame).unwrap();
                    seen.lock().unwrap().push(request.clone());
                    if request["method"] == "test.hangup" {
                        break;
                    }
                    for reply in script(&request) {
                        if replies.send(reply).await.is_err() {
                            return;
                        }
                    }
                }
            });

            Ok(Duplex { outbound, inbound })
        }
    }

    fn reply(request: &Value, result: Value) -> String {
        json!({"id": request["id"], "jsonrpc": "2.0", "result": result}).to_string()
    }

    fn ok(request: &Value, result: Value) -> Vec<String> {
        vec![reply(request, result)]
    }

    fn fail(request: &Value, code: i64, message: &str) -> Vec<String> {
        vec![json!({
            "id": request["id"],
            "jsonrpc": "2.0",
            "error": {"code": code, "message": message}
        })
        .to_string()]
    }

    fn is_login(request: &Value) -> bool {
        request["method"] == "auth.login_with_api_key"
    }

    /// Accepts the key "good-key" and answers the app methods.
    fn appliance(request: &Value) -> Vec<String> {
        let params = &request["params"];
        match request["method"].as_str().unwrap_or_default() {
            "auth.login_with_api_key" => {
                if params[0] == "good-key" {
                    ok(request, json!(true))
                } else {
                    fail(request, 13, "invalid API key")
                }
            }
            "core.ping" => ok(request, json!("pong")),
            "app.query" => ok(
                request,
                json!([
                    {"name": "web", "state": "RUNNING"},
                    {"name": "db", "state": "STOPPED"},
                    {"name": "cache", "status": "running"}
                ]),
            ),
            "app.get_instance" => {
                if params[0] == "web" {
                    ok(request, json!({"name": "web", "status": "running"}))
                } else {
                    fail(request, 22, "app not found")
                }
            }
            "app.container_ids" => match params[0].as_str() {
                Some("web") => ok(request, json!(["abc123-web", "def456-worker"])),
                _ => ok(request, json!([])),
            },
            "app.start" | "app.stop" | "app.create" | "app.update" | "app.delete" => {
                ok(request, Value::Null)
            }
            _ => fail(request, -32601, "method not found"),
        }
    }

    fn client_with(connector: FakeConnector, key: &str) -> ApplianceClient {
        ApplianceClient::new(
            Endpoint::new("nas.test", 443, Scheme::Wss),
            Credential::new(key),
            connector,
        )
    }

    async fn connected(connector: FakeConnector) -> ApplianceClient {
        let client = client_with(connector, "good-key");
        client.connect().await.unwrap();
        client
    }

    fn methods_seen(seen: &Arc<StdMutex<Vec<Value>>>) -> Vec<String> {
        seen.lock()
            .unwrap()
            .iter()
            .map(|r| r["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    const COMPOSE: &str =
        "services:\n  web:\n    image: nginx:1.25\n    ports:\n      - \"8080:80\"\n";

    #[tokio::test]
    async fn test_connect_authenticates() {
        let connector = FakeConnector::new(appliance);
        let seen = connector.seen.clone();
        let client = client_with(connector, "good-key");
        let states = client.subscribe_state();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        client.connect().await.unwrap();
        assert!(client.is_authenticated());
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(*states.borrow(), ConnectionState::Connected);

        let login = seen.lock().unwrap()[0].clone();
        assert_eq!(
            login,
            json!({
                "id": 1,
                "jsonrpc": "2.0",
                "method": "auth.login_with_api_key",
                "params": ["good-key"]
            })
        );

        // Already authenticated: no second login.
        client.connect().await.unwrap();
        assert_eq!(methods_seen(&seen).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_connects_share_one_login() {
        let connector = FakeConnector::new(appliance);
        let seen = connector.seen.clone();
        let client = Arc::new(client_with(connector, "good-key"));

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.connect().await }
        });
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.connect().await }
        });

        let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
            (first.await.unwrap(), second.await.unwrap())
        })
        .await
        .expect("connect calls must not hang");
        first.unwrap();
        second.unwrap();

        assert!(client.is_authenticated());
        assert_eq!(methods_seen(&seen), vec!["auth.login_with_api_key"]);
        assert_eq!(
            client.call(methods::PING, Vec::new()).await.unwrap(),
            json!("pong")
        );
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let client = client_with(FakeConnector::new(appliance), "bad-key");
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(ref m) if m == "invalid API key"));
        assert!(!client.is_authenticated());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_false_login_result_is_rejection() {
        let client = client_with(FakeConnector::new(|r| ok(r, json!(false))), "good-key");
        assert!(matches!(
            client.connect().await,
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let mut connector = FakeConnector::new(appliance);
        connector.refuse = true;
        let client = client_with(connector, "good-key");
        let err = client.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_call_requires_connection() {
        let client = client_with(FakeConnector::new(appliance), "good-key");
        let err = client.call(methods::PING, Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_request_ids_are_monotonic() {
        let connector = FakeConnector::new(appliance);
        let seen = connector.seen.clone();
        let client = connected(connector).await;
        client.call(methods::PING, Vec::new()).await.unwrap();
        client.call(methods::PING, Vec::new()).await.unwrap();

        let ids: Vec<u64> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_out_of_order_replies_are_routed_by_id() {
        // Hold the first echo until the second arrives, then answer both in
        // reverse order.
        let held: Arc<StdMutex<Option<Value>>> = Arc::new(StdMutex::new(None));
        let connector = FakeConnector::new(move |request| {
            if is_login(request) {
                return ok(request, json!(true));
            }
            let mut slot = held.lock().unwrap();
            match slot.take() {
                None => {
                    *slot = Some(request.clone());
                    Vec::new()
                }
                Some(first) => vec![
                    reply(request, request["params"][0].clone()),
                    reply(&first, first["params"][0].clone()),
                ],
            }
        });
        let client = Arc::new(connected(connector).await);

        let a = tokio::spawn({
            let client = client.clone();
            async move { client.call("test.echo", vec![json!("a")]).await }
        });
        let b = tokio::spawn({
            let client = client.clone();
            async move { client.call("test.echo", vec![json!("b")]).await }
        });

        assert_eq!(a.await.unwrap().unwrap(), json!("a"));
        assert_eq!(b.await.unwrap().unwrap(), json!("b"));
    }

    #[tokio::test]
    async fn test_concurrent_calls_get_their_own_replies() {
        let connector = FakeConnector::new(|request| {
            if is_login(request) {
                return ok(request, json!(true));
            }
            ok(request, json!({"echo": request["params"][0]}))
        });
        let client = Arc::new(connected(connector).await);

        let mut handles = Vec::new();
        for i in 0..20 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let result = client.call("test.echo", vec![json!(i)]).await.unwrap();
                assert_eq!(result, json!({"echo": i}));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_notifications_and_stray_replies_are_skipped() {
        let connector = FakeConnector::new(|request| {
            if is_login(request) {
                return ok(request, json!(true));
            }
            vec![
                json!({"jsonrpc": "2.0", "method": "collection_update", "params": {}}).to_string(),
                json!({"id": 9999, "jsonrpc": "2.0", "result": "stray"}).to_string(),
                reply(request, json!("pong")),
            ]
        });
        let client = connected(connector).await;
        assert_eq!(
            client.call(methods::PING, Vec::new()).await.unwrap(),
            json!("pong")
        );
    }

    #[tokio::test]
    async fn test_api_error() {
        let client = connected(FakeConnector::new(appliance)).await;
        match client.get_app_status("ghost").await.unwrap_err() {
            Error::Api {
                method,
                code,
                message,
            } => {
                assert_eq!(method, "app.get_instance");
                assert_eq!(code, 22);
                assert_eq!(message, "app not found");
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_reply() {
        let connector = FakeConnector::new(|request| {
            if is_login(request) {
                return ok(request, json!(true));
            }
            vec!["this is not json".to_string()]
        });
        let client = connected(connector).await;
        let err = client.call(methods::PING, Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedReply(_)));
        // A bad frame does not tear down the connection.
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn test_channel_close_fails_pending_call() {
        let client = connected(FakeConnector::new(appliance)).await;

        let err = client.call("test.hangup", Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::Connection(ref m) if m == "connection closed"));
        assert!(!client.is_authenticated());
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // A later operation reconnects on a fresh channel.
        assert!(client.test_connection().await.unwrap());
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_timeout() {
        let connector = FakeConnector::new(|request| {
            if is_login(request) {
                return ok(request, json!(true));
            }
            Vec::new()
        });
        let client = client_with(connector, "good-key")
            .with_request_timeout(Some(Duration::from_millis(50)));
        client.connect().await.unwrap();
        let err = client.call(methods::PING, Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { ref method } if method == "core.ping"));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let client = connected(FakeConnector::new(appliance)).await;
        client.disconnect().await;
        assert!(!client.is_authenticated());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            client.call(methods::PING, Vec::new()).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_test_connection_connects_first() {
        let connector = FakeConnector::new(appliance);
        let seen = connector.seen.clone();
        let client = client_with(connector, "good-key");
        assert!(client.test_connection().await.unwrap());
        assert_eq!(
            methods_seen(&seen),
            vec!["auth.login_with_api_key", "core.ping"]
        );
    }

    #[tokio::test]
    async fn test_list_apps_filters_case_insensitively() {
        let client = connected(FakeConnector::new(appliance)).await;

        let all = client.list_apps(StatusFilter::All).await.unwrap();
        assert_eq!(all.len(), 3);

        let running: Vec<String> = client
            .list_apps(StatusFilter::Running)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(running, vec!["web", "cache"]);
    }

    #[tokio::test]
    async fn test_get_app_status() {
        let client = connected(FakeConnector::new(appliance)).await;
        assert_eq!(client.get_app_status("web").await.unwrap(), "running");
    }

    #[tokio::test]
    async fn test_deploy_sends_descriptor_then_starts() {
        let connector = FakeConnector::new(appliance);
        let seen = connector.seen.clone();
        let client = connected(connector).await;

        client.deploy_app("my-web", COMPOSE, true).await.unwrap();

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests[1]["method"], "app.create");
        let descriptor = &requests[1]["params"][0];
        assert_eq!(descriptor["name"], "my-web");
        assert_eq!(
            descriptor["image"],
            json!({"repository": "nginx", "tag": "1.25"})
        );
        assert_eq!(
            descriptor["network"]["port_forwards"],
            json!([{"host_port": 8080, "container_port": 80, "protocol": "tcp"}])
        );
        assert_eq!(descriptor["restart_policy"], "unless-stopped");
        assert_eq!(requests[2]["method"], "app.start");
        assert_eq!(requests[2]["params"], json!(["my-web"]));
    }

    #[tokio::test]
    async fn test_deploy_without_start() {
        let connector = FakeConnector::new(appliance);
        let seen = connector.seen.clone();
        let client = connected(connector).await;
        client.deploy_app("my-web", COMPOSE, false).await.unwrap();
        assert_eq!(
            methods_seen(&seen),
            vec!["auth.login_with_api_key", "app.create"]
        );
    }

    #[tokio::test]
    async fn test_deploy_conversion_error_sends_nothing() {
        let connector = FakeConnector::new(appliance);
        let seen = connector.seen.clone();
        let client = connected(connector).await;
        let err = client
            .deploy_app("my-web", "version: '3'\nservices: {}\n", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
        assert_eq!(methods_seen(&seen), vec!["auth.login_with_api_key"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_params() {
        let connector = FakeConnector::new(appliance);
        let seen = connector.seen.clone();
        let client = connected(connector).await;

        client.update_app("my-web", COMPOSE, true).await.unwrap();
        client.delete_app("my-web", true).await.unwrap();

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests[1]["method"], "app.update");
        assert_eq!(requests[1]["params"][0], "my-web");
        assert_eq!(requests[1]["params"][1]["name"], "my-web");
        assert_eq!(requests[2]["method"], "app.delete");
        assert_eq!(requests[2]["params"], json!(["my-web", true]));
    }

    #[tokio::test]
    async fn test_logs_are_unsupported() {
        let client = connected(FakeConnector::new(appliance)).await;

        match client.get_app_logs("web", 100, Some("worker")).await {
            Err(Error::Unsupported(message)) => {
                assert!(message.contains("'web'"));
                assert!(message.contains("def456-worker"));
            }
            other => panic!("expected unsupported, got {:?}", other),
        }

        match client.get_app_logs("empty", 100, None).await {
            Err(Error::NoContainers { app }) => assert_eq!(app, "empty"),
            other => panic!("expected no containers, got {:?}", other),
        }
    }
}
