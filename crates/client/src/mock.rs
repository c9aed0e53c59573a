//! In-memory backend for development without an appliance.

use crate::backend::{AppBackend, AppInstance, StatusFilter};
use crate::rpc::methods;
use async_trait::async_trait;
use indexmap::IndexMap;
use nasdeploy_common::{Error, Result, Timestamp};
use nasdeploy_compose::{convert, TargetDescriptor};
use serde_json::{json, Map};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Mock log output is capped at this many lines.
pub const MAX_MOCK_LOG_LINES: usize = 20;

const LOG_LEVELS: [&str; 4] = ["INFO", "WARN", "ERROR", "DEBUG"];
const LOG_MESSAGES: [&str; 8] = [
    "Service started successfully",
    "Processing request",
    "Database connection established",
    "Configuration loaded",
    "Health check passed",
    "Request completed",
    "Cache updated",
    "Background task finished",
];

#[derive(Debug, Clone)]
struct MockApp {
    status: String,
    containers: Vec<String>,
    ports: Vec<String>,
    created: Timestamp,
    descriptor: Option<TargetDescriptor>,
}

impl MockApp {
    fn seeded(name: &str, status: &str, service: &str, port: &str, created: &str) -> Result<Self> {
        Ok(Self {
            status: status.to_string(),
            containers: vec![format!("{}-{}-1", name, service)],
            ports: vec![port.to_string()],
            created: Timestamp::parse_rfc3339(created)?,
            descriptor: None,
        })
    }

    fn instance(&self, name: &str) -> AppInstance {
        let mut extra = Map::new();
        extra.insert("containers".to_string(), json!(self.containers));
        extra.insert("ports".to_string(), json!(self.ports));
        extra.insert("created".to_string(), json!(self.created.to_iso8601()));
        AppInstance {
            name: name.to_string(),
            status: self.status.clone(),
            extra,
        }
    }
}

fn descriptor_ports(descriptor: &TargetDescriptor) -> Vec<String> {
    descriptor
        .network
        .port_forwards
        .iter()
        .flatten()
        .map(|p| format!("{}:{}", p.host_port, p.container_port))
        .collect()
}

fn not_found(method: &str, name: &str) -> Error {
    Error::api(method, format!("App '{}' not found", name))
}

/// Keeps a handful of apps in memory and answers like an appliance.
pub struct MockBackend {
    apps: Mutex<IndexMap<String, MockApp>>,
    authenticated: AtomicBool,
}

impl MockBackend {
    /// A backend seeded with three demo apps.
    pub fn new() -> Result<Self> {
        let mut apps = IndexMap::new();
        apps.insert(
            "nginx-demo".to_string(),
            MockApp::seeded("nginx-demo", "running", "web", "8080:80", "2025-07-30T10:00:00Z")?,
        );
        apps.insert(
            "plex-server".to_string(),
            MockApp::seeded("plex-server", "stopped", "plex", "32400:32400", "2025-07-29T15:30:00Z")?,
        );
        apps.insert(
            "home-assistant".to_string(),
            MockApp::seeded("home-assistant", "running", "hass", "8123:8123", "2025-07-28T09:15:00Z")?,
        );
        Ok(Self {
            apps: Mutex::new(apps),
            authenticated: AtomicBool::new(false),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn set_status(&self, method: &str, name: &str, status: &str) -> Result<()> {
        let mut apps = self.apps.lock().await;
        let app = apps.get_mut(name).ok_or_else(|| not_found(method, name))?;
        app.status = status.to_string();
        Ok(())
    }
}

#[async_trait]
impl AppBackend for MockBackend {
    async fn connect(&self) -> Result<()> {
        info!("Mock: Connecting to TrueNAS");
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        info!("Mock: Disconnecting from TrueNAS");
        self.authenticated.store(false, Ordering::SeqCst);
    }

    async fn test_connection(&self) -> Result<bool> {
        info!("Mock: Testing connection");
        self.connect().await?;
        Ok(true)
    }

    async fn list_apps(&self, filter: StatusFilter) -> Result<Vec<AppInstance>> {
        info!(filter = %filter, "Mock: Listing Custom Apps");
        let apps = self.apps.lock().await;
        Ok(apps
            .iter()
            .filter(|(_, app)| filter.matches(&app.status))
            .map(|(name, app)| app.instance(name))
            .collect())
    }

    async fn get_app_status(&self, name: &str) -> Result<String> {
        info!(app = name, "Mock: Getting app status");
        let apps = self.apps.lock().await;
        apps.get(name)
            .map(|app| app.status.clone())
            .ok_or_else(|| not_found(methods::APP_GET_INSTANCE, name))
    }

    async fn start_app(&self, name: &str) -> Result<()> {
        info!(app = name, "Mock: Starting app");
        self.set_status(methods::APP_START, name, "running").await
    }

    async fn stop_app(&self, name: &str) -> Result<()> {
        info!(app = name, "Mock: Stopping app");
        self.set_status(methods::APP_STOP, name, "stopped").await
    }

    async fn deploy_app(&self, name: &str, compose_yaml: &str, auto_start: bool) -> Result<()> {
        info!(app = name, auto_start, "Mock: Deploying app");
        let descriptor = convert(compose_yaml, name)?;

        let mut apps = self.apps.lock().await;
        if apps.contains_key(name) {
            warn!(app = name, "Mock: App already exists");
            return Err(Error::api(
                methods::APP_CREATE,
                format!("App '{}' already exists", name),
            ));
        }

        apps.insert(
            name.to_string(),
            MockApp {
                status: if auto_start { "running" } else { "stopped" }.to_string(),
                containers: vec![format!("{}-service-1", name)],
                ports: descriptor_ports(&descriptor),
                created: Timestamp::now(),
                descriptor: Some(descriptor),
            },
        );
        Ok(())
    }

    async fn update_app(&self, name: &str, compose_yaml: &str, force_recreate: bool) -> Result<()> {
        info!(app = name, force_recreate, "Mock: Updating app");
        let descriptor = convert(compose_yaml, name)?;

        let mut apps = self.apps.lock().await;
        let app = apps
            .get_mut(name)
            .ok_or_else(|| not_found(methods::APP_UPDATE, name))?;
        app.ports = descriptor_ports(&descriptor);
        app.descriptor = Some(descriptor);
        Ok(())
    }

    async fn delete_app(&self, name: &str, delete_volumes: bool) -> Result<()> {
        info!(app = name, delete_volumes, "Mock: Deleting app");
        self.apps
            .lock()
            .await
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(methods::APP_DELETE, name))
    }

    async fn get_app_logs(
        &self,
        name: &str,
        lines: usize,
        service: Option<&str>,
    ) -> Result<String> {
        info!(app = name, lines, service, "Mock: Getting app logs");
        if !self.apps.lock().await.contains_key(name) {
            return Err(not_found(methods::APP_CONTAINER_IDS, name));
        }

        let logs: Vec<String> = (0..lines.min(MAX_MOCK_LOG_LINES))
            .map(|i| {
                format!(
                    "[2025-07-30T12:{:02}:{:02}Z] {}: {}",
                    30 + i,
                    10 + (i * 7) % 50,
                    LOG_LEVELS[i % LOG_LEVELS.len()],
                    LOG_MESSAGES[i % LOG_MESSAGES.len()]
                )
            })
            .collect();
        Ok(logs.join("\n"))
    }
}
