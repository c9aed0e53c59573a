//! Duplex text channels to the appliance.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use nasdeploy_common::{Config, Endpoint, Error, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector as TlsConnector};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 64;
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Both halves of an open connection. Dropping `outbound` closes it;
/// `inbound` yields `None` once the remote side is gone.
#[derive(Debug)]
pub struct Duplex {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Opens connections to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Duplex>;
}

/// WebSocket connector with optional TLS verification.
pub struct WebSocketConnector {
    verify_tls: bool,
    keepalive: Duration,
}

impl WebSocketConnector {
    pub fn new(verify_tls: bool) -> Self {
        Self {
            verify_tls,
            keepalive: KEEPALIVE_INTERVAL,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.verify_tls)
    }

    fn tls_connector(&self, endpoint: &Endpoint) -> Result<Option<TlsConnector>> {
        if !endpoint.scheme.is_secure() {
            return Ok(None);
        }

        let mut builder = native_tls::TlsConnector::builder();
        if !self.verify_tls {
            warn!(
                host = %endpoint.host,
                "SSL certificate verification is DISABLED. This is insecure and should only be used in development."
            );
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        let tls = builder
            .build()
            .map_err(|e| Error::Connection(format!("TLS setup failed: {}", e)))?;
        Ok(Some(TlsConnector::NativeTls(tls)))
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Duplex> {
        let url = endpoint.url();
        info!(url = %url, "Opening WebSocket");

        let tls = self.tls_connector(endpoint)?;
        let (socket, _) = connect_async_tls_with_config(url.as_str(), None, false, tls)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (outbound, mut outbound_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let keepalive = self.keepalive;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(keepalive);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => match frame {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                warn!(error = %e, "WebSocket send failed");
                                break;
                            }
                        }
                        None => {
                            let _ = sink.close().await;
                            debug!("WebSocket writer closed");
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                            warn!(error = %e, "Keep-alive ping failed");
                            break;
                        }
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("Dropping non UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "WebSocket closed by peer");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "WebSocket receive failed");
                        break;
                    }
                };
                if inbound_tx.send(text).await.is_err() {
                    break;
                }
            }
        });

        Ok(Duplex { outbound, inbound })
    }
}
