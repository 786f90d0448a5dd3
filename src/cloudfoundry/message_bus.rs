//! NATS message bus for gorouter route registration
//!
//! HTTP routes are announced by publishing JSON registration messages on the
//! `router.register` subject. The connection is long-lived; the underlying client
//! pings and reconnects on its own, and connection events surface as log lines
//! only. Each publish is flushed so a send failure is observed by the caller that
//! triggered it.

use std::collections::HashMap;
use std::time::Duration;

use async_nats::ServerAddr;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::{Error, Result};

const PING_INTERVAL: Duration = Duration::from_secs(20);

/// One NATS server the bus may connect to
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct MessageBusServer {
    /// Server host (and port), e.g. `10.0.1.8:4222`
    pub host: String,
    /// NATS username
    pub user: String,
    /// NATS password
    pub password: String,
}

/// Wire shape of a gorouter registration message
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterMessage {
    /// Hostnames to register
    pub uris: Vec<String>,
    /// Backend IP
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Arbitrary route tags
    pub tags: HashMap<String, String>,
    /// Optional route service to front the route
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,
    /// Fixed per-process identifier of the registering component
    pub private_instance_id: String,
}

/// Trait abstracting the message bus for testability
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Establish the persistent connection to one of the given servers
    async fn connect(&self, servers: &[MessageBusServer]) -> Result<()>;

    /// Publish one registration message on the given subject
    async fn publish(&self, subject: &str, message: &RegisterMessage) -> Result<()>;
}

/// Real NATS-backed message bus
pub struct NatsBus {
    connection: RwLock<Option<async_nats::Client>>,
}

impl NatsBus {
    /// Create an unconnected bus; call `connect` before publishing
    pub fn new() -> Self {
        Self {
            connection: RwLock::new(None),
        }
    }
}

impl Default for NatsBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn connect(&self, servers: &[MessageBusServer]) -> Result<()> {
        let mut addresses: Vec<ServerAddr> = Vec::with_capacity(servers.len());
        for server in servers {
            let url = format!("nats://{}:{}@{}", server.user, server.password, server.host);
            addresses.push(url.parse().map_err(|err| {
                Error::message_bus(format!("invalid server address {}: {err}", server.host))
            })?);
        }

        let client = async_nats::ConnectOptions::new()
            .ping_interval(PING_INTERVAL)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Connected => info!("message bus connected"),
                    async_nats::Event::Disconnected => warn!("message bus disconnected"),
                    async_nats::Event::ClientError(err) => {
                        error!(%err, "message bus client error")
                    }
                    other => info!(event = %other, "message bus event"),
                }
            })
            .connect(addresses)
            .await
            .map_err(|err| Error::message_bus(format!("connecting to message bus: {err}")))?;

        info!(servers = servers.len(), "message bus connection established");
        *self.connection.write().await = Some(client);
        Ok(())
    }

    async fn publish(&self, subject: &str, message: &RegisterMessage) -> Result<()> {
        let connection = self.connection.read().await;
        let client = connection
            .as_ref()
            .ok_or_else(|| Error::message_bus("publish before connect"))?;

        let payload = serde_json::to_vec(message)
            .map_err(|err| Error::message_bus(format!("encoding message: {err}")))?;
        client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|err| Error::message_bus(format!("publishing to {subject}: {err}")))?;
        client
            .flush()
            .await
            .map_err(|err| Error::message_bus(format!("flushing publish to {subject}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_message_wire_shape() {
        let message = RegisterMessage {
            uris: vec!["example-app.cf.example.com".to_string()],
            host: "10.0.0.0".to_string(),
            port: 42,
            tags: HashMap::new(),
            route_service_url: None,
            private_instance_id: "kubo-route-sync".to_string(),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "uris": ["example-app.cf.example.com"],
                "host": "10.0.0.0",
                "port": 42,
                "tags": {},
                "private_instance_id": "kubo-route-sync",
            })
        );
        // route_service_url is omitted, not null, when unset
        assert!(json.get("route_service_url").is_none());
    }

    #[tokio::test]
    async fn publish_before_connect_is_an_error() {
        let bus = NatsBus::new();
        let message = RegisterMessage {
            uris: vec![],
            host: String::new(),
            port: 0,
            tags: HashMap::new(),
            route_service_url: None,
            private_instance_id: String::new(),
        };
        let err = bus.publish("router.register", &message).await.unwrap_err();
        assert!(err.to_string().contains("before connect"));
    }

    #[tokio::test]
    async fn connect_rejects_malformed_server_addresses() {
        let bus = NatsBus::new();
        let servers = vec![MessageBusServer {
            host: "not a host".to_string(),
            user: "nats".to_string(),
            password: "secret".to_string(),
        }];
        assert!(bus.connect(&servers).await.is_err());
    }
}
