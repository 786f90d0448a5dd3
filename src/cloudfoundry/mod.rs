//! Cloud Foundry route publication
//!
//! The router wraps the two downstream registration channels: HTTP routes are
//! announced to the gorouter over NATS, TCP routes are submitted to the routing
//! API. Both are fail-fast; the first error in a batch aborts the rest and
//! surfaces unchanged to the caller.

pub mod message_bus;
pub mod routing_api;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::route::{HttpRoute, Router, TcpRoute};
use crate::{Error, Result};

use message_bus::{MessageBus, MessageBusServer, RegisterMessage};
use routing_api::RoutingApi;

/// Subject gorouter listens on for route registrations
pub const ROUTER_REGISTER_SUBJECT: &str = "router.register";

/// Fixed per-process identifier carried in every registration message
pub const PRIVATE_INSTANCE_ID: &str = "kubo-route-sync";

/// Route router for Cloud Foundry, wrapping the gorouter (NATS) and the
/// routing API (HTTP) registration channels
pub struct CloudFoundryRouter {
    bus: Arc<dyn MessageBus>,
    routing_api: Arc<dyn RoutingApi>,
}

impl CloudFoundryRouter {
    /// Create a router over the given bus and routing API
    pub fn new(bus: Arc<dyn MessageBus>, routing_api: Arc<dyn RoutingApi>) -> Self {
        Self { bus, routing_api }
    }

    /// The single configured router group.
    ///
    /// Zero or multiple groups is an unrecoverable configuration error;
    /// multi-router-group routing is not supported.
    async fn tcp_router_group_guid(&self) -> Result<String> {
        let mut groups = self.routing_api.router_groups().await?;
        if groups.len() != 1 {
            return Err(Error::routing_api(format!(
                "expected exactly one router group, found {}",
                groups.len()
            )));
        }
        Ok(groups.remove(0).guid)
    }
}

#[async_trait]
impl Router for CloudFoundryRouter {
    async fn connect(&self, servers: &[MessageBusServer]) -> Result<()> {
        self.bus.connect(servers).await
    }

    async fn register_tcp(&self, routes: &[TcpRoute]) -> Result<()> {
        let guid = self.tcp_router_group_guid().await?;
        self.routing_api.create_routes(&guid, routes).await
    }

    async fn register_http(&self, routes: &[HttpRoute]) -> Result<()> {
        for route in routes {
            for backend in &route.backends {
                let message = RegisterMessage {
                    uris: vec![route.name.clone()],
                    host: backend.ip.clone(),
                    port: backend.port,
                    tags: HashMap::new(),
                    route_service_url: None,
                    private_instance_id: PRIVATE_INSTANCE_ID.to_string(),
                };
                debug!(uri = %route.name, host = %backend.ip, port = backend.port, "announcing http route");
                self.bus.publish(ROUTER_REGISTER_SUBJECT, &message).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockall::predicate::eq;

    use crate::route::Endpoint;
    use message_bus::MockMessageBus;
    use routing_api::{MockRoutingApi, RouterGroup};

    fn router_group(guid: &str) -> RouterGroup {
        RouterGroup {
            guid: guid.to_string(),
            name: "default-tcp".to_string(),
            reservable_ports: "1024-65535".to_string(),
            group_type: "tcp".to_string(),
        }
    }

    fn http_route(name: &str, backends: &[(&str, u16)]) -> HttpRoute {
        HttpRoute {
            name: name.to_string(),
            backends: backends
                .iter()
                .map(|(ip, port)| Endpoint {
                    ip: ip.to_string(),
                    port: *port,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn publishes_one_message_per_backend() {
        let mut bus = MockMessageBus::new();
        bus.expect_publish()
            .withf(|subject, message| {
                subject == ROUTER_REGISTER_SUBJECT
                    && message.private_instance_id == "kubo-route-sync"
            })
            .times(3)
            .returning(|_, _| Ok(()));
        let routing_api = MockRoutingApi::new();

        let router = CloudFoundryRouter::new(Arc::new(bus), Arc::new(routing_api));
        let routes = vec![
            http_route("a.cf.example.com", &[("10.0.0.1", 42), ("10.0.0.2", 42)]),
            http_route("b.cf.example.com", &[("10.0.0.1", 43)]),
        ];
        router.register_http(&routes).await.unwrap();
    }

    #[tokio::test]
    async fn http_registration_stops_at_the_first_publish_failure() {
        let mut bus = MockMessageBus::new();
        bus.expect_publish()
            .times(1)
            .returning(|_, _| Err(Error::message_bus("connection lost")));
        let routing_api = MockRoutingApi::new();

        let router = CloudFoundryRouter::new(Arc::new(bus), Arc::new(routing_api));
        let routes = vec![
            http_route("a.cf.example.com", &[("10.0.0.1", 42), ("10.0.0.2", 42)]),
            http_route("b.cf.example.com", &[("10.0.0.1", 43)]),
        ];
        let err = router.register_http(&routes).await.unwrap_err();
        assert!(err.to_string().contains("connection lost"));
    }

    #[tokio::test]
    async fn registered_message_carries_uri_host_and_port() {
        let mut bus = MockMessageBus::new();
        bus.expect_publish()
            .withf(|_, message| {
                message.uris == vec!["example-app.cf.example.com".to_string()]
                    && message.host == "10.0.0.0"
                    && message.port == 42
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let router = CloudFoundryRouter::new(Arc::new(bus), Arc::new(MockRoutingApi::new()));
        let routes = vec![http_route("example-app.cf.example.com", &[("10.0.0.0", 42)])];
        router.register_http(&routes).await.unwrap();
    }

    #[tokio::test]
    async fn tcp_registration_requires_exactly_one_router_group() {
        for groups in [vec![], vec![router_group("a"), router_group("b")]] {
            let mut routing_api = MockRoutingApi::new();
            routing_api
                .expect_router_groups()
                .returning(move || Ok(groups.clone()));
            // No create call may be attempted.
            routing_api.expect_create_routes().times(0);

            let router =
                CloudFoundryRouter::new(Arc::new(MockMessageBus::new()), Arc::new(routing_api));
            let err = router.register_tcp(&[]).await.unwrap_err();
            assert!(err.to_string().contains("router group"));
        }
    }

    #[tokio::test]
    async fn tcp_registration_submits_under_the_single_group_guid() {
        let mut routing_api = MockRoutingApi::new();
        routing_api
            .expect_router_groups()
            .returning(|| Ok(vec![router_group("abc123")]));
        routing_api
            .expect_create_routes()
            .with(eq("abc123"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(()));

        let router =
            CloudFoundryRouter::new(Arc::new(MockMessageBus::new()), Arc::new(routing_api));
        let routes = vec![TcpRoute {
            frontend: 1010,
            backends: vec![Endpoint {
                ip: "10.0.0.2".to_string(),
                port: 5050,
            }],
        }];
        router.register_tcp(&routes).await.unwrap();
    }

    #[tokio::test]
    async fn router_group_fetch_failure_aborts_tcp_registration() {
        let mut routing_api = MockRoutingApi::new();
        routing_api
            .expect_router_groups()
            .returning(|| Err(Error::routing_api("status 500")));
        routing_api.expect_create_routes().times(0);

        let router =
            CloudFoundryRouter::new(Arc::new(MockMessageBus::new()), Arc::new(routing_api));
        assert!(router.register_tcp(&[]).await.is_err());
    }
}
