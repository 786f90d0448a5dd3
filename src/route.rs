//! Route data model and the Source/Router seams
//!
//! Routes are plain value types rebuilt fresh each reconciliation cycle. A
//! [`Source`] produces the current desired set, a [`Router`] advertises it
//! downstream. One concrete implementation exists per side (Kubernetes source,
//! Cloud Foundry router); the traits keep the pooler and tests free of either.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::cloudfoundry::message_bus::MessageBusServer;
use crate::Result;

/// One concrete backend instance: an IP and a port reachable on it.
///
/// Endpoints have no identity beyond their field values; two endpoints with
/// equal fields are interchangeable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Backend IP address
    pub ip: String,
    /// Backend port
    pub port: u16,
}

/// A Layer-4 route: one externally advertised port mapped to all backends.
///
/// Backends may be empty (a route with no healthy backends is still submitted);
/// the frontend port is always non-zero, guaranteed at construction by the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpRoute {
    /// Externally advertised frontend port
    pub frontend: u16,
    /// Backends the frontend fans out to
    pub backends: Vec<Endpoint>,
}

/// A Layer-7 route: a fully qualified hostname mapped to all backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRoute {
    /// Fully qualified hostname to register
    pub name: String,
    /// Backends the hostname fans out to
    pub backends: Vec<Endpoint>,
}

/// Provides the current desired route set.
///
/// Both calls enumerate cluster state from scratch; no results are cached across
/// invocations and no partial results are returned on failure.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Source: Send + Sync {
    /// Discover the current set of TCP routes
    async fn tcp_routes(&self) -> Result<Vec<TcpRoute>>;

    /// Discover the current set of HTTP routes
    async fn http_routes(&self) -> Result<Vec<HttpRoute>>;
}

/// Advertises a route set downstream.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Router: Send + Sync {
    /// Establish the persistent message bus connection.
    ///
    /// Must be called once before any registration; failure is fatal to the
    /// process since the router cannot function without the bus.
    async fn connect(&self, servers: &[MessageBusServer]) -> Result<()>;

    /// Submit TCP routes to the routing API
    async fn register_tcp(&self, routes: &[TcpRoute]) -> Result<()>;

    /// Announce HTTP routes on the message bus
    async fn register_http(&self, routes: &[HttpRoute]) -> Result<()>;
}
