//! Authenticated routing API client for TCP routes
//!
//! Talks to the Cloud Foundry routing API: lists router groups and bulk-creates
//! TCP route mappings. Every request obtains a current bearer token first; an
//! absent or empty token is a hard error, never silently skipped. Created routes
//! carry a fixed TTL and expire at the routing tier unless re-advertised.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::route::TcpRoute;
use crate::uaa::TokenFetcher;
use crate::{Error, Result};

/// Seconds an unrefreshed TCP route advertisement stays alive at the routing tier
pub const TCP_ROUTE_TTL_SECS: u64 = 60;

const ROUTER_GROUPS_PATH: &str = "/routing/v1/router_groups";
const TCP_ROUTES_CREATE_PATH: &str = "/routing/v1/tcp_routes/create";

/// A named pool of reservable ports accepting Layer-4 traffic
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RouterGroup {
    /// Router group identifier
    pub guid: String,
    /// Human-readable name
    pub name: String,
    /// Port ranges this group may reserve, e.g. `1024-65535`
    pub reservable_ports: String,
    /// Group type, e.g. `tcp`
    #[serde(rename = "type")]
    pub group_type: String,
}

/// One entry in a bulk tcp_routes/create request
#[derive(Debug, Serialize, PartialEq, Eq)]
struct TcpRouteEntry {
    router_group_guid: String,
    port: u16,
    ttl: u64,
    backend_ip: String,
    backend_port: u16,
}

/// Trait abstracting the routing API for testability
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoutingApi: Send + Sync {
    /// Fetch all router groups
    async fn router_groups(&self) -> Result<Vec<RouterGroup>>;

    /// Create one route mapping per backend of every given route
    async fn create_routes(&self, router_group_guid: &str, routes: &[TcpRoute]) -> Result<()>;
}

/// Real routing API client over HTTP with per-request bearer auth
pub struct RoutingApiClient {
    api_url: String,
    http: reqwest::Client,
    tokens: Arc<dyn TokenFetcher>,
}

impl RoutingApiClient {
    /// Create a client for the given API base URL
    pub fn new(
        api_url: impl Into<String>,
        tokens: Arc<dyn TokenFetcher>,
        skip_tls_verification: bool,
    ) -> Result<Self> {
        let api_url = api_url.into();
        if api_url.is_empty() {
            return Err(Error::config("routing API URL required"));
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(skip_tls_verification)
            .build()?;
        Ok(Self {
            api_url,
            http,
            tokens,
        })
    }

    async fn authorization_header(&self) -> Result<String> {
        let token = self.tokens.fetch_token(false).await?;
        if token.access_token.is_empty() {
            return Err(Error::auth("UAA returned an empty access token"));
        }
        Ok(format!("bearer {}", token.access_token))
    }
}

#[async_trait]
impl RoutingApi for RoutingApiClient {
    async fn router_groups(&self) -> Result<Vec<RouterGroup>> {
        let url = format!("{}{}", self.api_url, ROUTER_GROUPS_PATH);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, self.authorization_header().await?)
            .send()
            .await
            .map_err(|err| Error::routing_api(format!("listing router groups: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| Error::routing_api(format!("reading router groups: {err}")))?;
        if !status.is_success() {
            return Err(Error::routing_api(format!(
                "listing router groups returned {status}: {body}"
            )));
        }

        serde_json::from_str(&body).map_err(|err| {
            Error::routing_api(format!("decoding router groups: {err}, body: {body}"))
        })
    }

    async fn create_routes(&self, router_group_guid: &str, routes: &[TcpRoute]) -> Result<()> {
        let entries: Vec<TcpRouteEntry> = routes
            .iter()
            .flat_map(|route| {
                route.backends.iter().map(|backend| TcpRouteEntry {
                    router_group_guid: router_group_guid.to_string(),
                    port: route.frontend,
                    ttl: TCP_ROUTE_TTL_SECS,
                    backend_ip: backend.ip.clone(),
                    backend_port: backend.port,
                })
            })
            .collect();

        let url = format!("{}{}", self.api_url, TCP_ROUTES_CREATE_PATH);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, self.authorization_header().await?)
            .json(&entries)
            .send()
            .await
            .map_err(|err| Error::routing_api(format!("creating tcp routes: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::routing_api(format!(
                "creating tcp routes returned {status}: {body}"
            )));
        }
        Ok(())
    }
}
