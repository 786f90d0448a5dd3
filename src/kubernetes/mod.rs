//! Kubernetes-backed route discovery
//!
//! Enumerates namespaces, nodes, and marker-labeled services to produce the
//! desired route set. A service opts in by carrying `tcp-route-sync` (value: the
//! externally advertised frontend port) or `http-route-sync` (value: the hostname
//! fragment, completed with the configured app domain). Absence of the label
//! excludes the service entirely.
//!
//! Every non-UDP, node-exposed service port becomes one route whose backends are
//! the node-port on every node internal IP. Iteration follows namespace, service,
//! and port list order; no sorting or de-duplication is applied.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, Service, ServicePort};
use kube::api::ListParams;
use kube::{Api, Client};
#[cfg(test)]
use mockall::automock;

use crate::route::{Endpoint, HttpRoute, Source, TcpRoute};
use crate::Result;

/// Marker label opting a service into TCP route discovery
pub const TCP_ROUTE_LABEL: &str = "tcp-route-sync";

/// Marker label opting a service into HTTP route discovery
pub const HTTP_ROUTE_LABEL: &str = "http-route-sync";

const INTERNAL_IP_TYPE: &str = "InternalIP";

/// Trait abstracting the Kubernetes list operations the source needs
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List all namespaces
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    /// List all nodes
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// List services in a namespace carrying the given label
    async fn list_services(&self, namespace: &str, label_selector: &str)
        -> Result<Vec<Service>>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_services(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .list(&ListParams::default().labels(label_selector))
            .await?
            .items)
    }
}

/// Route source backed by a Kubernetes cluster
pub struct KubernetesSource {
    client: Arc<dyn ClusterClient>,
    app_domain: String,
}

impl KubernetesSource {
    /// Create a source for the given cluster and app domain suffix
    pub fn new(client: Arc<dyn ClusterClient>, app_domain: impl Into<String>) -> Self {
        Self {
            client,
            app_domain: app_domain.into(),
        }
    }

    /// Internal IPs of all nodes, in node/address list order.
    ///
    /// Duplicates across nodes are preserved; backends fan out one entry per IP.
    async fn node_internal_ips(&self) -> Result<Vec<String>> {
        let nodes = self.client.list_nodes().await?;
        let mut ips = Vec::new();
        for node in nodes {
            let addresses = node
                .status
                .and_then(|status| status.addresses)
                .unwrap_or_default();
            for address in addresses {
                if address.type_ == INTERNAL_IP_TYPE {
                    ips.push(address.address);
                }
            }
        }
        Ok(ips)
    }

    /// Walk every marker-labeled service port, yielding routes via `emit`.
    async fn collect_routes<T>(
        &self,
        label: &str,
        emit: impl Fn(&Service, &ServicePort, Vec<Endpoint>) -> Option<T>,
    ) -> Result<Vec<T>> {
        let namespaces = self.client.list_namespaces().await?;
        let ips = self.node_internal_ips().await?;

        let mut routes = Vec::new();
        for namespace in &namespaces {
            let namespace_name = namespace.metadata.name.as_deref().unwrap_or_default();
            let services = self.client.list_services(namespace_name, label).await?;
            for service in &services {
                let ports = service
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.ports.clone())
                    .unwrap_or_default();
                for port in &ports {
                    let Some(node_port) = routable_node_port(port) else {
                        continue;
                    };
                    let backends = backends_for(&ips, node_port);
                    if let Some(route) = emit(service, port, backends) {
                        routes.push(route);
                    }
                }
            }
        }
        Ok(routes)
    }
}

#[async_trait]
impl Source for KubernetesSource {
    async fn tcp_routes(&self) -> Result<Vec<TcpRoute>> {
        self.collect_routes(TCP_ROUTE_LABEL, |service, _port, backends| {
            // The label value is the frontend port chosen by the service author;
            // unparseable or zero values exclude the port.
            let frontend = label_value(service, TCP_ROUTE_LABEL)?
                .parse::<u16>()
                .ok()
                .filter(|port| *port > 0)?;
            Some(TcpRoute { frontend, backends })
        })
        .await
    }

    async fn http_routes(&self) -> Result<Vec<HttpRoute>> {
        self.collect_routes(HTTP_ROUTE_LABEL, |service, _port, backends| {
            let host = label_value(service, HTTP_ROUTE_LABEL)?;
            Some(HttpRoute {
                name: format!("{}.{}", host, self.app_domain),
                backends,
            })
        })
        .await
    }
}

fn label_value<'a>(service: &'a Service, label: &str) -> Option<&'a str> {
    service
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(label))
        .map(String::as_str)
}

/// Node port of a routable service port: non-UDP and actually node-exposed.
fn routable_node_port(port: &ServicePort) -> Option<u16> {
    if port.protocol.as_deref() == Some("UDP") {
        return None;
    }
    let node_port = port.node_port.unwrap_or(0);
    if node_port <= 0 {
        return None;
    }
    u16::try_from(node_port).ok()
}

fn backends_for(ips: &[String], node_port: u16) -> Vec<Endpoint> {
    ips.iter()
        .map(|ip| Endpoint {
            ip: ip.clone(),
            port: node_port,
        })
        .collect()
}
