//! Configuration loading and validation
//!
//! Settings come from a single YAML file. Everything the process talks to is
//! named here: the NATS servers for gorouter registration, the routing API and
//! UAA endpoints with their client credentials, the app domain suffix for HTTP
//! route names, and the kubeconfig path for cluster access.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cloudfoundry::message_bus::MessageBusServer;
use crate::{Error, Result};

fn default_sync_interval_secs() -> u64 {
    30
}

/// Settings for the route-sync process
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// NATS servers the gorouter registration bus connects to
    pub nats_servers: Vec<MessageBusServer>,
    /// Routing API base URL, e.g. `https://api.cf.example.com`
    pub routing_api_url: String,
    /// Domain suffix appended to `http-route-sync` label values
    pub app_domain: String,
    /// UAA base URL, e.g. `https://uaa.cf.example.com:8443`
    pub uaa_url: String,
    /// OAuth client name for the routing API
    pub routing_api_client_name: String,
    /// OAuth client secret for the routing API
    pub routing_api_client_secret: String,
    /// Accept self-signed certificates from UAA and the routing API
    #[serde(default)]
    pub skip_tls_verification: bool,
    /// Kubeconfig path; falls back to in-cluster/default inference when unset
    #[serde(default)]
    pub kube_config_path: Option<PathBuf>,
    /// Seconds between reconciliation cycles
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
}

impl Config {
    /// Load and validate a config from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| Error::config(format!("reading {}: {err}", path.display())))?;
        let config: Config = serde_yaml::from_str(&raw)
            .map_err(|err| Error::config(format!("parsing {}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.nats_servers.is_empty() {
            return Err(Error::config("no NATS servers specified"));
        }
        if self.routing_api_url.is_empty() {
            return Err(Error::config("routing_api_url required"));
        }
        if self.app_domain.is_empty() {
            return Err(Error::config("app_domain required"));
        }
        if self.uaa_url.is_empty() {
            return Err(Error::config("uaa_url required"));
        }
        if self.routing_api_client_name.is_empty() {
            return Err(Error::config("routing_api_client_name required"));
        }
        Ok(())
    }
}
