//! route-sync - advertise Kubernetes service routes to Cloud Foundry

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use route_sync::app::Application;
use route_sync::cloudfoundry::message_bus::NatsBus;
use route_sync::cloudfoundry::routing_api::RoutingApiClient;
use route_sync::cloudfoundry::CloudFoundryRouter;
use route_sync::config::Config;
use route_sync::kubernetes::{KubeClusterClient, KubernetesSource};
use route_sync::pooler::Pooler;
use route_sync::uaa::{UaaClient, UaaConfig, DEFAULT_EXPIRATION_BUFFER};
use route_sync::{Error, Result};

/// route-sync - continuous Kubernetes-to-Cloud-Foundry route reconciliation
#[derive(Parser, Debug)]
#[command(name = "route-sync", version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(
        short = 'c',
        long = "config",
        env = "ROUTE_SYNC_CONFIG",
        default_value = "route-sync.yml"
    )]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // All fatal errors funnel through this single exit point; the
    // reconciliation core itself never terminates the process.
    if let Err(err) = run(&cli).await {
        error!(%err, "route-sync failed");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(&cli.config_file)?;
    info!(config = %cli.config_file.display(), "configuration loaded");

    let kube_client = build_kube_client(&config).await?;
    let source = Arc::new(KubernetesSource::new(
        Arc::new(KubeClusterClient::new(kube_client)),
        config.app_domain.clone(),
    ));

    let uaa = Arc::new(UaaClient::new(UaaConfig {
        endpoint: config.uaa_url.clone(),
        client_name: config.routing_api_client_name.clone(),
        client_secret: config.routing_api_client_secret.clone(),
        skip_tls_verification: config.skip_tls_verification,
        expiration_buffer: DEFAULT_EXPIRATION_BUFFER,
    })?);
    let routing_api = Arc::new(RoutingApiClient::new(
        config.routing_api_url.clone(),
        uaa,
        config.skip_tls_verification,
    )?);
    let router = Arc::new(CloudFoundryRouter::new(
        Arc::new(NatsBus::new()),
        routing_api,
    ));

    let pooler = Pooler::by_time(Duration::from_secs(config.sync_interval_secs));
    let app = Application::new(pooler, source, router);
    app.run(&config.nats_servers, CancellationToken::new()).await
}

async fn build_kube_client(config: &Config) -> Result<Client> {
    match &config.kube_config_path {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|err| Error::config(format!("reading kubeconfig: {err}")))?;
            let kube_config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|err| Error::config(format!("loading kubeconfig: {err}")))?;
            Ok(Client::try_from(kube_config)?)
        }
        None => Client::try_default()
            .await
            .map_err(|err| Error::config(format!("inferring kubernetes config: {err}"))),
    }
}
