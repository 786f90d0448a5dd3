//! Application wiring and lifecycle
//!
//! Owns the cancellation trigger: the pooler runs under a token that is
//! cancelled either by the parent (tests, embedding) or by an interrupt watcher
//! spawned alongside it. The bus connection is established before the first
//! reconciliation cycle; its failure is fatal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cloudfoundry::message_bus::MessageBusServer;
use crate::pooler::Pooler;
use crate::route::{Router, Source};
use crate::Result;

/// Wires the source, router, and pooler together and drives them to completion
pub struct Application {
    pooler: Pooler,
    source: Arc<dyn Source>,
    router: Arc<dyn Router>,
}

impl Application {
    /// Create an application over the given components
    pub fn new(pooler: Pooler, source: Arc<dyn Source>, router: Arc<dyn Router>) -> Self {
        Self {
            pooler,
            source,
            router,
        }
    }

    /// Run until the pooler exits.
    ///
    /// The pooler stops when `shutdown` is cancelled (by the caller or by an
    /// interrupt) or when a reconciliation cycle fails; the first failure is
    /// returned for the caller to terminate on.
    pub async fn run(
        &self,
        bus_servers: &[MessageBusServer],
        shutdown: CancellationToken,
    ) -> Result<()> {
        self.router.connect(bus_servers).await?;

        let watcher = tokio::spawn(watch_for_interrupt(shutdown.clone()));

        let result = self
            .pooler
            .run(shutdown.clone(), self.source.as_ref(), self.router.as_ref())
            .await;

        // Stop the watcher if the pooler exited on its own.
        shutdown.cancel();
        let _ = watcher.await;

        info!("exiting");
        result
    }
}

/// Observe an OS interrupt and cancel the token exactly once.
///
/// Terminates silently when the token is already cancelled from elsewhere.
async fn watch_for_interrupt(shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(%err, "failed to listen for interrupt");
            } else {
                info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    }
}
