//! Time-driven reconciliation loop
//!
//! Drives Source -> Router on a fixed interval. The first tick fires
//! immediately; each subsequent tick is scheduled from the end of the previous
//! one, so a slow tick delays the next by its own duration and ticks never
//! overlap. Any error inside a tick propagates to the caller with no retry: the
//! process crashes loudly and the supervisor restarts it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::route::{Router, Source};
use crate::Result;

/// Fixed-interval reconciliation driver
pub struct Pooler {
    interval: Duration,
}

impl Pooler {
    /// Create a pooler that reconciles every `interval`
    pub fn by_time(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run the loop until cancelled or a tick fails.
    ///
    /// Cancellation is observed between ticks; an in-progress tick runs to
    /// completion (already-issued calls are never rolled back).
    pub async fn run(
        &self,
        shutdown: CancellationToken,
        source: &dyn Source,
        router: &dyn Router,
    ) -> Result<()> {
        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                // Cancellation wins when both are ready.
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {
                    self.tick(source, router).await?;
                    delay = self.interval;
                }
            }
        }
    }

    async fn tick(&self, source: &dyn Source, router: &dyn Router) -> Result<()> {
        let tcp_routes = source.tcp_routes().await?;
        router.register_tcp(&tcp_routes).await?;
        let http_routes = source.http_routes().await?;
        router.register_http(&http_routes).await?;
        info!(
            tcp_routes = tcp_routes.len(),
            http_routes = http_routes.len(),
            "registered routes"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::cloudfoundry::message_bus::MessageBusServer;
    use crate::route::{HttpRoute, TcpRoute};
    use crate::Error;

    /// Counts calls and records their interleaving across source and router.
    #[derive(Default)]
    struct CallLog {
        calls: std::sync::Mutex<Vec<&'static str>>,
        ticks: AtomicUsize,
    }

    impl CallLog {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
            if call == "router.http" {
                self.ticks.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct LoggingSource {
        log: Arc<CallLog>,
    }

    #[async_trait]
    impl Source for LoggingSource {
        async fn tcp_routes(&self) -> Result<Vec<TcpRoute>> {
            self.log.record("source.tcp");
            Ok(vec![])
        }

        async fn http_routes(&self) -> Result<Vec<HttpRoute>> {
            self.log.record("source.http");
            Ok(vec![])
        }
    }

    struct LoggingRouter {
        log: Arc<CallLog>,
    }

    #[async_trait]
    impl Router for LoggingRouter {
        async fn connect(&self, _servers: &[MessageBusServer]) -> Result<()> {
            Ok(())
        }

        async fn register_tcp(&self, _routes: &[TcpRoute]) -> Result<()> {
            self.log.record("router.tcp");
            Ok(())
        }

        async fn register_http(&self, _routes: &[HttpRoute]) -> Result<()> {
            self.log.record("router.http");
            Ok(())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl Source for FailingSource {
        async fn tcp_routes(&self) -> Result<Vec<TcpRoute>> {
            Err(Error::config("cluster unreachable"))
        }

        async fn http_routes(&self) -> Result<Vec<HttpRoute>> {
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_fires_immediately_and_calls_in_order() {
        let log = Arc::new(CallLog::default());
        let source = LoggingSource { log: log.clone() };
        let router = LoggingRouter { log: log.clone() };
        let pooler = Pooler::by_time(Duration::from_secs(30));
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        tokio::spawn(async move {
            // Virtual time: cancel after the immediate first tick but well
            // before the 30s re-arm.
            tokio::time::sleep(Duration::from_millis(1)).await;
            stop.cancel();
        });

        pooler.run(shutdown, &source, &router).await.unwrap();

        let calls = log.calls.lock().unwrap();
        assert_eq!(
            *calls,
            ["source.tcp", "router.tcp", "source.http", "router.http"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_rearm_after_the_interval() {
        let log = Arc::new(CallLog::default());
        let source = LoggingSource { log: log.clone() };
        let router = LoggingRouter { log: log.clone() };
        let pooler = Pooler::by_time(Duration::from_secs(30));
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        tokio::spawn(async move {
            // Ticks land at t=0, 30s, 60s, 90s in virtual time.
            tokio::time::sleep(Duration::from_secs(95)).await;
            stop.cancel();
        });

        pooler.run(shutdown, &source, &router).await.unwrap();
        assert_eq!(log.ticks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_before_start_skips_all_ticks() {
        let log = Arc::new(CallLog::default());
        let source = LoggingSource { log: log.clone() };
        let router = LoggingRouter { log: log.clone() };
        let pooler = Pooler::by_time(Duration::from_secs(30));

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        pooler.run(shutdown, &source, &router).await.unwrap();
        assert!(log.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_error_stops_the_loop_and_propagates() {
        let log = Arc::new(CallLog::default());
        let source = FailingSource;
        let router = LoggingRouter { log: log.clone() };
        let pooler = Pooler::by_time(Duration::from_millis(1));
        let shutdown = CancellationToken::new();

        let err = pooler.run(shutdown, &source, &router).await.unwrap_err();
        assert!(err.to_string().contains("cluster unreachable"));
        // The failing source call aborted the tick before any router call.
        assert!(log.calls.lock().unwrap().is_empty());
    }
}
