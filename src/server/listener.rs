//! Relay server
//!
//! Binds the configured listeners and spawns one task per surface: feed
//! ingest, live view and peer relay. The server value is the context that
//! owns the frame cache and metrics shared by those tasks.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::cache::FrameCache;
use crate::error::Result;
use crate::relay::RelayEngine;
use crate::server::config::RelayConfig;
use crate::server::feed::FeedIngest;
use crate::server::http::{LiveView, LiveViewOptions};
use crate::stats::{RelayMetrics, RelayStats};

/// Relay server
pub struct RelayServer {
    config: RelayConfig,
    cache: Arc<FrameCache>,
    metrics: Arc<RelayMetrics>,
}

impl RelayServer {
    /// Create a new server with the given configuration
    pub fn new(config: RelayConfig) -> Self {
        let cache = Arc::new(FrameCache::with_config(config.cache.clone()));

        Self {
            config,
            cache,
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    /// Get a reference to the frame cache
    pub fn cache(&self) -> &Arc<FrameCache> {
        &self.cache
    }

    /// Get the server configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Read the current counters
    pub fn stats(&self) -> RelayStats {
        self.metrics.snapshot()
    }

    /// Bind every configured listener and spawn its task
    ///
    /// Fails only if a listener cannot be bound. Tasks run until the
    /// returned handle is shut down or dropped.
    pub async fn start(&self) -> Result<RunningRelay> {
        let mut running = RunningRelay {
            feed_addr: None,
            http_addr: None,
            peer_addr: None,
            tasks: Vec::new(),
        };

        if let Some(addr) = self.config.feed_addr {
            let listener = TcpListener::bind(addr).await?;
            running.feed_addr = Some(listener.local_addr()?);

            let ingest = FeedIngest::new(
                Arc::clone(&self.cache),
                Arc::clone(&self.metrics),
                self.config.idle_timeout,
                self.config.tcp_nodelay,
            );
            running.tasks.push(tokio::spawn(ingest.run(listener)));
        }

        if let Some(addr) = self.config.http_addr {
            let listener = TcpListener::bind(addr).await?;
            running.http_addr = Some(listener.local_addr()?);

            let live_view = LiveView::new(
                Arc::clone(&self.cache),
                Arc::clone(&self.metrics),
                LiveViewOptions {
                    max_viewers: self.config.max_viewers,
                    pacing_interval: self.config.pacing_interval,
                    tcp_nodelay: self.config.tcp_nodelay,
                },
            );
            running.tasks.push(tokio::spawn(live_view.run(listener)));
        }

        if let Some(ref peer_relay) = self.config.peer_relay {
            let listener = TcpListener::bind(peer_relay.bind_addr).await?;
            running.peer_addr = Some(listener.local_addr()?);

            let engine = RelayEngine::new(peer_relay, Arc::clone(&self.metrics));
            running.tasks.push(tokio::spawn(engine.run(listener)));
        }

        Ok(running)
    }

    /// Run the server
    ///
    /// This method blocks until the process exits.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let running = self.start().await?;

        shutdown.await;
        tracing::info!("Shutdown signal received");

        running.shutdown();
        Ok(())
    }
}

/// Handle on a started relay server
pub struct RunningRelay {
    feed_addr: Option<SocketAddr>,
    http_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningRelay {
    /// Bound feed ingest address
    pub fn feed_addr(&self) -> Option<SocketAddr> {
        self.feed_addr
    }

    /// Bound live view address
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Bound peer relay address
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Stop accepting on every listener
    ///
    /// Viewers already streaming keep going until their socket breaks.
    pub fn shutdown(self) {
        // Drop aborts the tasks
    }
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
