//! Relay engine
//!
//! A single task owns the peer slot table and, in star mode, the upstream
//! link. It wakes on three kinds of event: a new peer, a chunk read from a
//! peer, or a fresh upstream connection. After every event it reaps dead
//! slots, so the table never needs a lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::error::ConnectionError;
use crate::stats::RelayMetrics;

use super::config::{PeerRelayConfig, RelayPolicy};
use super::slots::{PeerSlots, RelayChunk};
use super::upstream::{UpstreamLink, UpstreamOptions};

/// Forwards bytes between peer slots and, in star mode, an upstream sink
pub struct RelayEngine {
    slots: PeerSlots,
    chunk_rx: mpsc::Receiver<RelayChunk>,
    upstream: Option<UpstreamLink>,
    write_timeout: Duration,
    reap_interval: Duration,
    metrics: Arc<RelayMetrics>,
}

impl RelayEngine {
    /// Create an engine for `config`
    ///
    /// In star mode this starts the upstream connector immediately, so it
    /// must be called from within a Tokio runtime.
    pub fn new(config: &PeerRelayConfig, metrics: Arc<RelayMetrics>) -> Self {
        let (slots, chunk_rx) =
            PeerSlots::new(config.max_clients, config.chunk_size, Arc::clone(&metrics));
        let slots = slots.with_nodelay(config.tcp_nodelay);

        let upstream = match config.policy {
            RelayPolicy::Star { upstream } => Some(UpstreamLink::spawn(UpstreamOptions {
                addr: upstream,
                connect_timeout: config.connect_timeout,
                reconnect_interval: config.reconnect_interval,
                write_timeout: config.write_timeout,
                tcp_nodelay: config.tcp_nodelay,
            })),
            RelayPolicy::Mesh => None,
        };

        Self {
            slots,
            chunk_rx,
            upstream,
            write_timeout: config.write_timeout,
            reap_interval: config.reap_interval,
            metrics,
        }
    }

    /// Serve peers accepted from `listener` until the task is aborted
    pub async fn run(mut self, listener: TcpListener) {
        let mut reap_ticker = tokio::time::interval(self.reap_interval);

        tracing::info!(
            addr = ?listener.local_addr().ok(),
            mode = if self.upstream.is_some() { "star" } else { "mesh" },
            capacity = self.slots.capacity(),
            "Peer relay listening"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        // Rejection is logged and counted by the table
                        let _ = self.slots.admit(stream, peer_addr);
                    }
                    Err(e) => {
                        let err = ConnectionError::AcceptFailed(e);
                        tracing::error!(error = %err, "Failed to accept peer");
                    }
                },
                Some(chunk) = self.chunk_rx.recv() => {
                    self.forward(chunk).await;
                }
                Some(stream) = next_upstream(&mut self.upstream) => {
                    if let Some(link) = self.upstream.as_mut() {
                        link.install(stream);
                    }
                }
                _ = reap_ticker.tick() => {}
            }

            self.slots.reap();
        }
    }

    async fn forward(&mut self, chunk: RelayChunk) {
        if self.upstream.is_some() {
            self.forward_upstream(chunk).await;
        } else {
            self.broadcast(chunk).await;
        }
    }

    /// Star relay: one chunk to the upstream sink, or nowhere
    async fn forward_upstream(&mut self, chunk: RelayChunk) {
        let len = chunk.data.len();
        let Some(link) = self.upstream.as_mut() else {
            return;
        };

        match link.forward(&chunk.data).await {
            Ok(()) => {
                self.metrics.chunk_relayed(len, 1);
                tracing::trace!(slot = chunk.slot, len = len, "Relayed bytes upstream");
            }
            Err(e) => {
                self.metrics.chunk_dropped(len);
                tracing::debug!(
                    slot = chunk.slot,
                    len = len,
                    error = %e,
                    "Upstream unavailable, chunk dropped"
                );
            }
        }
    }

    /// Mesh broadcast: one chunk to every live slot except its sender
    async fn broadcast(&mut self, chunk: RelayChunk) {
        let len = chunk.data.len();
        let mut delivered = 0;

        for (index, slot) in self.slots.iter_active_mut() {
            if slot.peer_id() == chunk.peer_id {
                continue;
            }

            match slot.send(&chunk.data, self.write_timeout).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    // Left for the next reap
                    tracing::debug!(slot = index, error = %e, "Peer write failed");
                    slot.mark_disconnected();
                }
            }
        }

        if delivered > 0 {
            self.metrics.chunk_relayed(len, delivered);
        } else {
            self.metrics.chunk_dropped(len);
        }

        tracing::debug!(
            slot = chunk.slot,
            len = len,
            destinations = delivered,
            "Relayed bytes"
        );
    }
}

async fn next_upstream(upstream: &mut Option<UpstreamLink>) -> Option<TcpStream> {
    match upstream {
        Some(link) => link.next_connection().await,
        None => std::future::pending().await,
    }
}
