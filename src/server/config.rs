//! Relay server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::protocol::constants::{DEFAULT_FEED_PORT, DEFAULT_HTTP_PORT};
use crate::relay::PeerRelayConfig;

/// Relay server configuration options
///
/// Each surface (feed ingest, live view, peer relay) is optional, so the
/// same server type runs a transmit node (feed + live view + star relay)
/// or a bare mesh node (peer relay only).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the producer connects to (None = no feed ingest)
    pub feed_addr: Option<SocketAddr>,

    /// Address of the HTTP live view (None = no live view)
    pub http_addr: Option<SocketAddr>,

    /// Peer relay settings (None = no peer relay)
    pub peer_relay: Option<PeerRelayConfig>,

    /// Maximum concurrent live viewers (0 = unlimited)
    pub max_viewers: usize,

    /// Feed read timeout; a silent producer is disconnected after this
    pub idle_timeout: Duration,

    /// Longest a viewer waits between cache checks when no frame arrives
    pub pacing_interval: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Frame cache settings
    pub cache: CacheConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            feed_addr: Some(SocketAddr::from(([0, 0, 0, 0], DEFAULT_FEED_PORT))),
            http_addr: Some(SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT))),
            peer_relay: None,
            max_viewers: 8,
            idle_timeout: Duration::from_secs(10),
            pacing_interval: Duration::from_millis(30),
            tcp_nodelay: true, // Important for low latency
            cache: CacheConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Config with only a peer relay, no feed and no live view
    pub fn relay_only(peer_relay: PeerRelayConfig) -> Self {
        Self {
            feed_addr: None,
            http_addr: None,
            peer_relay: Some(peer_relay),
            ..Default::default()
        }
    }

    /// Set the feed ingest address
    pub fn feed_addr(mut self, addr: SocketAddr) -> Self {
        self.feed_addr = Some(addr);
        self
    }

    /// Set the live view address
    pub fn http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = Some(addr);
        self
    }

    /// Disable feed ingest
    pub fn disable_feed(mut self) -> Self {
        self.feed_addr = None;
        self
    }

    /// Disable the live view
    pub fn disable_http(mut self) -> Self {
        self.http_addr = None;
        self
    }

    /// Enable the peer relay
    pub fn peer_relay(mut self, config: PeerRelayConfig) -> Self {
        self.peer_relay = Some(config);
        self
    }

    /// Set maximum concurrent viewers
    pub fn max_viewers(mut self, max: usize) -> Self {
        self.max_viewers = max;
        self
    }

    /// Set the feed idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the viewer pacing interval
    pub fn pacing_interval(mut self, interval: Duration) -> Self {
        self.pacing_interval = interval;
        self
    }

    /// Set the frame cache configuration
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}
