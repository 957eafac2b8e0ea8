//! Peer relay configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::{DEFAULT_FEED_PORT, MAX_CLIENTS, RELAY_CHUNK_SIZE};

/// Where bytes read from a peer slot go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPolicy {
    /// Forward every peer's bytes to one upstream sink
    Star {
        /// Address of the upstream sink
        upstream: SocketAddr,
    },
    /// Forward every peer's bytes to all other peers
    Mesh,
}

/// Peer relay configuration options
#[derive(Debug, Clone)]
pub struct PeerRelayConfig {
    /// Address peers connect to
    pub bind_addr: SocketAddr,

    /// Forwarding policy
    pub policy: RelayPolicy,

    /// Size of the peer slot table (hard admission ceiling)
    pub max_clients: usize,

    /// Maximum bytes drained from one peer per read
    pub chunk_size: usize,

    /// Per-destination write timeout
    pub write_timeout: Duration,

    /// Fixed delay between upstream connect attempts
    pub reconnect_interval: Duration,

    /// Upstream connect timeout
    pub connect_timeout: Duration,

    /// Interval at which dead slots are reaped when the relay is idle
    pub reap_interval: Duration,

    /// Enable TCP_NODELAY on peer and upstream sockets
    pub tcp_nodelay: bool,
}

impl Default for PeerRelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_FEED_PORT)),
            policy: RelayPolicy::Mesh,
            max_clients: MAX_CLIENTS,
            chunk_size: RELAY_CHUNK_SIZE,
            write_timeout: Duration::from_secs(2),
            reconnect_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            reap_interval: Duration::from_secs(1),
            tcp_nodelay: true,
        }
    }
}

impl PeerRelayConfig {
    /// Mesh broadcast on `addr`
    pub fn mesh(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Star relay on `addr`, forwarding to `upstream`
    pub fn star(addr: SocketAddr, upstream: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            policy: RelayPolicy::Star { upstream },
            ..Default::default()
        }
    }

    /// Set the slot table size
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max.max(1);
        self
    }

    /// Set the per-read chunk size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the per-destination write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the upstream reconnect interval
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the idle reap interval
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PeerRelayConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_FEED_PORT);
        assert_eq!(config.policy, RelayPolicy::Mesh);
        assert_eq!(config.max_clients, 6);
        assert_eq!(config.chunk_size, 256);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_star() {
        let addr: SocketAddr = "0.0.0.0:8001".parse().unwrap();
        let upstream: SocketAddr = "192.168.4.2:9000".parse().unwrap();
        let config = PeerRelayConfig::star(addr, upstream);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.policy, RelayPolicy::Star { upstream });
    }

    #[test]
    fn test_builder_floors() {
        let config = PeerRelayConfig::default().max_clients(0).chunk_size(0);

        assert_eq!(config.max_clients, 1);
        assert_eq!(config.chunk_size, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = PeerRelayConfig::mesh("127.0.0.1:0".parse().unwrap())
            .max_clients(2)
            .chunk_size(512)
            .write_timeout(Duration::from_millis(500))
            .reconnect_interval(Duration::from_millis(50))
            .reap_interval(Duration::from_millis(100));

        assert_eq!(config.max_clients, 2);
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.write_timeout, Duration::from_millis(500));
        assert_eq!(config.reconnect_interval, Duration::from_millis(50));
        assert_eq!(config.reap_interval, Duration::from_millis(100));
    }
}
