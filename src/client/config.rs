//! Feed publisher configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::DEFAULT_FEED_PORT;

/// Feed publisher configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay feed address to connect to
    pub server_addr: SocketAddr,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Delay between reconnect attempts
    pub reconnect_interval: Duration,

    /// Delay between captures (100ms is about 10 fps)
    pub frame_interval: Duration,

    /// Per-frame write timeout
    pub write_timeout: Duration,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_FEED_PORT)),
            connect_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_millis(500),
            frame_interval: Duration::from_millis(100),
            write_timeout: Duration::from_secs(5),
            tcp_nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Config targeting the relay at `server_addr`
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Default::default()
        }
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect backoff
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the capture pacing
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set the per-frame write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}
