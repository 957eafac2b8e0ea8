//! feed-relay: two-hop video and telemetry relay
//!
//! A producer pushes length-prefixed frames (typically JPEG) to a transmit
//! node. The node keeps only the latest frame, serves it to any number of
//! browsers as an MJPEG stream, and relays raw bytes from nearby peers
//! either to an upstream base station (star) or to each other (mesh).
//!
//! ```text
//!  search node ──frames──► transmit node ──MJPEG──► browsers
//!                              │
//!  peers ──raw bytes──────────►├──► base station   (star)
//!                              └──► other peers     (mesh)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use feed_relay::{PeerRelayConfig, RelayConfig, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> feed_relay::error::Result<()> {
//!     let config = RelayConfig::default().peer_relay(PeerRelayConfig::star(
//!         "0.0.0.0:8001".parse().unwrap(),
//!         "192.168.4.2:9000".parse().unwrap(),
//!     ));
//!
//!     let server = RelayServer::new(config);
//!     server.run().await
//! }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod stats;

pub use cache::{Frame, FrameCache};
pub use client::{CapturedFrame, ClientConfig, FeedPublisher, FrameSource};
pub use error::{Error, Result};
pub use relay::{PeerRelayConfig, RelayPolicy};
pub use server::{RelayConfig, RelayServer};
pub use stats::RelayStats;
