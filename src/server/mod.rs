//! Relay server
//!
//! A transmit node runs three surfaces over one shared frame cache:
//!
//! ```text
//!  producer ──TCP──► FeedIngest ──publish──► FrameCache ──snapshot──► LiveView ──HTTP──► viewers
//!
//!  peers ────TCP──► RelayEngine ──► upstream sink / other peers
//! ```

pub mod config;
pub mod feed;
pub mod http;
pub mod listener;

pub use config::RelayConfig;
pub use feed::FeedIngest;
pub use http::{LiveView, LiveViewOptions};
pub use listener::{RelayServer, RunningRelay};
