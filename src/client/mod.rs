//! Feed publisher
//!
//! Producer side of the relay: connects to a relay's feed port and pushes
//! length-prefixed frames captured from a [`FrameSource`].

pub mod config;
pub mod publisher;

pub use config::ClientConfig;
pub use publisher::{CapturedFrame, FeedPublisher, FrameSource, PublishEvent};
