//! Peer relay
//!
//! Accepts a bounded number of raw TCP peers and forwards whatever they send,
//! without imposing any framing of its own.
//!
//! ```text
//!   Star (transmit node)             Mesh (primary node)
//!
//!   peer ─┐                          peer ◄──► engine ◄──► peer
//!   peer ─┼──► engine ──► upstream               ▲
//!   peer ─┘                                      ▼
//!                                               peer
//! ```
//!
//! In star mode bytes that arrive while the upstream is down are dropped:
//! the relay is best-effort and never buffers or pushes back on senders.

pub mod config;
pub mod engine;
pub mod slots;
pub mod upstream;

pub use config::{PeerRelayConfig, RelayPolicy};
pub use engine::RelayEngine;
pub use slots::{PeerSlot, PeerSlots, RelayChunk, SlotIndex};
pub use upstream::{UpstreamLink, UpstreamOptions};
