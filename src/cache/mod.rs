//! Single-slot frame cache
//!
//! The cache holds the most recent frame and nothing else. The feed
//! ingestion loop is its only writer; every HTTP viewer is a reader.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<FrameCache>
//!                  ┌─────────────────────────┐
//!                  │ slot: Mutex<Option<     │
//!                  │   Frame>>               │
//!                  │ generation: watch::Tx   │
//!                  └───────────┬─────────────┘
//!                              │
//!       ┌──────────────────────┼──────────────────────┐
//!       │                      │                      │
//!       ▼                      ▼                      ▼
//!  [Feed ingest]          [Viewer]               [Viewer]
//!  publish()              next_frame()           next_frame()
//!       │                      │                      │
//!       └──► replace slot ──► wake ──► snapshot() ──► TCP
//! ```
//!
//! # Snapshots
//!
//! A publish moves the decoded `Bytes` into the slot and drops whatever was
//! there. A snapshot clones the `Frame` under the lock; the payload itself
//! is immutable and reference counted, so readers get a private view that
//! can never be torn by a concurrent publish.

pub mod config;
pub mod frame;
pub mod store;

pub use config::CacheConfig;
pub use frame::Frame;
pub use store::{CacheStats, FrameCache, FrameWatch};
