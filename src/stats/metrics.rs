//! Counters for feed ingest, live viewers and peer relaying
//!
//! Counters are plain atomics shared through an `Arc` by every task of a
//! relay server. Reading them produces a [`RelayStats`] value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters for one relay server
#[derive(Debug)]
pub struct RelayMetrics {
    started_at: Instant,

    feed_connections: AtomicU64,
    frames_received: AtomicU64,
    feed_bytes_received: AtomicU64,
    feed_errors: AtomicU64,

    viewers_total: AtomicU64,
    viewers_active: AtomicU64,
    parts_sent: AtomicU64,

    peers_admitted: AtomicU64,
    peers_rejected: AtomicU64,
    peers_reaped: AtomicU64,
    chunks_relayed: AtomicU64,
    bytes_relayed: AtomicU64,
    chunks_dropped: AtomicU64,
    bytes_dropped: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            feed_connections: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            feed_bytes_received: AtomicU64::new(0),
            feed_errors: AtomicU64::new(0),
            viewers_total: AtomicU64::new(0),
            viewers_active: AtomicU64::new(0),
            parts_sent: AtomicU64::new(0),
            peers_admitted: AtomicU64::new(0),
            peers_rejected: AtomicU64::new(0),
            peers_reaped: AtomicU64::new(0),
            chunks_relayed: AtomicU64::new(0),
            bytes_relayed: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
            bytes_dropped: AtomicU64::new(0),
        }
    }

    pub fn feed_connected(&self) {
        self.feed_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self, len: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.feed_bytes_received
            .fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn feed_error(&self) {
        self.feed_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn viewer_connected(&self) {
        self.viewers_total.fetch_add(1, Ordering::Relaxed);
        self.viewers_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn viewer_disconnected(&self) {
        self.viewers_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn part_sent(&self) {
        self.parts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_admitted(&self) {
        self.peers_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_rejected(&self) {
        self.peers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peers_reaped(&self, count: usize) {
        self.peers_reaped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// One chunk delivered to `destinations` sinks
    pub fn chunk_relayed(&self, len: usize, destinations: usize) {
        self.chunks_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_relayed
            .fetch_add((len * destinations) as u64, Ordering::Relaxed);
    }

    /// One chunk discarded because its sink was unavailable
    pub fn chunk_dropped(&self, len: usize) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
        self.bytes_dropped.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            uptime: self.started_at.elapsed(),
            feed_connections: self.feed_connections.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            feed_bytes_received: self.feed_bytes_received.load(Ordering::Relaxed),
            feed_errors: self.feed_errors.load(Ordering::Relaxed),
            viewers_total: self.viewers_total.load(Ordering::Relaxed),
            viewers_active: self.viewers_active.load(Ordering::Relaxed),
            parts_sent: self.parts_sent.load(Ordering::Relaxed),
            peers_admitted: self.peers_admitted.load(Ordering::Relaxed),
            peers_rejected: self.peers_rejected.load(Ordering::Relaxed),
            peers_reaped: self.peers_reaped.load(Ordering::Relaxed),
            chunks_relayed: self.chunks_relayed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RelayMetrics`]
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Time since the server started
    pub uptime: Duration,
    /// Feed connections accepted
    pub feed_connections: u64,
    /// Frames decoded from the feed
    pub frames_received: u64,
    /// Payload bytes decoded from the feed
    pub feed_bytes_received: u64,
    /// Feed connections dropped on error
    pub feed_errors: u64,
    /// Live viewers ever connected
    pub viewers_total: u64,
    /// Live viewers currently connected
    pub viewers_active: u64,
    /// Multipart parts written across all viewers
    pub parts_sent: u64,
    /// Peers installed in a slot
    pub peers_admitted: u64,
    /// Peers turned away because the slot table was full
    pub peers_rejected: u64,
    /// Dead slots reclaimed
    pub peers_reaped: u64,
    /// Chunks forwarded to at least one sink
    pub chunks_relayed: u64,
    /// Bytes written to sinks (counted once per destination)
    pub bytes_relayed: u64,
    /// Chunks dropped because no sink was available
    pub chunks_dropped: u64,
    /// Bytes dropped because no sink was available
    pub bytes_dropped: u64,
}

impl RelayStats {
    /// Average inbound feed bitrate in bits per second
    pub fn feed_bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.feed_bytes_received * 8) / secs
        } else {
            0
        }
    }

    /// Average inbound frame rate
    pub fn feed_framerate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.frames_received as f64 / secs
        } else {
            0.0
        }
    }
}

/// Producer-side statistics
#[derive(Debug, Clone, Default)]
pub struct PublisherStats {
    /// Successful connects (first connect included)
    pub connects: u64,
    /// Frames written to the relay
    pub frames_sent: u64,
    /// Payload bytes written to the relay
    pub bytes_sent: u64,
    /// Captures discarded (no connection, capture failure, encode failure)
    pub frames_skipped: u64,
}
