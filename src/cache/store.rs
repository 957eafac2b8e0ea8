//! Frame cache implementation

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use super::config::CacheConfig;
use super::frame::Frame;

/// Contents of the single cache slot
#[derive(Debug, Default)]
struct Slot {
    frame: Option<Frame>,
    generation: u64,
}

/// Holder of the most recently published frame
///
/// Publishing replaces the slot under an exclusive lock. Readers take the
/// same lock with a bounded wait and leave with a private copy of the
/// frame handle, so no lock is ever held across socket I/O.
pub struct FrameCache {
    /// The slot itself
    slot: Mutex<Slot>,

    /// Latest published generation, for wake-on-publish
    generation_tx: watch::Sender<u64>,

    /// Total frames ever published
    frames_published: AtomicU64,

    /// Length of the frame currently held (0 if none)
    current_len: AtomicUsize,

    /// Configuration
    config: CacheConfig,
}

impl FrameCache {
    /// Create an empty cache with default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create an empty cache with custom configuration
    pub fn with_config(config: CacheConfig) -> Self {
        let (generation_tx, _) = watch::channel(0);

        Self {
            slot: Mutex::new(Slot::default()),
            generation_tx,
            frames_published: AtomicU64::new(0),
            current_len: AtomicUsize::new(0),
            config,
        }
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Replace the cached frame
    ///
    /// The previous frame is dropped while the lock is held, so the cache
    /// never holds more than one frame at rest.
    pub async fn publish(&self, frame: Frame) {
        let len = frame.len();

        let generation = {
            let mut slot = self.slot.lock().await;
            slot.generation += 1;
            slot.frame = Some(frame);
            self.current_len.store(len, Ordering::Relaxed);
            slot.generation
        };

        self.frames_published.fetch_add(1, Ordering::Relaxed);
        self.generation_tx.send_replace(generation);

        tracing::trace!(generation = generation, len = len, "Frame published");
    }

    /// Take a private copy of the cached frame
    ///
    /// Returns `None` if nothing has been published yet, or if the lock
    /// could not be acquired within `lock_timeout`.
    pub async fn snapshot(&self) -> Option<Frame> {
        self.snapshot_with_generation().await.map(|(frame, _)| frame)
    }

    async fn snapshot_with_generation(&self) -> Option<(Frame, u64)> {
        let slot = match tokio::time::timeout(self.config.lock_timeout, self.slot.lock()).await {
            Ok(slot) => slot,
            Err(_) => {
                tracing::debug!(
                    timeout_ms = self.config.lock_timeout.as_millis() as u64,
                    "Frame cache lock wait timed out"
                );
                return None;
            }
        };

        slot.frame
            .as_ref()
            .map(|frame| (frame.clone(), slot.generation))
    }

    /// Create a wake-on-publish reader handle
    pub fn subscribe(self: &Arc<Self>) -> FrameWatch {
        FrameWatch {
            cache: Arc::clone(self),
            rx: self.generation_tx.subscribe(),
            last_seen: 0,
        }
    }

    /// Generation of the most recent publish (0 before the first)
    pub fn generation(&self) -> u64 {
        *self.generation_tx.borrow()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            generation: self.generation(),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frame_len: self.current_len.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader handle that yields each newly published frame at most once
pub struct FrameWatch {
    cache: Arc<FrameCache>,
    rx: watch::Receiver<u64>,
    last_seen: u64,
}

impl FrameWatch {
    /// Wait for a frame newer than the last one returned
    ///
    /// Wakes as soon as a publish happens, but never waits longer than
    /// `pacing`. Returns `None` if no newer frame is available by then, so
    /// the caller can simply loop.
    pub async fn next_frame(&mut self, pacing: Duration) -> Option<Frame> {
        let current = *self.rx.borrow_and_update();
        if current <= self.last_seen {
            // Sender lives as long as the cache we hold, so this only times out
            let _ = tokio::time::timeout(pacing, self.rx.changed()).await;
        }

        let (frame, generation) = self.cache.snapshot_with_generation().await?;
        if generation <= self.last_seen {
            return None;
        }

        self.last_seen = generation;
        Some(frame)
    }

    /// Generation of the last frame returned
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

/// Statistics for the frame cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Generation of the most recent publish
    pub generation: u64,
    /// Total frames published
    pub frames_published: u64,
    /// Length of the frame currently held
    pub frame_len: usize,
}
