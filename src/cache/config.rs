//! Frame cache configuration

use std::time::Duration;

/// Frame cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a reader waits for the cache lock before giving up on
    /// this cycle
    pub lock_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(200),
        }
    }
}

impl CacheConfig {
    /// Set the reader lock timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}
