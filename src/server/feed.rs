//! Feed ingestion
//!
//! Serves one producer at a time: accept, decode frames into the cache
//! until the connection ends or misbehaves, then go back to accepting.
//! Producers that connect while another is active wait in the listen
//! backlog. This loop is the only writer of the frame cache.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::cache::FrameCache;
use crate::error::{ConnectionError, Result};
use crate::protocol::codec::read_frame;
use crate::stats::RelayMetrics;

/// Single-producer feed ingest loop
pub struct FeedIngest {
    cache: Arc<FrameCache>,
    metrics: Arc<RelayMetrics>,
    idle_timeout: Duration,
    tcp_nodelay: bool,
}

impl FeedIngest {
    pub fn new(
        cache: Arc<FrameCache>,
        metrics: Arc<RelayMetrics>,
        idle_timeout: Duration,
        tcp_nodelay: bool,
    ) -> Self {
        Self {
            cache,
            metrics,
            idle_timeout,
            tcp_nodelay,
        }
    }

    /// Accept and ingest feeds from `listener` until the task is aborted
    pub async fn run(self, listener: TcpListener) {
        tracing::info!(addr = ?listener.local_addr().ok(), "Feed ingest listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.metrics.feed_connected();
                    tracing::info!(peer = %peer_addr, "Feed connected");

                    match self.ingest(stream, peer_addr).await {
                        Ok(frames) => {
                            tracing::info!(peer = %peer_addr, frames = frames, "Feed closed");
                        }
                        Err(e) => {
                            self.metrics.feed_error();
                            tracing::warn!(peer = %peer_addr, error = %e, "Feed dropped");
                        }
                    }
                }
                Err(e) => {
                    let err = ConnectionError::AcceptFailed(e);
                    tracing::error!(error = %err, "Failed to accept feed");
                }
            }
        }
    }

    /// Decode frames from one producer into the cache
    ///
    /// Returns the number of frames ingested when the producer closes
    /// cleanly. The stream is dropped (closed) on return either way.
    pub async fn ingest(&self, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<u64> {
        if self.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        let mut frames = 0u64;
        while let Some(frame) = read_frame(&mut stream, self.idle_timeout).await? {
            let len = frame.len();
            self.metrics.frame_received(len);
            self.cache.publish(frame).await;
            frames += 1;

            tracing::debug!(peer = %peer_addr, len = len, "Frame ingested");
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::cache::Frame;
    use crate::protocol::codec::encode;

    async fn start(cache: Arc<FrameCache>) -> (SocketAddr, Arc<RelayMetrics>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let metrics = Arc::new(RelayMetrics::new());
        let ingest = FeedIngest::new(
            cache,
            Arc::clone(&metrics),
            Duration::from_secs(5),
            true,
        );
        tokio::spawn(ingest.run(listener));
        (addr, metrics)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_frame_lands_in_cache() {
        let cache = Arc::new(FrameCache::new());
        let (addr, _metrics) = start(Arc::clone(&cache)).await;

        let mut feed = TcpStream::connect(addr).await.unwrap();
        feed.write_all(&[0x00, 0x00, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF])
            .await
            .unwrap();

        wait_until(|| cache.generation() == 1).await;
        let frame = cache.snapshot().await.unwrap();
        assert_eq!(frame.data(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(frame.len(), 4);
    }

    #[tokio::test]
    async fn test_zero_length_closes_feed_and_keeps_cache() {
        let cache = Arc::new(FrameCache::new());
        cache.publish(Frame::from(vec![1, 2, 3])).await;
        let (addr, metrics) = start(Arc::clone(&cache)).await;

        let mut feed = TcpStream::connect(addr).await.unwrap();
        feed.write_all(&[0x00, 0x00, 0x00, 0x00]).await.unwrap();

        // Relay closes the connection
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(5), feed.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        wait_until(|| metrics.snapshot().feed_errors == 1).await;
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.snapshot().await.unwrap().data(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_accepts_next_feed_after_error() {
        let cache = Arc::new(FrameCache::new());
        let (addr, metrics) = start(Arc::clone(&cache)).await;

        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(&0x00FF_FFFFu32.to_be_bytes()).await.unwrap();
        wait_until(|| metrics.snapshot().feed_errors == 1).await;

        let mut good = TcpStream::connect(addr).await.unwrap();
        good.write_all(&encode(b"frame one")).await.unwrap();
        good.write_all(&encode(b"frame two")).await.unwrap();

        wait_until(|| cache.generation() == 2).await;
        assert_eq!(cache.snapshot().await.unwrap().data(), b"frame two");

        let stats = metrics.snapshot();
        assert_eq!(stats.feed_connections, 2);
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.feed_bytes_received, 18);
    }

    #[tokio::test]
    async fn test_clean_close_is_not_an_error() {
        let cache = Arc::new(FrameCache::new());
        let (addr, metrics) = start(Arc::clone(&cache)).await;

        let mut feed = TcpStream::connect(addr).await.unwrap();
        feed.write_all(&encode(b"only")).await.unwrap();
        wait_until(|| cache.generation() == 1).await;
        drop(feed);

        // A second producer is served once the first has gone
        let mut next = TcpStream::connect(addr).await.unwrap();
        next.write_all(&encode(b"next")).await.unwrap();
        wait_until(|| cache.generation() == 2).await;

        assert_eq!(metrics.snapshot().feed_errors, 0);
    }
}
