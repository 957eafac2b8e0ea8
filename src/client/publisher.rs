//! Feed publisher
//!
//! Producer side of the feed protocol: connects to a relay's feed port and
//! writes length-prefixed frames, reconnecting with a fixed backoff.

use std::future::Future;
use std::io;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{ConnectionError, Error, ProtocolError, Result};
use crate::protocol::codec::write_frame;
use crate::protocol::constants::MAX_FRAME_SIZE;
use crate::stats::PublisherStats;

use super::config::ClientConfig;

/// Events from the feed publisher
#[derive(Debug)]
pub enum PublishEvent {
    /// Connected to the relay
    Connected,

    /// Connection lost or closed
    Disconnected,

    /// Error occurred
    Error(String),
}

/// One capture from a [`FrameSource`]
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Frame bytes
    pub data: Bytes,
    /// Whether `data` is already in its wire encoding (e.g. JPEG)
    pub encoded: bool,
}

impl CapturedFrame {
    /// A capture that can be sent as is
    pub fn encoded(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            encoded: true,
        }
    }

    /// A capture that must go through [`FrameSource::encode`] first
    pub fn raw(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            encoded: false,
        }
    }
}

/// Something that produces frames for the publisher, such as a camera
///
/// # Example
/// ```no_run
/// use feed_relay::client::{CapturedFrame, FrameSource};
///
/// struct TestPattern;
///
/// impl FrameSource for TestPattern {
///     async fn capture(&mut self) -> Option<CapturedFrame> {
///         Some(CapturedFrame::encoded(vec![0xFF, 0xD8, 0xFF, 0xD9]))
///     }
/// }
/// ```
pub trait FrameSource: Send {
    /// Capture the next frame
    ///
    /// `None` means this capture failed; the publisher skips it and tries
    /// again after the frame interval.
    fn capture(&mut self) -> impl Future<Output = Option<CapturedFrame>> + Send;

    /// Encode a raw capture
    ///
    /// Sources that only produce encoded frames can keep the default, which
    /// rejects every raw capture.
    fn encode(&mut self, raw: &Bytes) -> Option<Bytes> {
        let _ = raw;
        None
    }
}

/// Feed publisher
///
/// # Example
/// ```no_run
/// use feed_relay::client::{ClientConfig, FeedPublisher};
///
/// # async fn example() -> feed_relay::error::Result<()> {
/// let config = ClientConfig::new("127.0.0.1:8000".parse().unwrap());
/// let (mut publisher, mut events) = FeedPublisher::new(config);
///
/// // Spawn event handler
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// publisher.connect().await?;
/// publisher.send_frame(&[0xDE, 0xAD, 0xBE, 0xEF]).await?;
/// # Ok(())
/// # }
/// ```
pub struct FeedPublisher {
    config: ClientConfig,
    event_tx: mpsc::Sender<PublishEvent>,
    stream: Option<TcpStream>,
    stats: PublisherStats,
}

impl FeedPublisher {
    /// Create a new publisher.
    ///
    /// Returns the publisher and a receiver for events.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<PublishEvent>) {
        let (tx, rx) = mpsc::channel(256);

        let publisher = Self {
            config,
            event_tx: tx,
            stream: None,
            stats: PublisherStats::default(),
        };

        (publisher, rx)
    }

    /// Get the publisher configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to the relay, replacing any existing connection
    pub async fn connect(&mut self) -> Result<()> {
        let addr = self.config.server_addr;

        let stream =
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    return Err(ConnectionError::ConnectFailed { addr, source }.into());
                }
                Err(_) => {
                    let source = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
                    return Err(ConnectionError::ConnectFailed { addr, source }.into());
                }
            };

        if self.config.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        self.stream = Some(stream);
        self.stats.connects += 1;
        tracing::info!(addr = %addr, "Connected to relay");
        self.emit(PublishEvent::Connected);
        Ok(())
    }

    /// Send one frame
    ///
    /// A failed write drops the connection; the next `connect` (or the
    /// `run` loop) re-establishes it.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() || payload.len() > MAX_FRAME_SIZE {
            let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
            return Err(ProtocolError::BadLength(len).into());
        }

        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;

        let result = tokio::time::timeout(self.config.write_timeout, write_frame(stream, payload))
            .await
            .map_err(Error::from)
            .and_then(|written| written);

        match result {
            Ok(()) => {
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += payload.len() as u64;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Frame write failed, dropping connection");
                self.emit(PublishEvent::Error(e.to_string()));
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Disconnect from the relay.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            self.emit(PublishEvent::Disconnected);
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Get publisher statistics
    pub fn stats(&self) -> PublisherStats {
        self.stats.clone()
    }

    /// Capture and publish frames from `source` forever
    ///
    /// Each round reconnects if needed, captures, encodes raw captures and
    /// sends, then waits `frame_interval`. A failed connect waits
    /// `reconnect_interval` instead.
    pub async fn run<S: FrameSource>(&mut self, source: &mut S) {
        loop {
            if !self.is_connected() {
                if let Err(e) = self.connect().await {
                    tracing::debug!(error = %e, "Relay unreachable, retrying");
                    tokio::time::sleep(self.config.reconnect_interval).await;
                    continue;
                }
            }

            self.publish_next(source).await;
            tokio::time::sleep(self.config.frame_interval).await;
        }
    }

    async fn publish_next<S: FrameSource>(&mut self, source: &mut S) {
        let Some(captured) = source.capture().await else {
            self.stats.frames_skipped += 1;
            tracing::warn!("Capture failed");
            return;
        };

        let payload = if captured.encoded {
            captured.data
        } else {
            match source.encode(&captured.data) {
                Some(encoded) => encoded,
                None => {
                    self.stats.frames_skipped += 1;
                    tracing::warn!(len = captured.data.len(), "Encode failed, frame dropped");
                    return;
                }
            }
        };

        if let Err(e) = self.send_frame(&payload).await {
            self.stats.frames_skipped += 1;
            tracing::debug!(len = payload.len(), error = %e, "Frame not sent");
        }
    }

    fn emit(&self, event: PublishEvent) {
        // Advisory only; a full or closed channel drops the event
        let _ = self.event_tx.try_send(event);
    }
}
