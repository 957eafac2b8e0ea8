//! Managed upstream connection for star relaying
//!
//! A background connector keeps trying to reach the upstream sink at a fixed
//! interval. Each established stream is handed to the relay engine, which
//! owns it until a write fails or the sink closes it; the connector is then
//! told to start over. Chunks that arrive while no stream is installed are
//! simply not written.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{ConnectionError, Result};

/// Connection settings for the upstream sink
#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    pub addr: SocketAddr,
    pub connect_timeout: Duration,
    pub reconnect_interval: Duration,
    pub write_timeout: Duration,
    pub tcp_nodelay: bool,
}

/// Write half of the upstream connection plus its EOF watcher
struct InstalledStream {
    writer: OwnedWriteHalf,
    closed: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
}

impl Drop for InstalledStream {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// The relay engine's handle on its upstream sink
pub struct UpstreamLink {
    addr: SocketAddr,
    stream: Option<InstalledStream>,
    connected_rx: mpsc::Receiver<TcpStream>,
    lost: Arc<Notify>,
    connector: JoinHandle<()>,
    write_timeout: Duration,
}

impl UpstreamLink {
    /// Start the background connector
    pub fn spawn(options: UpstreamOptions) -> Self {
        let (connected_tx, connected_rx) = mpsc::channel(1);
        let lost = Arc::new(Notify::new());

        let connector = tokio::spawn(run_connector(
            options.clone(),
            connected_tx,
            Arc::clone(&lost),
        ));

        Self {
            addr: options.addr,
            stream: None,
            connected_rx,
            lost,
            connector,
            write_timeout: options.write_timeout,
        }
    }

    /// Upstream address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether a stream is installed and the sink has not closed it
    pub fn is_connected(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| !stream.closed.load(Ordering::Acquire))
    }

    /// Wait for the connector to deliver a new stream
    pub async fn next_connection(&mut self) -> Option<TcpStream> {
        self.connected_rx.recv().await
    }

    /// Install a stream delivered by [`next_connection`](Self::next_connection)
    pub fn install(&mut self, stream: TcpStream) {
        tracing::info!(upstream = %self.addr, "Upstream connected");

        let (reader, writer) = stream.into_split();
        let closed = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn(watch_for_close(reader, Arc::clone(&closed)));

        self.stream = Some(InstalledStream {
            writer,
            closed,
            watcher,
        });
    }

    /// Write `data` upstream
    ///
    /// Fails with `NotConnected` if no stream is installed or the sink has
    /// closed it. Any write error drops the stream and wakes the connector.
    pub async fn forward(&mut self, data: &[u8]) -> Result<()> {
        if self.stream.is_some() && !self.is_connected() {
            self.disconnect();
        }

        let stream = self
            .stream
            .as_mut()
            .ok_or(ConnectionError::NotConnected)?;

        let writer = &mut stream.writer;
        let written = tokio::time::timeout(self.write_timeout, async {
            writer.write_all(data).await?;
            writer.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.disconnect();
                Err(e.into())
            }
            Err(elapsed) => {
                self.disconnect();
                Err(elapsed.into())
            }
        }
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!(upstream = %self.addr, "Upstream lost, reconnecting");
            self.lost.notify_one();
        }
    }
}

impl Drop for UpstreamLink {
    fn drop(&mut self) {
        self.connector.abort();
    }
}

/// Drain the upstream read half, flagging the stream once the sink closes it
async fn watch_for_close(mut reader: OwnedReadHalf, closed: Arc<AtomicBool>) {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Upstream read failed");
                break;
            }
        }
    }
    closed.store(true, Ordering::Release);
}

async fn run_connector(
    options: UpstreamOptions,
    connected_tx: mpsc::Sender<TcpStream>,
    lost: Arc<Notify>,
) {
    loop {
        match tokio::time::timeout(options.connect_timeout, TcpStream::connect(options.addr)).await
        {
            Ok(Ok(stream)) => {
                if options.tcp_nodelay {
                    let _ = stream.set_nodelay(true);
                }
                if connected_tx.send(stream).await.is_err() {
                    return;
                }
                lost.notified().await;
            }
            Ok(Err(source)) => {
                let err = ConnectionError::ConnectFailed {
                    addr: options.addr,
                    source,
                };
                tracing::debug!(error = %err, "Upstream connect failed");
            }
            Err(_) => {
                tracing::debug!(upstream = %options.addr, "Upstream connect timed out");
            }
        }

        tokio::time::sleep(options.reconnect_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::error::Error;

    fn options(addr: SocketAddr) -> UpstreamOptions {
        UpstreamOptions {
            addr,
            connect_timeout: Duration::from_secs(1),
            reconnect_interval: Duration::from_millis(20),
            write_timeout: Duration::from_secs(1),
            tcp_nodelay: true,
        }
    }

    #[tokio::test]
    async fn test_forward_without_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut link = UpstreamLink::spawn(options(listener.local_addr().unwrap()));

        let err = link.forward(b"dropped").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_and_forward() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut link = UpstreamLink::spawn(options(listener.local_addr().unwrap()));

        let stream = tokio::time::timeout(Duration::from_secs(5), link.next_connection())
            .await
            .unwrap()
            .unwrap();
        link.install(stream);
        assert!(link.is_connected());

        let (mut sink, _) = listener.accept().await.unwrap();
        link.forward(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        sink.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_sink_close_drops_next_chunk() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut link = UpstreamLink::spawn(options(listener.local_addr().unwrap()));

        let stream = tokio::time::timeout(Duration::from_secs(5), link.next_connection())
            .await
            .unwrap()
            .unwrap();
        link.install(stream);
        let (sink, _) = listener.accept().await.unwrap();

        // Graceful close by the sink, no writes attempted yet
        drop(sink);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while link.is_connected() {
            assert!(std::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = link.forward(b"lost").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::NotConnected)
        ));

        // The connector is woken and delivers a fresh stream
        let stream = tokio::time::timeout(Duration::from_secs(5), link.next_connection())
            .await
            .unwrap()
            .unwrap();
        link.install(stream);
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_reconnects_after_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut link = UpstreamLink::spawn(options(listener.local_addr().unwrap()));

        let stream = tokio::time::timeout(Duration::from_secs(5), link.next_connection())
            .await
            .unwrap()
            .unwrap();
        link.install(stream);
        let (sink, _) = listener.accept().await.unwrap();
        drop(sink);

        // Writes into a reset connection eventually fail
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while link.is_connected() {
            assert!(std::time::Instant::now() < deadline);
            let _ = link.forward(b"x").await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // The connector delivers a fresh stream
        let stream = tokio::time::timeout(Duration::from_secs(5), link.next_connection())
            .await
            .unwrap()
            .unwrap();
        link.install(stream);
        assert!(link.is_connected());
    }
}
