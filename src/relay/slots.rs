//! Bounded peer slot table
//!
//! A fixed number of slots, each holding at most one accepted peer. New
//! connections take the first slot that is empty or whose connection has
//! died; when every slot is live the newcomer is closed immediately. The
//! table never grows.
//!
//! Each occupied slot owns the write half of its socket. The read half is
//! moved into a small reader task that forwards bounded chunks to the relay
//! engine over a channel and flips the slot's `connected` flag when the
//! peer goes away.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ConnectionError, ResourceError, Result};
use crate::stats::RelayMetrics;

/// Index into the slot table
pub type SlotIndex = usize;

/// Bytes drained from one peer
#[derive(Debug, Clone)]
pub struct RelayChunk {
    /// Slot the bytes were read from
    pub slot: SlotIndex,
    /// Identity of the peer that sent them
    pub peer_id: u64,
    /// The bytes, verbatim
    pub data: Bytes,
}

/// One occupied slot
pub struct PeerSlot {
    peer_id: u64,
    peer_addr: SocketAddr,
    writer: OwnedWriteHalf,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl PeerSlot {
    /// Unique id assigned on admission
    pub fn peer_id(&self) -> u64 {
        self.peer_id
    }

    /// Remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether the connection is still open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.reader.is_finished()
    }

    /// Flag the slot for reclamation on the next reap
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Write `data` to the peer and flush
    pub async fn send(&mut self, data: &[u8], write_timeout: Duration) -> Result<()> {
        tokio::time::timeout(write_timeout, async {
            self.writer.write_all(data).await?;
            self.writer.flush().await
        })
        .await??;
        Ok(())
    }

    fn close(self) {
        self.reader.abort();
    }
}

/// Fixed-size table of peer slots
pub struct PeerSlots {
    slots: Box<[Option<PeerSlot>]>,
    chunk_tx: mpsc::Sender<RelayChunk>,
    chunk_size: usize,
    tcp_nodelay: bool,
    next_peer_id: u64,
    metrics: Arc<RelayMetrics>,
}

impl PeerSlots {
    /// Create a table with `capacity` slots
    ///
    /// Returns the table and the receiver on which every occupied slot's
    /// reader delivers its chunks.
    pub fn new(
        capacity: usize,
        chunk_size: usize,
        metrics: Arc<RelayMetrics>,
    ) -> (Self, mpsc::Receiver<RelayChunk>) {
        let (chunk_tx, chunk_rx) = mpsc::channel(capacity.max(1) * 16);
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>();

        let table = Self {
            slots: slots.into_boxed_slice(),
            chunk_tx,
            chunk_size: chunk_size.max(1),
            tcp_nodelay: true,
            next_peer_id: 1,
            metrics,
        };

        (table, chunk_rx)
    }

    /// Enable or disable TCP_NODELAY on admitted sockets
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots holding a live connection
    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.is_connected())
            .count()
    }

    /// Get the slot at `index` if occupied
    pub fn get(&self, index: SlotIndex) -> Option<&PeerSlot> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    /// Iterate over live slots
    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = (SlotIndex, &mut PeerSlot)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|slot| (index, slot)))
            .filter(|(_, slot)| slot.is_connected())
    }

    /// Take a pending connection from `listener` without waiting
    ///
    /// Returns the slot it was installed in, or `None` if nothing was
    /// pending or the table is full (in which case the connection is
    /// closed).
    pub async fn accept_if_pending(&mut self, listener: &TcpListener) -> Option<SlotIndex> {
        match tokio::time::timeout(Duration::ZERO, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => self.admit(stream, peer_addr).ok(),
            Ok(Err(e)) => {
                let err = ConnectionError::AcceptFailed(e);
                tracing::error!(error = %err, "Failed to accept peer");
                None
            }
            Err(_) => None,
        }
    }

    /// Install `stream` in the first empty or dead slot
    ///
    /// On `SlotTableFull` the stream has already been dropped.
    pub fn admit(
        &mut self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> std::result::Result<SlotIndex, ResourceError> {
        let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.as_ref().map_or(true, |slot| !slot.is_connected()))
        else {
            tracing::warn!(
                peer = %peer_addr,
                capacity = self.slots.len(),
                "Peer rejected: slot table full"
            );
            self.metrics.peer_rejected();
            return Err(ResourceError::SlotTableFull);
        };

        if let Some(dead) = self.slots[index].take() {
            dead.close();
        }

        if self.tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let peer_id = self.next_peer_id;
        self.next_peer_id += 1;

        let (read_half, write_half) = stream.into_split();
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_peer(
            index,
            peer_id,
            read_half,
            self.chunk_size,
            self.chunk_tx.clone(),
            Arc::clone(&connected),
        ));

        self.slots[index] = Some(PeerSlot {
            peer_id,
            peer_addr,
            writer: write_half,
            connected,
            reader,
        });
        self.metrics.peer_admitted();

        tracing::info!(slot = index, peer = %peer_addr, peer_id = peer_id, "Peer admitted");

        Ok(index)
    }

    /// Close and free every slot whose connection is gone
    ///
    /// Returns the number of slots reclaimed.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;

        for (index, entry) in self.slots.iter_mut().enumerate() {
            if entry.as_ref().is_some_and(|slot| !slot.is_connected()) {
                if let Some(slot) = entry.take() {
                    tracing::info!(slot = index, peer = %slot.peer_addr, "Peer disconnected");
                    slot.close();
                    reaped += 1;
                }
            }
        }

        if reaped > 0 {
            self.metrics.peers_reaped(reaped);
        }
        reaped
    }
}

impl Drop for PeerSlots {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut().filter_map(Option::take) {
            slot.close();
        }
    }
}

async fn read_peer(
    slot: SlotIndex,
    peer_id: u64,
    mut reader: OwnedReadHalf,
    chunk_size: usize,
    chunk_tx: mpsc::Sender<RelayChunk>,
    connected: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; chunk_size];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = RelayChunk {
                    slot,
                    peer_id,
                    data: Bytes::copy_from_slice(&buf[..n]),
                };
                if chunk_tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(slot = slot, error = %e, "Peer read failed");
                break;
            }
        }
    }

    connected.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    async fn connect_pair(listener: &TcpListener) -> (TcpStream, TcpStream, SocketAddr) {
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer_addr) = listener.accept().await.unwrap();
        (client, server, peer_addr)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_admit_fills_first_free_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut slots, _rx) = PeerSlots::new(3, 256, Arc::new(RelayMetrics::new()));

        let mut clients = Vec::new();
        for expected in 0..3 {
            let (client, server, addr) = connect_pair(&listener).await;
            assert_eq!(slots.admit(server, addr), Ok(expected));
            clients.push(client);
        }
        assert_eq!(slots.active_count(), 3);
    }

    #[tokio::test]
    async fn test_admission_ceiling() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let metrics = Arc::new(RelayMetrics::new());
        let (mut slots, mut rx) = PeerSlots::new(6, 256, Arc::clone(&metrics));

        let mut clients = Vec::new();
        for _ in 0..6 {
            let (client, server, addr) = connect_pair(&listener).await;
            assert!(slots.admit(server, addr).is_ok());
            clients.push(client);
        }

        // The seventh connection is turned away and closed
        let (mut extra, server, addr) = connect_pair(&listener).await;
        assert_eq!(slots.admit(server, addr), Err(ResourceError::SlotTableFull));
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), extra.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        // The first six remain usable
        assert_eq!(slots.active_count(), 6);
        clients[5].write_all(b"still here").await.unwrap();
        let chunk = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chunk.slot, 5);
        assert_eq!(&chunk.data[..], b"still here");

        assert_eq!(metrics.snapshot().peers_rejected, 1);
    }

    #[tokio::test]
    async fn test_reap_and_reuse() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut slots, _rx) = PeerSlots::new(2, 256, Arc::new(RelayMetrics::new()));

        let (first, server, addr) = connect_pair(&listener).await;
        assert_eq!(slots.admit(server, addr), Ok(0));
        let (_second, server, addr) = connect_pair(&listener).await;
        assert_eq!(slots.admit(server, addr), Ok(1));

        // First peer goes away
        drop(first);
        wait_until(|| slots.get(0).is_some_and(|slot| !slot.is_connected())).await;

        assert_eq!(slots.reap(), 1);
        assert!(slots.get(0).is_none());
        assert_eq!(slots.reap(), 0);

        // Freed index is reused
        let (_third, server, addr) = connect_pair(&listener).await;
        assert_eq!(slots.admit(server, addr), Ok(0));
    }

    #[tokio::test]
    async fn test_dead_slot_reused_without_reap() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut slots, _rx) = PeerSlots::new(1, 256, Arc::new(RelayMetrics::new()));

        let (first, server, addr) = connect_pair(&listener).await;
        assert_eq!(slots.admit(server, addr), Ok(0));
        let first_id = slots.get(0).unwrap().peer_id();

        drop(first);
        wait_until(|| slots.active_count() == 0).await;

        let (_second, server, addr) = connect_pair(&listener).await;
        assert_eq!(slots.admit(server, addr), Ok(0));
        assert_ne!(slots.get(0).unwrap().peer_id(), first_id);
    }

    #[tokio::test]
    async fn test_chunks_are_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut slots, mut rx) = PeerSlots::new(1, 4, Arc::new(RelayMetrics::new()));

        let (mut client, server, addr) = connect_pair(&listener).await;
        slots.admit(server, addr).unwrap();

        client.write_all(b"0123456789").await.unwrap();

        let mut received = Vec::new();
        while received.len() < 10 {
            let chunk = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(chunk.data.len() <= 4);
            received.extend_from_slice(&chunk.data);
        }
        assert_eq!(&received[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_accept_if_pending() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (mut slots, _rx) = PeerSlots::new(2, 256, Arc::new(RelayMetrics::new()));

        // Nothing pending
        assert!(slots.accept_if_pending(&listener).await.is_none());

        let _client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let index = loop {
            if let Some(index) = slots.accept_if_pending(&listener).await {
                break index;
            }
            assert!(Instant::now() < deadline, "pending connection never accepted");
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(index, 0);
        assert_eq!(slots.active_count(), 1);
    }
}
