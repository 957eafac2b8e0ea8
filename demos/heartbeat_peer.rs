//! Heartbeat peer: a camera-less node that pings the relay
//!
//! Run with: cargo run --example heartbeat_peer [RELAY_ADDR]
//!
//! Sends `DE AD BE EF` every five seconds over a raw peer connection and
//! prints whatever the relay forwards back (in mesh mode, other peers'
//! bytes). Reconnects one second after the connection drops.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use feed_relay::protocol::constants::DEFAULT_PEER_PORT;

const HEARTBEAT: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ping the relay until the connection fails
async fn run_session(mut stream: TcpStream) -> std::io::Result<()> {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut buf = [0u8; 256];

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                stream.write_all(&HEARTBEAT).await?;
                tracing::info!(payload = %hex(&HEARTBEAT), "Heartbeat sent");
            }
            read = stream.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                tracing::info!(len = n, payload = %hex(&buf[..n]), "Received");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("heartbeat_peer=info".parse()?),
        )
        .init();

    let relay_addr: SocketAddr = match std::env::args().nth(1) {
        Some(addr_str) => addr_str.parse()?,
        None => SocketAddr::from(([127, 0, 0, 1], DEFAULT_PEER_PORT)),
    };

    println!("Heartbeat peer -> {} (Ctrl+C to stop)", relay_addr);

    let session = async {
        loop {
            match TcpStream::connect(relay_addr).await {
                Ok(stream) => {
                    tracing::info!(addr = %relay_addr, "Connected");
                    match run_session(stream).await {
                        Ok(()) => tracing::info!("Relay closed the connection"),
                        Err(e) => tracing::warn!(error = %e, "Connection lost"),
                    }
                }
                Err(e) => {
                    tracing::debug!(addr = %relay_addr, error = %e, "Connect failed");
                }
            }

            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    };

    tokio::select! {
        _ = session => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
