//! Base sink: the upstream end of a star relay
//!
//! Run with: cargo run --example base_sink [BIND_ADDR] [OUTPUT_FILE]
//!
//! Accepts any number of connections, logs every chunk received as hex and
//! appends the raw bytes to OUTPUT_FILE (default: received.bin).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use feed_relay::protocol::constants::DEFAULT_SINK_PORT;

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

async fn handle_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    output: Arc<Mutex<File>>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 4096];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        tracing::info!(peer = %peer, len = n, payload = %hex(&buf[..n]), "Received");

        let mut file = output.lock().await;
        file.write_all(&buf[..n]).await?;
        file.flush().await?;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("base_sink=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let bind_addr: SocketAddr = match args.next() {
        Some(addr_str) => addr_str.parse()?,
        None => SocketAddr::from(([0, 0, 0, 0], DEFAULT_SINK_PORT)),
    };
    let output_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("received.bin"));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&output_path)
        .await?;
    let output = Arc::new(Mutex::new(file));

    let listener = TcpListener::bind(bind_addr).await?;
    println!(
        "Listening on {}  -> output file: {}",
        bind_addr,
        output_path.display()
    );

    let accept_loop = async {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::info!(peer = %peer, "Connected");
                    let output = Arc::clone(&output);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, peer, output).await {
                            tracing::warn!(peer = %peer, error = %e, "Handler error");
                        }
                        tracing::info!(peer = %peer, "Disconnected");
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed");
                }
            }
        }
    };

    tokio::select! {
        _ = accept_loop => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down");
        }
    }

    Ok(())
}
