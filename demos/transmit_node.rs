//! Transmit node: feed ingest, MJPEG live view and star relay
//!
//! Run with: cargo run --example transmit_node [UPSTREAM_ADDR]
//!
//! Examples:
//!   cargo run --example transmit_node                      # upstream 127.0.0.1:9000
//!   cargo run --example transmit_node 192.168.4.2:9000     # upstream base station
//!
//! ## Surfaces
//!
//! - Feed:      producer connects to port 8000 (`search_node`)
//! - Live view: open http://<node>:8080/ in a browser
//! - Relay:     peers connect to port 8001; bytes go to UPSTREAM_ADDR (`base_sink`)

use std::net::SocketAddr;

use feed_relay::protocol::constants::{DEFAULT_PEER_PORT, DEFAULT_SINK_PORT};
use feed_relay::{PeerRelayConfig, RelayConfig, RelayServer};

fn print_usage() {
    eprintln!("Usage: transmit_node [UPSTREAM_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  UPSTREAM_ADDR    Base station to relay peer bytes to (default: 127.0.0.1:9000)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let upstream = match args.get(1) {
        Some(addr_str) => match addr_str.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: invalid upstream address '{}': {}", addr_str, e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([127, 0, 0, 1], DEFAULT_SINK_PORT)),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feed_relay=info".parse()?)
                .add_directive("transmit_node=info".parse()?),
        )
        .init();

    let peer_addr = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PEER_PORT));
    let config = RelayConfig::default().peer_relay(PeerRelayConfig::star(peer_addr, upstream));

    println!("Transmit node");
    println!("=============");
    if let Some(addr) = config.feed_addr {
        println!("Feed:      {}", addr);
    }
    if let Some(addr) = config.http_addr {
        println!("Live view: http://{}/", addr);
    }
    println!("Relay:     {} -> {}", peer_addr, upstream);
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let server = RelayServer::new(config);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stats = server.stats();
    println!();
    println!("Frames received: {}", stats.frames_received);
    println!("Viewers served:  {}", stats.viewers_total);
    println!("Chunks relayed:  {}", stats.chunks_relayed);
    println!("Chunks dropped:  {}", stats.chunks_dropped);

    Ok(())
}
