//! Mesh node: every peer hears every other peer
//!
//! Run with: cargo run --example mesh_node [BIND_ADDR]
//!
//! Up to six peers may be connected at once; each chunk one peer sends is
//! written to all the others. Try it with several `heartbeat_peer` instances.

use std::net::SocketAddr;

use feed_relay::protocol::constants::DEFAULT_FEED_PORT;
use feed_relay::{PeerRelayConfig, RelayConfig, RelayServer};

fn print_usage() {
    eprintln!("Usage: mesh_node [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8000)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match addr_str.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: invalid bind address '{}': {}", addr_str, e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([0, 0, 0, 0], DEFAULT_FEED_PORT)),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feed_relay=debug".parse()?)
                .add_directive("mesh_node=info".parse()?),
        )
        .init();

    let config = RelayConfig::relay_only(PeerRelayConfig::mesh(bind_addr));

    println!("Mesh node listening on {}", bind_addr);
    println!("Press Ctrl+C to stop...");

    let server = RelayServer::new(config);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stats = server.stats();
    println!();
    println!("Peers admitted: {}", stats.peers_admitted);
    println!("Peers rejected: {}", stats.peers_rejected);
    println!("Bytes relayed:  {}", stats.bytes_relayed);

    Ok(())
}
