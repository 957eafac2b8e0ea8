//! Search node: publishes frames to a transmit node
//!
//! Run with: cargo run --example search_node [RELAY_ADDR] [FRAME_DIR]
//!
//! Examples:
//!   cargo run --example search_node                             # test pattern to 127.0.0.1:8000
//!   cargo run --example search_node 192.168.4.1:8000 ./frames   # cycle JPEGs from ./frames
//!
//! With a FRAME_DIR, every `.jpg`/`.jpeg` file in it is sent in name order,
//! looping forever. Without one, a moving test pattern is rendered as a
//! binary PPM image. The live view labels every part `image/jpeg`, so the
//! pattern only exercises the feed and relay path; browsers will not render
//! it. Use a FRAME_DIR of JPEGs to watch the stream.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};
use feed_relay::client::PublishEvent;
use feed_relay::protocol::constants::DEFAULT_FEED_PORT;
use feed_relay::{CapturedFrame, ClientConfig, FeedPublisher, FrameSource};

const PATTERN_WIDTH: usize = 160;
const PATTERN_HEIGHT: usize = 120;

/// Cycles through JPEG files on disk
struct FileSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl FileSource {
    fn open(dir: &Path) -> std::io::Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        Ok(Self { files, next: 0 })
    }
}

impl FrameSource for FileSource {
    async fn capture(&mut self) -> Option<CapturedFrame> {
        if self.files.is_empty() {
            return None;
        }

        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        match tokio::fs::read(path).await {
            Ok(data) => Some(CapturedFrame::encoded(data)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read frame");
                None
            }
        }
    }
}

/// Moving gradient, captured as raw RGB and encoded as PPM
///
/// Not a JPEG: viewers receive it with the wrong content type and show
/// nothing. It is here to drive the capture and encode path without files.
struct TestPattern {
    tick: u8,
}

impl FrameSource for TestPattern {
    async fn capture(&mut self) -> Option<CapturedFrame> {
        self.tick = self.tick.wrapping_add(4);

        let mut rgb = BytesMut::with_capacity(PATTERN_WIDTH * PATTERN_HEIGHT * 3);
        for y in 0..PATTERN_HEIGHT {
            for x in 0..PATTERN_WIDTH {
                rgb.put_u8((x as u8).wrapping_add(self.tick));
                rgb.put_u8((y as u8).wrapping_add(self.tick));
                rgb.put_u8(self.tick);
            }
        }

        Some(CapturedFrame::raw(rgb.freeze()))
    }

    fn encode(&mut self, raw: &Bytes) -> Option<Bytes> {
        if raw.len() != PATTERN_WIDTH * PATTERN_HEIGHT * 3 {
            return None;
        }

        let header = format!("P6\n{} {}\n255\n", PATTERN_WIDTH, PATTERN_HEIGHT);
        let mut out = BytesMut::with_capacity(header.len() + raw.len());
        out.put_slice(header.as_bytes());
        out.put_slice(raw);
        Some(out.freeze())
    }
}

fn print_usage() {
    eprintln!("Usage: search_node [RELAY_ADDR] [FRAME_DIR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  RELAY_ADDR   Transmit node feed address (default: 127.0.0.1:8000)");
    eprintln!("  FRAME_DIR    Directory of JPEG frames to cycle (default: test pattern)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let relay_addr = match args.get(1) {
        Some(addr_str) => match addr_str.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: invalid relay address '{}': {}", addr_str, e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([127, 0, 0, 1], DEFAULT_FEED_PORT)),
    };
    let frame_dir = args.get(2).map(PathBuf::from);

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feed_relay=info".parse()?)
                .add_directive("search_node=info".parse()?),
        )
        .init();

    let (mut publisher, mut events) = FeedPublisher::new(ClientConfig::new(relay_addr));

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PublishEvent::Connected => println!("Connected to {}", relay_addr),
                PublishEvent::Disconnected => println!("Disconnected, reconnecting..."),
                PublishEvent::Error(e) => println!("Publish error: {}", e),
            }
        }
    });

    println!("Publishing to {} (Ctrl+C to stop)", relay_addr);

    match frame_dir {
        Some(dir) => {
            let mut source = FileSource::open(&dir)?;
            println!("Cycling {} frames from {}", source.files.len(), dir.display());

            tokio::select! {
                _ = publisher.run(&mut source) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            let mut source = TestPattern { tick: 0 };

            tokio::select! {
                _ = publisher.run(&mut source) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    let stats = publisher.stats();
    println!();
    println!("Connects:       {}", stats.connects);
    println!("Frames sent:    {}", stats.frames_sent);
    println!("Bytes sent:     {}", stats.bytes_sent);
    println!("Frames skipped: {}", stats.frames_skipped);

    Ok(())
}
