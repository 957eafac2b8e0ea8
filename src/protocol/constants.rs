//! Wire protocol constants

/// Size of the big-endian length prefix in front of every feed frame
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest payload a feed frame may carry (5 MiB)
pub const MAX_FRAME_SIZE: usize = 5 * 1024 * 1024;

/// Default port the producer connects to and the mesh relay listens on
pub const DEFAULT_FEED_PORT: u16 = 8000;

/// Default port for star-relay peers on a transmit node
pub const DEFAULT_PEER_PORT: u16 = 8001;

/// Default port for the HTTP live view
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default port of the base sink that receives star-relayed bytes
pub const DEFAULT_SINK_PORT: u16 = 9000;

/// Peer slot table size
pub const MAX_CLIENTS: usize = 6;

/// Bytes drained from one peer per read
pub const RELAY_CHUNK_SIZE: usize = 256;

/// Multipart boundary token for the live stream
pub const STREAM_BOUNDARY: &str = "feedrelayframeboundary";
