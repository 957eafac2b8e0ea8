//! Feed wire protocol
//!
//! A feed is a plain TCP byte stream of length-prefixed frames:
//!
//! ```text
//! +----------------------+---------------------------+
//! | length (u32, BE)     | payload (length bytes)    |
//! +----------------------+---------------------------+
//! ```
//!
//! A length of zero, or above [`MAX_FRAME_SIZE`](constants::MAX_FRAME_SIZE),
//! is a protocol violation. There is no resynchronization marker, so the
//! only recovery is to drop the connection and let the producer reconnect.

pub mod codec;
pub mod constants;

pub use codec::{encode, parse_header, read_frame, write_frame};
