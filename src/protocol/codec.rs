//! Length-prefixed frame codec
//!
//! Encoding is unconditional: the sender is trusted to respect the frame
//! limit. Decoding validates the header before touching the payload, so a
//! rejected header never consumes more than its own 4 bytes.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cache::Frame;
use crate::error::{ProtocolError, ResourceError, Result};
use crate::protocol::constants::{FRAME_HEADER_SIZE, MAX_FRAME_SIZE};

/// Prepend the 4-byte big-endian length to `payload`
pub fn encode(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Validate a frame header and return the payload length
pub fn parse_header(header: [u8; FRAME_HEADER_SIZE]) -> std::result::Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(header);
    if len == 0 || len as usize > MAX_FRAME_SIZE {
        return Err(ProtocolError::BadLength(len));
    }
    Ok(len as usize)
}

/// Read the next frame from `reader`
///
/// Returns `Ok(None)` if the stream ends cleanly on a frame boundary.
/// Every individual socket read is bounded by `read_timeout`.
pub async fn read_frame<R>(reader: &mut R, read_timeout: Duration) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let got = read_full(reader, &mut header, read_timeout).await?;
    if got == 0 {
        return Ok(None);
    }
    if got < FRAME_HEADER_SIZE {
        return Err(ProtocolError::ShortRead {
            expected: FRAME_HEADER_SIZE,
            received: got,
        }
        .into());
    }

    let len = parse_header(header)?;

    let mut payload = Vec::new();
    payload
        .try_reserve_exact(len)
        .map_err(|_| ResourceError::AllocationFailed(len))?;
    payload.resize(len, 0);

    let got = read_full(reader, &mut payload, read_timeout).await?;
    if got < len {
        return Err(ProtocolError::ShortRead {
            expected: len,
            received: got,
        }
        .into());
    }

    Ok(Some(Frame::new(Bytes::from(payload))))
}

/// Write one frame (header + payload) and flush
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = (payload.len() as u32).to_be_bytes();
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Fill `buf` until it is full or the stream ends, returning the byte count
async fn read_full<R>(reader: &mut R, buf: &mut [u8], read_timeout: Duration) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = tokio::time::timeout(read_timeout, reader.read(&mut buf[filled..])).await??;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
