//! Cached frame type

use bytes::Bytes;

/// One complete feed payload, typically a JPEG image
///
/// Cheap to clone: the payload is reference counted and immutable, so a
/// clone handed to a reader can never observe a later publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Wrap a decoded payload
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty (never true for a decoded frame)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the frame, returning the underlying buffer
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(Bytes::from(data))
    }
}

impl From<&'static [u8]> for Frame {
    fn from(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}
