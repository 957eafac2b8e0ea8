//! Error types
//!
//! Every error here is local to one connection. Callers log it, close the
//! affected socket and carry on serving everyone else.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Underlying socket error
    Io(io::Error),
    /// Peer violated the framed transport protocol
    Protocol(ProtocolError),
    /// Connection could not be established or accepted
    Connection(ConnectionError),
    /// A bounded resource was exhausted
    Resource(ResourceError),
    /// A socket read or write did not complete within its timeout
    Timeout,
}

/// Framed transport violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header carried a length of zero or above the frame limit
    BadLength(u32),
    /// Stream closed before the announced bytes arrived
    ShortRead { expected: usize, received: usize },
}

/// Connection establishment failures
#[derive(Debug)]
pub enum ConnectionError {
    /// Listener failed to accept an incoming connection
    AcceptFailed(io::Error),
    /// Outbound connect failed
    ConnectFailed { addr: SocketAddr, source: io::Error },
    /// Operation needs a live connection and there is none
    NotConnected,
}

/// Resource exhaustion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Payload buffer could not be reserved
    AllocationFailed(usize),
    /// Every peer slot holds a live connection
    SlotTableFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Resource(e) => write!(f, "Resource error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::BadLength(len) => write!(f, "Invalid frame length: {}", len),
            ProtocolError::ShortRead { expected, received } => write!(
                f,
                "Stream closed after {} of {} bytes",
                received, expected
            ),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::AcceptFailed(e) => write!(f, "Accept failed: {}", e),
            ConnectionError::ConnectFailed { addr, source } => {
                write!(f, "Connect to {} failed: {}", addr, source)
            }
            ConnectionError::NotConnected => write!(f, "Not connected"),
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::AllocationFailed(size) => {
                write!(f, "Failed to allocate {} byte buffer", size)
            }
            ResourceError::SlotTableFull => write!(f, "Peer slot table is full"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Connection(e) => Some(e),
            Error::Resource(e) => Some(e),
            Error::Timeout => None,
        }
    }
}

impl std::error::Error for ProtocolError {}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::AcceptFailed(e) => Some(e),
            ConnectionError::ConnectFailed { source, .. } => Some(source),
            ConnectionError::NotConnected => None,
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::Connection(e)
    }
}

impl From<ResourceError> for Error {
    fn from(e: ResourceError) -> Self {
        Error::Resource(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err: Error = ProtocolError::BadLength(0).into();
        assert_eq!(err.to_string(), "Protocol error: Invalid frame length: 0");

        let err: Error = ProtocolError::ShortRead {
            expected: 10,
            received: 3,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Protocol error: Stream closed after 3 of 10 bytes"
        );
    }

    #[test]
    fn test_resource_error_display() {
        let err: Error = ResourceError::SlotTableFull.into();
        assert_eq!(err.to_string(), "Resource error: Peer slot table is full");
    }

    #[test]
    fn test_io_error_has_source() {
        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(std::error::Error::source(&err).is_some());
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_connect_failed_display() {
        let addr: SocketAddr = "192.168.4.1:8000".parse().unwrap();
        let err = ConnectionError::ConnectFailed {
            addr,
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "Connect to 192.168.4.1:8000 failed: refused");
    }
}
