//! Error types for the edge-ipc transport crates

use std::path::PathBuf;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket or pipe setup failure
    #[error("Setup error: {0}")]
    Setup(String),

    /// Socket path exceeds the AF_UNIX address limit
    #[error("Socket path too long: {len} bytes, limit is {max}")]
    PathTooLong { len: usize, max: usize },

    /// Socket path does not exist on the filesystem
    #[error("Socket not found at {0}")]
    SocketNotFound(PathBuf),

    /// Malformed framing on a connection
    #[error("Framing error: {0}")]
    Framing(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Io(err) => {
                matches!(
                    err.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                )
            }
            _ => false,
        }
    }

    /// True when an IO error indicates an expired socket timeout.
    ///
    /// Linux reports an expired `SO_RCVTIMEO` as `EAGAIN`, which std maps to
    /// `WouldBlock`; other platforms report `TimedOut`.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Io(err) => {
                matches!(
                    err.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
            }
            _ => false,
        }
    }
}
