//! Error types for obdlink-core.

use thiserror::Error;

/// Errors that can occur when communicating with an ELM327 adapter.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error on the underlying byte stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Connecting to the adapter failed.
    #[error("connection to {addr} failed: {reason}")]
    ConnectionFailed {
        /// The address that was dialed.
        addr: String,
        /// Description of the failure.
        reason: String,
    },

    /// The adapter closed the stream before a response terminator arrived.
    #[error("stream closed before response terminator")]
    StreamClosed,
}

impl Error {
    /// Create a connection failure with context.
    pub fn connection_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using obdlink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection_failed("192.168.0.10:35000", "connection refused");
        assert!(err.to_string().contains("192.168.0.10:35000"));
        assert!(err.to_string().contains("refused"));

        let err = Error::StreamClosed;
        assert!(err.to_string().contains("terminator"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("pipe broke"));
    }
}
