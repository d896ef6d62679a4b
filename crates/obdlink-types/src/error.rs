//! Error types for data parsing in obdlink-types.

use thiserror::Error;

/// Errors that can occur when decoding OBD-II response payloads.
///
/// This error type is internal to the decoder: the public [`crate::decode`]
/// function is total and maps these onto sentinel strings instead of
/// propagating them, so a single malformed response can never abort a poll
/// cycle.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The hex payload was shorter than the formula requires.
    #[error("payload too short: need {expected} hex digits, got {actual}")]
    ShortPayload {
        /// Number of hex digits the formula reads.
        expected: usize,
        /// Number of hex digits present.
        actual: usize,
    },

    /// The payload contained non-hexadecimal characters.
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
}

/// Result type alias using obdlink-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::ShortPayload {
            expected: 4,
            actual: 2,
        };
        assert!(err.to_string().contains("4"));
        assert!(err.to_string().contains("2"));

        let err = ParseError::InvalidHex("ZZ".to_string());
        assert!(err.to_string().contains("ZZ"));
    }
}
